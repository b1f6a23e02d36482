//! Shared styling utilities for terminal output.

use console::Style;

use mr_conflict_core::models::RepositoryStatus;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Color a repository status for the run summary.
pub fn status(status: RepositoryStatus) -> String {
    let style = match status {
        RepositoryStatus::Conflicts => Style::new().red().bold(),
        RepositoryStatus::Error => Style::new().yellow(),
        RepositoryStatus::NoMergeRequests | RepositoryStatus::Accessible => Style::new().green(),
    };
    style.apply_to(status).to_string()
}

/// Count styled red when non-zero.
pub fn count(n: usize) -> String {
    if n == 0 {
        Style::new().green().apply_to(n).to_string()
    } else {
        Style::new().red().bold().apply_to(n).to_string()
    }
}

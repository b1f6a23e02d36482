//! The `scan` command: runs the core pipeline behind a spinner and prints a
//! styled summary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};

use mr_conflict_core::pipeline;
use mr_conflict_core::report::report_timestamp;
use mr_conflict_core::{AppConfig, CoreError, GitLabClient, Report};

use crate::style;

/// Run the full pipeline and print a summary. The client is closed on every
/// path out.
pub async fn run_scan(config: &AppConfig, client: GitLabClient, output: Option<PathBuf>) -> Result<()> {
    let output_dir = resolve_output_dir(output, config);

    let spinner = new_spinner();
    let result = pipeline::run(
        &client,
        &config.gitlab.include_groups,
        &output_dir,
        report_timestamp(Utc::now()),
        |phase| spinner.set_message(phase.to_string()),
    )
    .await;
    spinner.finish_and_clear();
    client.close().await;

    let (report, path) = result.map_err(|e| {
        let context = match &e {
            CoreError::GitLab(_) => "GitLab scan failed".to_string(),
            CoreError::Report(_) => format!("failed to write report to {}", output_dir.display()),
            CoreError::Config(_) => "invalid configuration".to_string(),
        };
        anyhow::Error::new(e).context(context)
    })?;

    print_summary(&report, &path);
    Ok(())
}

/// CLI flag, then `output.directory`, then the working directory.
pub fn resolve_output_dir(output: Option<PathBuf>, config: &AppConfig) -> PathBuf {
    output
        .or_else(|| config.output.directory.clone())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn new_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(template.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn print_summary(report: &Report, path: &Path) {
    let (total, with_conflicts, conflicting_mrs) = report.summary_stats();
    let errors = report
        .repositories()
        .iter()
        .filter(|r| r.status.is_error())
        .count();

    println!();
    println!("{}", style::success(&format!("Report written to {}", path.display())));
    println!();
    println!("{}", style::header("Summary"));
    println!("  Repositories scanned : {}", total);
    println!("  With conflicts       : {}", style::count(with_conflicts));
    println!("  Conflicting MRs      : {}", style::count(conflicting_mrs));
    if errors > 0 {
        println!("  {}", style::warn(&format!("{errors} repositories could not be checked")));
    }

    let mut flagged: Vec<_> = report
        .repositories()
        .iter()
        .filter(|r| r.status.has_conflicts() || r.status.is_error())
        .collect();
    if flagged.is_empty() {
        return;
    }
    flagged.sort_by(|a, b| a.repository.name.cmp(&b.repository.name));

    println!();
    for entry in flagged {
        println!(
            "  {:<40} {}",
            entry.repository.name,
            style::status(entry.status)
        );
        if let Some(ref message) = entry.error_message {
            println!("    {}", style::dim(message));
        }
    }
}

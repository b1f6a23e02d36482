//! Markdown rendering and report file output.

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::ReportError;
use crate::report::{Report, RepositoryReport};

const FILE_PREFIX: &str = "MR-conflict-";
const FILE_EXT: &str = "md";

/// Upper bound on `_N` suffixes tried before giving up.
const MAX_SUFFIX: u32 = 10_000;

/// `MR-conflict-<timestamp>.md`
pub fn report_filename(timestamp: &str) -> String {
    format!("{FILE_PREFIX}{timestamp}.{FILE_EXT}")
}

/// Render the full markdown document. Repositories are listed by name.
pub fn render_markdown(report: &Report) -> String {
    let (total, with_conflicts, conflicting_mrs) = report.summary_stats();
    let mut out = String::new();

    let _ = writeln!(out, "# MR Conflict Report - {}\n", report.timestamp);

    out.push_str("## Summary\n");
    let _ = writeln!(out, "- Total Repositories Scanned: {total}");
    let _ = writeln!(out, "- Repositories with Conflicts: {with_conflicts}");
    let _ = writeln!(out, "- Total Conflicting MRs: {conflicting_mrs}\n");

    out.push_str("## Repository Details\n\n");

    let mut entries: Vec<&RepositoryReport> = report.repositories().iter().collect();
    entries.sort_by(|a, b| a.repository.name.cmp(&b.repository.name));
    for entry in entries {
        render_repository(&mut out, entry);
    }

    out
}

fn render_repository(out: &mut String, entry: &RepositoryReport) {
    let marker = if entry.status.has_conflicts() { " ❌" } else { "" };
    let _ = writeln!(
        out,
        "### [{}]({}){}",
        entry.repository.name, entry.repository.web_url, marker
    );
    let _ = writeln!(out, "**Status**: {}", entry.status);

    if let Some(ref message) = entry.error_message {
        let _ = writeln!(out, "**Error**: {message}");
    }

    if !entry.conflicting_mrs.is_empty() {
        out.push_str("\n#### Conflicting Merge Requests\n");
        let mut mrs: Vec<_> = entry.conflicting_mrs.iter().collect();
        mrs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        for mr in mrs {
            let _ = writeln!(
                out,
                "- ❌ [{}]({}) - Author: {} - Created: {}",
                mr.title,
                mr.web_url,
                mr.author.name,
                mr.created_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    out.push('\n');
}

/// Write `report` into `output_dir` and return the path written.
///
/// The directory is created if needed. When `MR-conflict-<ts>.md` already
/// exists, `_1`, `_2`, ... are tried in turn; files are opened with
/// `create_new` so an existing report is never overwritten. A file whose
/// write fails is removed again.
pub fn write_report(report: &Report, output_dir: &Path) -> Result<PathBuf, ReportError> {
    let content = render_markdown(report);
    let path = create_report_file(output_dir, &report.timestamp, |file| {
        file.write_all(content.as_bytes())?;
        file.sync_all()
    })?;
    info!(path = %path.display(), bytes = content.len(), "wrote report");
    Ok(path)
}

fn create_report_file<F>(output_dir: &Path, timestamp: &str, mut write: F) -> Result<PathBuf, ReportError>
where
    F: FnMut(&mut File) -> std::io::Result<()>,
{
    std::fs::create_dir_all(output_dir)?;

    for suffix in 0..=MAX_SUFFIX {
        let name = if suffix == 0 {
            report_filename(timestamp)
        } else {
            format!("{FILE_PREFIX}{timestamp}_{suffix}.{FILE_EXT}")
        };
        let path = output_dir.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                if let Err(e) = write(&mut file) {
                    drop(file);
                    if let Err(rm) = std::fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %rm, "failed to remove partial report");
                    }
                    return Err(e.into());
                }
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "report file exists, trying next suffix");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ReportError::NoFreeFilename(output_dir.display().to_string()))
}

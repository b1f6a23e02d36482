//! One full run: connection test, scan, analysis, conflict collection and
//! report output.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::analyzer::{analyze_merge_requests, conflicting_merge_requests};
use crate::errors::CoreError;
use crate::gitlab::GitLabClient;
use crate::report::{build_report, write_report, Report};
use crate::scanner::RepositoryScanner;

/// Stage of a run, reported to the caller's progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Scanning,
    Analyzing { repositories: usize },
    Collecting,
    Writing,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Testing GitLab connection..."),
            Self::Scanning => write!(f, "Scanning repositories..."),
            Self::Analyzing { repositories } => {
                write!(f, "Analyzing {repositories} repositories...")
            }
            Self::Collecting => write!(f, "Collecting conflicting merge requests..."),
            Self::Writing => write!(f, "Writing report..."),
        }
    }
}

/// Run the whole pipeline and write the report into `output_dir`.
///
/// The client is left open; closing it is up to the caller.
pub async fn run<F>(
    client: &GitLabClient,
    include_groups: &[u64],
    output_dir: &Path,
    timestamp: impl Into<String>,
    mut on_phase: F,
) -> Result<(Report, PathBuf), CoreError>
where
    F: FnMut(Phase),
{
    on_phase(Phase::Connecting);
    client.test_connection().await?;

    on_phase(Phase::Scanning);
    let scanned = RepositoryScanner::new(client, include_groups)
        .scan_repositories()
        .await?;

    on_phase(Phase::Analyzing {
        repositories: scanned.len(),
    });
    let analyzed = analyze_merge_requests(client, scanned).await?;

    on_phase(Phase::Collecting);
    let conflicts = conflicting_merge_requests(client, &analyzed).await?;

    on_phase(Phase::Writing);
    let report = build_report(analyzed, conflicts, timestamp);
    let path = write_report(&report, output_dir)?;

    info!(path = %path.display(), "run complete");
    Ok((report, path))
}

//! Report aggregation.
//!
//! A [`Report`] collects one [`RepositoryReport`] per scanned repository and
//! keeps its summary counters in step with every append.

pub mod markdown;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{MergeRequest, Repository, RepositoryStatus};

pub use markdown::{render_markdown, report_filename, write_report};

/// Timestamp format used in report headers and filenames. Colon-free so it
/// is safe on every filesystem.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Format `at` as a report timestamp (`2024-03-01T10-15-30`).
pub fn report_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// One repository's entry in the report.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryReport {
    pub repository: Repository,
    pub conflicting_mrs: Vec<MergeRequest>,
    pub status: RepositoryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub timestamp: String,
    total_repositories: usize,
    repositories_with_conflicts: usize,
    total_conflicting_mrs: usize,
    repositories: Vec<RepositoryReport>,
}

impl Report {
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            total_repositories: 0,
            repositories_with_conflicts: 0,
            total_conflicting_mrs: 0,
            repositories: Vec::new(),
        }
    }

    /// Append a repository entry and update the counters. Merge requests only
    /// count toward the total when `status` is `Conflicts`.
    pub fn add_repository(
        &mut self,
        repository: Repository,
        conflicting_mrs: Vec<MergeRequest>,
        status: RepositoryStatus,
        error_message: Option<String>,
    ) {
        self.total_repositories += 1;
        if status.has_conflicts() {
            self.repositories_with_conflicts += 1;
            self.total_conflicting_mrs += conflicting_mrs.len();
        }
        self.repositories.push(RepositoryReport {
            repository,
            conflicting_mrs,
            status,
            error_message: error_message.filter(|m| !m.is_empty()),
        });
    }

    /// `(total repositories, repositories with conflicts, conflicting MRs)`.
    pub fn summary_stats(&self) -> (usize, usize, usize) {
        (
            self.total_repositories,
            self.repositories_with_conflicts,
            self.total_conflicting_mrs,
        )
    }

    pub fn repositories(&self) -> &[RepositoryReport] {
        &self.repositories
    }
}

/// Build a report from analyzed repositories and the conflict map produced by
/// [`conflicting_merge_requests`](crate::analyzer::conflicting_merge_requests).
pub fn build_report(
    repositories: Vec<Repository>,
    mut conflicting: HashMap<u64, Vec<MergeRequest>>,
    timestamp: impl Into<String>,
) -> Report {
    let mut report = Report::new(timestamp);
    for repo in repositories {
        let mrs = conflicting.remove(&repo.id).unwrap_or_default();
        let status = repo.status();
        let error_message = repo.error_message();
        report.add_repository(repo, mrs, status, error_message);
    }
    report
}

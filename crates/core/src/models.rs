//! Domain model types used throughout mr-conflict-checker.
//!
//! These types bridge the GitLab client, the scanner/analyzer pipeline, and
//! the report builder.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::GitLabError;

/// Source branch of the merge requests the checker looks for.
pub const RELEASE_BRANCH: &str = "release";

/// Target branch of the merge requests the checker looks for.
pub const MASTER_BRANCH: &str = "master";

// ---------------------------------------------------------------------------
// Repository status
// ---------------------------------------------------------------------------

/// Classification of a repository during a scan.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryStatus {
    /// No classification applied yet, or merge requests present without
    /// qualifying conflicts (analyzer only).
    #[default]
    Accessible,
    /// An API call failed for this repository.
    Error,
    /// No release -> master merge requests (scanner also uses this when
    /// none of them conflict).
    NoMergeRequests,
    /// At least one qualifying conflicting merge request.
    Conflicts,
}

impl RepositoryStatus {
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    pub fn has_conflicts(self) -> bool {
        self == Self::Conflicts
    }
}

impl std::fmt::Display for RepositoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accessible => write!(f, "Accessible"),
            Self::Error => write!(f, "Error"),
            Self::NoMergeRequests => write!(f, "No Release->Master MRs"),
            Self::Conflicts => write!(f, "Conflicts Found"),
        }
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// GitLab namespace (group or user) owning a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Namespace {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub path: String,
}

/// A GitLab project as returned by `GET /projects`.
///
/// `status` and `error` are local classification state and never come from
/// the API. They only change through [`Repository::mark`] and
/// [`Repository::mark_error`], which keep an error present exactly when the
/// status is [`RepositoryStatus::Error`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub web_url: String,
    #[serde(default)]
    pub namespace: Namespace,
    #[serde(skip)]
    status: RepositoryStatus,
    #[serde(skip)]
    error: Option<Arc<GitLabError>>,
}

impl Repository {
    pub fn new(id: u64, name: impl Into<String>, web_url: impl Into<String>, namespace: Namespace) -> Self {
        Self {
            id,
            name: name.into(),
            web_url: web_url.into(),
            namespace,
            status: RepositoryStatus::Accessible,
            error: None,
        }
    }

    pub fn status(&self) -> RepositoryStatus {
        self.status
    }

    pub fn error(&self) -> Option<&GitLabError> {
        self.error.as_deref()
    }

    /// Error text for the report, empty when the repository is healthy.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    /// Set a non-error status and clear any stored error.
    ///
    /// Passing [`RepositoryStatus::Error`] without an error is a logic bug;
    /// use [`mark_error`](Self::mark_error) instead.
    pub fn mark(&mut self, status: RepositoryStatus) {
        debug_assert!(!status.is_error(), "use mark_error to record failures");
        self.status = status;
        self.error = None;
    }

    /// Record a failed API call against this repository.
    pub fn mark_error(&mut self, err: GitLabError) {
        self.status = RepositoryStatus::Error;
        self.error = Some(Arc::new(err));
    }
}

// ---------------------------------------------------------------------------
// Merge request
// ---------------------------------------------------------------------------

/// Author of a merge request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub username: String,
    /// Only visible to administrators; usually absent.
    #[serde(default)]
    pub email: Option<String>,
}

/// A GitLab merge request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeRequest {
    /// Project-scoped id (`iid`), not globally unique.
    pub iid: u64,
    pub title: String,
    pub author: Author,
    pub web_url: String,
    pub source_branch: String,
    pub target_branch: String,
    #[serde(default)]
    pub has_conflicts: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub merge_status: Option<String>,
    #[serde(default)]
    pub changes_count: Option<String>,
}

impl MergeRequest {
    /// Whether this merge request proposes `release` -> `master`.
    pub fn is_release_to_master(&self) -> bool {
        self.source_branch == RELEASE_BRANCH && self.target_branch == MASTER_BRANCH
    }
}

/// One file entry of `GET /merge_requests/:iid/changes`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MergeRequestChange {
    #[serde(default)]
    pub new_file: bool,
    #[serde(default)]
    pub renamed_file: bool,
    #[serde(default)]
    pub deleted_file: bool,
    #[serde(default)]
    pub diff: String,
}

impl MergeRequestChange {
    /// New, renamed and deleted files always count; otherwise the diff must
    /// carry non-whitespace text.
    pub fn is_real_change(&self) -> bool {
        self.new_file || self.renamed_file || self.deleted_file || !self.diff.trim().is_empty()
    }
}

/// Body of `GET /merge_requests/:iid/changes`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MergeRequestChanges {
    #[serde(default)]
    pub changes: Vec<MergeRequestChange>,
}

impl MergeRequestChanges {
    pub fn real_change_count(&self) -> usize {
        self.changes.iter().filter(|c| c.is_real_change()).count()
    }
}

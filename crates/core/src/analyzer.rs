//! Merge-request analyzer.
//!
//! Re-derives each repository's conflict status with a stricter notion of a
//! "real" conflict than the scanner uses: the merge request must target
//! `release` -> `master`, be flagged as conflicting by GitLab, and carry at
//! least one real file change.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::errors::GitLabError;
use crate::gitlab::GitLabClient;
use crate::models::{MergeRequest, Repository, RepositoryStatus, MASTER_BRANCH, RELEASE_BRANCH};

/// Re-classify scanned repositories.
///
/// Fails up front if `client` has been closed. Repositories already in
/// [`RepositoryStatus::Error`] pass through untouched. A fetch failure for
/// one repository is recorded on it and the batch continues.
///
/// Status is three-way here: `Conflicts` when a qualifying conflict
/// survives, `Accessible` when release -> master merge requests exist but
/// none qualify, `NoMergeRequests` when there are none.
pub async fn analyze_merge_requests(
    client: &GitLabClient,
    repositories: Vec<Repository>,
) -> Result<Vec<Repository>, GitLabError> {
    if client.is_closed() {
        return Err(GitLabError::ClientClosed);
    }

    info!(count = repositories.len(), "analyzing merge requests");
    let mut analyzed = Vec::with_capacity(repositories.len());

    for mut repo in repositories {
        if repo.status().is_error() {
            analyzed.push(repo);
            continue;
        }

        let mrs = match fetch_release_merge_requests(client, repo.id).await {
            Ok(mrs) => mrs,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(repo = %repo.name, id = repo.id, error = %e, "failed to fetch merge requests");
                repo.mark_error(e);
                analyzed.push(repo);
                continue;
            }
        };

        let fetched = mrs.len();
        let conflicts = real_conflicts(client, repo.id, mrs).await?;

        let status = if !conflicts.is_empty() {
            RepositoryStatus::Conflicts
        } else if fetched > 0 {
            RepositoryStatus::Accessible
        } else {
            RepositoryStatus::NoMergeRequests
        };
        debug!(
            repo = %repo.name,
            fetched,
            conflicting = conflicts.len(),
            status = %status,
            "analyzed repository"
        );
        repo.mark(status);
        analyzed.push(repo);
    }

    Ok(analyzed)
}

/// Conflicting merge requests for every repository in
/// [`RepositoryStatus::Conflicts`], keyed by repository id, newest first.
///
/// Unlike [`analyze_merge_requests`], a fetch failure here is only logged;
/// the repository is left out of the map and its recorded status is not
/// changed.
pub async fn conflicting_merge_requests(
    client: &GitLabClient,
    repositories: &[Repository],
) -> Result<HashMap<u64, Vec<MergeRequest>>, GitLabError> {
    let mut by_repo = HashMap::new();

    for repo in repositories.iter().filter(|r| r.status().has_conflicts()) {
        let mrs = match fetch_release_merge_requests(client, repo.id).await {
            Ok(mrs) => mrs,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(repo = %repo.name, id = repo.id, error = %e, "skipping repository in conflict listing");
                continue;
            }
        };

        let conflicts = real_conflicts(client, repo.id, mrs).await?;
        if !conflicts.is_empty() {
            by_repo.insert(repo.id, conflicts);
        }
    }

    Ok(by_repo)
}

/// Keep release -> master merge requests GitLab flags as conflicting, newest
/// first. The sort is stable, so equal timestamps keep their input order.
pub fn filter_and_sort_conflicting(mrs: Vec<MergeRequest>) -> Vec<MergeRequest> {
    let mut conflicting: Vec<MergeRequest> = mrs
        .into_iter()
        .filter(|mr| mr.is_release_to_master() && mr.has_conflicts)
        .collect();
    conflicting.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    conflicting
}

async fn fetch_release_merge_requests(
    client: &GitLabClient,
    project_id: u64,
) -> Result<Vec<MergeRequest>, GitLabError> {
    client
        .list_merge_requests(project_id, Some(RELEASE_BRANCH), Some(MASTER_BRANCH))
        .await
}

/// Branch/flag filter plus the diff-size heuristic. A failed change-count
/// lookup keeps the candidate.
async fn real_conflicts(
    client: &GitLabClient,
    project_id: u64,
    mrs: Vec<MergeRequest>,
) -> Result<Vec<MergeRequest>, GitLabError> {
    let mut kept = Vec::new();
    for mr in filter_and_sort_conflicting(mrs) {
        match client.get_merge_request_change_count(project_id, mr.iid).await {
            Ok(0) => {
                debug!(project_id, mr_iid = mr.iid, "dropping conflict with no real changes");
            }
            Ok(_) => kept.push(mr),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(project_id, mr_iid = mr.iid, error = %e, "change count unavailable, keeping conflict");
                kept.push(mr);
            }
        }
    }
    Ok(kept)
}

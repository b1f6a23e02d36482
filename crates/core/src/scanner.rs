//! Repository scanner.
//!
//! Lists every project the token can see, applies the namespace whitelist,
//! and gives each surviving repository a first classification based on its
//! open `release` -> `master` merge requests.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::errors::GitLabError;
use crate::gitlab::GitLabClient;
use crate::models::{Repository, RepositoryStatus, MASTER_BRANCH, RELEASE_BRANCH};

/// Scans repositories for release -> master merge requests.
pub struct RepositoryScanner<'a> {
    client: &'a GitLabClient,
    include_groups: HashSet<u64>,
}

impl<'a> RepositoryScanner<'a> {
    /// `include_groups` is a namespace-id whitelist; empty means no filtering.
    pub fn new(client: &'a GitLabClient, include_groups: &[u64]) -> Self {
        Self {
            client,
            include_groups: include_groups.iter().copied().collect(),
        }
    }

    /// List, filter and classify all repositories.
    ///
    /// A failure to list repositories aborts the scan. A failure for one
    /// repository is recorded on it as [`RepositoryStatus::Error`] and the
    /// scan moves on, except for cancellation which aborts.
    pub async fn scan_repositories(&self) -> Result<Vec<Repository>, GitLabError> {
        let repos = self.client.list_repositories().await?;
        let repos = self.filter_repositories(repos);
        info!(count = repos.len(), "scanning repositories");

        let mut scanned = Vec::with_capacity(repos.len());
        for repo in repos {
            scanned.push(self.classify_repository(repo).await?);
        }

        let errors = scanned.iter().filter(|r| r.status().is_error()).count();
        let conflicts = scanned.iter().filter(|r| r.status().has_conflicts()).count();
        info!(
            total = scanned.len(),
            conflicts,
            errors,
            "repository scan complete"
        );
        Ok(scanned)
    }

    /// Number of repositories a scan would visit, after whitelist filtering.
    pub async fn repository_count(&self) -> Result<usize, GitLabError> {
        let repos = self.client.list_repositories().await?;
        Ok(self.filter_repositories(repos).len())
    }

    /// Two-way classification: repositories whose release -> master merge
    /// requests exist but do not conflict land in the same bucket as those
    /// with none at all.
    async fn classify_repository(&self, mut repo: Repository) -> Result<Repository, GitLabError> {
        repo.mark(RepositoryStatus::Accessible);

        let mrs = match self
            .client
            .list_merge_requests(repo.id, Some(RELEASE_BRANCH), Some(MASTER_BRANCH))
            .await
        {
            Ok(mrs) => mrs,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(repo = %repo.name, id = repo.id, error = %e, "error accessing repository");
                repo.mark_error(e);
                return Ok(repo);
            }
        };

        let status = if mrs.iter().any(|mr| mr.has_conflicts) {
            RepositoryStatus::Conflicts
        } else {
            RepositoryStatus::NoMergeRequests
        };
        debug!(repo = %repo.name, mrs = mrs.len(), status = %status, "classified repository");
        repo.mark(status);
        Ok(repo)
    }

    fn filter_repositories(&self, repos: Vec<Repository>) -> Vec<Repository> {
        if self.include_groups.is_empty() {
            return repos;
        }

        repos
            .into_iter()
            .filter(|repo| {
                let keep = self.include_groups.contains(&repo.namespace.id);
                if !keep {
                    debug!(
                        repo = %repo.name,
                        group = %repo.namespace.name,
                        group_id = repo.namespace.id,
                        "excluding repository not in group whitelist"
                    );
                }
                keep
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Namespace;

    fn repo(id: u64, group: u64) -> Repository {
        Repository::new(
            id,
            format!("repo-{id}"),
            format!("https://gitlab.example.com/repo-{id}"),
            Namespace {
                id: group,
                name: format!("group-{group}"),
                path: format!("group-{group}"),
            },
        )
    }

    #[test]
    fn test_empty_whitelist_keeps_everything() {
        let client = GitLabClient::new("https://gitlab.example.com", "t");
        let scanner = RepositoryScanner::new(&client, &[]);
        let kept = scanner.filter_repositories(vec![repo(1, 10), repo(2, 20)]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_whitelist_keeps_order_and_drops_others() {
        let client = GitLabClient::new("https://gitlab.example.com", "t");
        let scanner = RepositoryScanner::new(&client, &[10]);
        let kept = scanner.filter_repositories(vec![repo(1, 10), repo(2, 20), repo(3, 10)]);
        let ids: Vec<u64> = kept.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_whitelist_with_no_matches() {
        let client = GitLabClient::new("https://gitlab.example.com", "t");
        let scanner = RepositoryScanner::new(&client, &[99, 100]);
        assert!(scanner.filter_repositories(vec![repo(1, 10)]).is_empty());
    }
}

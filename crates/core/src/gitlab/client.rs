//! GitLab REST API client.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelSignal;
use crate::errors::GitLabError;
use crate::gitlab::rate_limit::{RateLimiter, DEFAULT_REQUEST_INTERVAL};
use crate::models::{MergeRequest, MergeRequestChanges, Repository};

/// GitLab's maximum `per_page`.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const API_PREFIX: &str = "/api/v4";

/// Asynchronous GitLab REST API client.
///
/// Every request waits on the client's [`RateLimiter`] first. Call
/// [`close`](Self::close) when done to stop the limiter; requests issued
/// afterwards fail with [`GitLabError::ClientClosed`].
pub struct GitLabClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    page_size: u32,
    limiter: RateLimiter,
    cancel: CancelSignal,
}

impl GitLabClient {
    /// Create a client for `base_url` (with or without a trailing `/api/v4`).
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = normalize_base_url(&base_url.into());
        let token = token.into();
        info!(base_url = %base_url, "created GitLabClient");
        Self {
            http: build_http(DEFAULT_TIMEOUT),
            base_url,
            token,
            page_size: DEFAULT_PAGE_SIZE,
            limiter: RateLimiter::new(DEFAULT_REQUEST_INTERVAL),
            cancel: CancelSignal::new(),
        }
    }

    /// Replace the minimum spacing between requests.
    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.limiter = RateLimiter::new(interval);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = build_http(timeout);
        self
    }

    /// Override `per_page` (clamped to 1..=100).
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, DEFAULT_PAGE_SIZE);
        self
    }

    /// Abort rate-limit waits and in-flight requests when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Stop the rate limiter. Idempotent.
    pub async fn close(&self) {
        self.limiter.stop().await;
        debug!("closed GitLabClient");
    }

    pub fn is_closed(&self) -> bool {
        self.limiter.is_stopped()
    }

    /// Verify that the token authenticates (`GET /user`).
    #[instrument(skip(self))]
    pub async fn test_connection(&self) -> Result<(), GitLabError> {
        self.get_json::<IgnoredAny>("/user", &[]).await?;
        info!("GitLab connection verified");
        Ok(())
    }

    /// All projects the token is a member of, in API order.
    #[instrument(skip(self))]
    pub async fn list_repositories(&self) -> Result<Vec<Repository>, GitLabError> {
        let repos: Vec<Repository> = self
            .get_paginated("/projects", &[("membership", "true".to_string())])
            .await?;
        info!(count = repos.len(), "listed repositories");
        Ok(repos)
    }

    /// Open merge requests of one project, optionally filtered by branch.
    #[instrument(skip(self))]
    pub async fn list_merge_requests(
        &self,
        project_id: u64,
        source_branch: Option<&str>,
        target_branch: Option<&str>,
    ) -> Result<Vec<MergeRequest>, GitLabError> {
        let mut query = vec![("state", "opened".to_string())];
        if let Some(source) = source_branch.filter(|b| !b.is_empty()) {
            query.push(("source_branch", source.to_string()));
        }
        if let Some(target) = target_branch.filter(|b| !b.is_empty()) {
            query.push(("target_branch", target.to_string()));
        }

        let path = format!("/projects/{project_id}/merge_requests");
        let mrs: Vec<MergeRequest> = self.get_paginated(&path, &query).await?;
        debug!(project_id, count = mrs.len(), "listed merge requests");
        Ok(mrs)
    }

    #[instrument(skip(self))]
    pub async fn get_merge_request(
        &self,
        project_id: u64,
        mr_iid: u64,
    ) -> Result<MergeRequest, GitLabError> {
        let path = format!("/projects/{project_id}/merge_requests/{mr_iid}");
        let mr: MergeRequest = self.get_json(&path, &[]).await?;
        debug!(project_id, mr_iid, "fetched merge request");
        Ok(mr)
    }

    /// Number of file entries in the merge request's diff that carry a real
    /// change (see [`MergeRequestChange::is_real_change`](crate::models::MergeRequestChange::is_real_change)).
    #[instrument(skip(self))]
    pub async fn get_merge_request_change_count(
        &self,
        project_id: u64,
        mr_iid: u64,
    ) -> Result<usize, GitLabError> {
        let path = format!("/projects/{project_id}/merge_requests/{mr_iid}/changes");
        let changes: MergeRequestChanges = self.get_json(&path, &[]).await?;
        let count = changes.real_change_count();
        debug!(
            project_id,
            mr_iid,
            entries = changes.changes.len(),
            real = count,
            "counted merge request changes"
        );
        Ok(count)
    }

    // -- Internals ------------------------------------------------------------

    /// Fetch every page of a list endpoint. Stops on the first page shorter
    /// than `page_size`, so a full final page costs one extra empty request.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, GitLabError> {
        let mut all = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut page_query = query.to_vec();
            page_query.push(("page", page.to_string()));
            page_query.push(("per_page", self.page_size.to_string()));

            let items: Vec<T> = self.get_json(path, &page_query).await?;
            let len = items.len();
            all.extend(items);
            debug!(path, page, len, "fetched page");

            if len < self.page_size as usize {
                break;
            }
            page += 1;
        }

        Ok(all)
    }

    /// One rate-limited GET, decoded as `T`. Sending, the status check and
    /// the body read all race the cancellation signal.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, GitLabError> {
        self.limiter.acquire(&self.cancel).await?;

        let url = format!("{}{}{}", self.base_url, API_PREFIX, path);
        let request = async {
            let resp = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .query(query)
                .send()
                .await?;
            let resp = check_response(resp).await?;
            decode(resp).await
        };

        tokio::select! {
            result = request => result,
            _ = self.cancel.triggered() => Err(GitLabError::Cancelled),
        }
    }
}

fn build_http(timeout: Duration) -> reqwest::Client {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("mr-conflict-checker/", env!("CARGO_PKG_VERSION"))),
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to build configured HTTP client, using defaults");
            reqwest::Client::new()
        })
}

/// Trim trailing slashes and a trailing `/api/v4`; endpoints add it back.
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    trimmed
        .strip_suffix(API_PREFIX)
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, GitLabError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(GitLabError::AuthenticationFailed(
            "invalid or expired token (HTTP 401)".into(),
        ));
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        return Err(GitLabError::RateLimited { retry_after });
    }

    let body = resp.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), body = %body, "GitLab API returned error");
    Err(GitLabError::ApiError {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, GitLabError> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| GitLabError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_client(server: &MockServer) -> GitLabClient {
        GitLabClient::new(server.uri(), "test-token")
            .with_request_interval(Duration::from_millis(1))
    }

    fn project(id: u64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": format!("project-{id}"),
            "web_url": format!("https://gitlab.example.com/acme/project-{id}"),
            "namespace": {"id": 10, "name": "Acme", "path": "acme"}
        })
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://gitlab.example.com/"),
            "https://gitlab.example.com"
        );
        assert_eq!(
            normalize_base_url("https://gitlab.example.com/api/v4"),
            "https://gitlab.example.com"
        );
        assert_eq!(
            normalize_base_url("https://gitlab.example.com/api/v4/"),
            "https://gitlab.example.com"
        );
        assert_eq!(
            normalize_base_url("https://example.com/gitlab"),
            "https://example.com/gitlab"
        );
    }

    #[test]
    fn test_page_size_is_clamped() {
        let client = GitLabClient::new("https://gitlab.example.com", "t").with_page_size(500);
        assert_eq!(client.page_size(), DEFAULT_PAGE_SIZE);
        let client = GitLabClient::new("https://gitlab.example.com", "t").with_page_size(0);
        assert_eq!(client.page_size(), 1);
    }

    #[tokio::test]
    async fn test_connection_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/user"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1, "username": "checker"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        client.test_connection().await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/user"))
            .respond_with(ResponseTemplate::new(401).set_body_string("401 Unauthorized"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.test_connection().await.unwrap_err();
        assert!(matches!(err, GitLabError::AuthenticationFailed(_)));
        assert!(err.to_string().contains("invalid"));
    }

    #[tokio::test]
    async fn test_rate_limited_and_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/1/merge_requests"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/2/merge_requests"))
            .respond_with(ResponseTemplate::new(403).set_body_string("403 Forbidden"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.list_merge_requests(1, None, None).await.unwrap_err();
        assert!(
            matches!(err, GitLabError::RateLimited { retry_after: Some(ref r) } if r == "30")
        );

        let err = client.list_merge_requests(2, None, None).await.unwrap_err();
        match err {
            GitLabError::ApiError { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "403 Forbidden");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_error() {
        // Nothing listens on port 9 of localhost.
        let client = GitLabClient::new("http://127.0.0.1:9", "t")
            .with_request_interval(Duration::from_millis(1));
        let err = client.test_connection().await.unwrap_err();
        assert!(matches!(err, GitLabError::TransportError(_)));
    }

    #[tokio::test]
    async fn test_list_repositories_paginates_until_short_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects"))
            .and(query_param("membership", "true"))
            .and(query_param("page", "1"))
            .and(query_param("per_page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![project(1), project(2)]))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![project(3)]))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server).with_page_size(2);
        let repos = client.list_repositories().await.unwrap();
        let ids: Vec<u64> = repos.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_full_last_page_costs_one_empty_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![project(1), project(2)]))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server).with_page_size(2);
        assert_eq!(client.list_repositories().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_merge_requests_sends_branch_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7/merge_requests"))
            .and(query_param("state", "opened"))
            .and(query_param("source_branch", "release"))
            .and(query_param("target_branch", "master"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "iid": 3,
                "title": "Release",
                "author": {"name": "Jane", "username": "jane"},
                "web_url": "https://gitlab.example.com/mr/3",
                "source_branch": "release",
                "target_branch": "master",
                "has_conflicts": true,
                "created_at": "2024-05-01T08:00:00Z"
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let mrs = client
            .list_merge_requests(7, Some("release"), Some("master"))
            .await
            .unwrap();
        assert_eq!(mrs.len(), 1);
        assert_eq!(mrs[0].iid, 3);
    }

    #[tokio::test]
    async fn test_get_merge_request_and_change_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7/merge_requests/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "iid": 3,
                "title": "Release",
                "author": {"name": "Jane", "username": "jane", "email": "jane@example.com"},
                "web_url": "https://gitlab.example.com/mr/3",
                "source_branch": "release",
                "target_branch": "master",
                "has_conflicts": false,
                "created_at": "2024-05-01T08:00:00Z",
                "changes_count": "4"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/7/merge_requests/3/changes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "changes": [
                    {"new_file": false, "renamed_file": false, "deleted_file": false, "diff": "+x\n"},
                    {"new_file": false, "renamed_file": false, "deleted_file": false, "diff": "   "},
                    {"new_file": true, "renamed_file": false, "deleted_file": false, "diff": ""}
                ]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let mr = client.get_merge_request(7, 3).await.unwrap();
        assert_eq!(mr.author.email.as_deref(), Some("jane@example.com"));
        assert_eq!(mr.changes_count.as_deref(), Some("4"));
        assert_eq!(client.get_merge_request_change_count(7, 3).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.list_repositories().await.unwrap_err();
        assert!(matches!(err, GitLabError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_cancelled_client_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancelSignal::new();
        cancel.trigger();
        let client = test_client(&server).with_cancellation(cancel);
        let err = client.test_connection().await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_aborts_stalled_body_read() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Headers promise 1000 bytes; only `[` is ever sent.
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 1000\r\n\r\n[",
                )
                .await
                .unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let cancel = CancelSignal::new();
        let client = GitLabClient::new(format!("http://{addr}"), "t")
            .with_request_interval(Duration::from_millis(1))
            .with_cancellation(cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.trigger();
        });

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(Duration::from_secs(3), client.list_repositories())
            .await
            .expect("list_repositories must return once cancelled");
        assert!(matches!(result, Err(GitLabError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(3));

        server.abort();
    }

    #[tokio::test]
    async fn test_zero_request_interval_still_sends() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
            .expect(2)
            .mount(&server)
            .await;

        let client = GitLabClient::new(server.uri(), "t").with_request_interval(Duration::ZERO);
        client.test_connection().await.unwrap();
        client.test_connection().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_client_rejects_requests() {
        let server = MockServer::start().await;
        let client = test_client(&server);
        client.close().await;
        assert!(client.is_closed());
        assert!(matches!(
            client.test_connection().await,
            Err(GitLabError::ClientClosed)
        ));
    }
}

//! GitLab REST API (v4) access.

pub mod client;
pub mod rate_limit;

pub use client::{GitLabClient, DEFAULT_PAGE_SIZE, DEFAULT_TIMEOUT};
pub use rate_limit::{RateLimiter, DEFAULT_REQUEST_INTERVAL, MIN_REQUEST_INTERVAL};

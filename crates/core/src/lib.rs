//! mr-conflict-checker core library.
//!
//! This crate provides the building blocks for finding conflicting
//! `release` -> `master` merge requests across a GitLab instance:
//! configuration, a rate-limited API client, the repository scanner, the
//! merge-request analyzer, and markdown report generation.

pub mod analyzer;
pub mod cancel;
pub mod config;
pub mod errors;
pub mod gitlab;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod scanner;

// Re-exports for convenience.
pub use cancel::CancelSignal;
pub use config::AppConfig;
pub use errors::CoreError;
pub use gitlab::GitLabClient;
pub use report::Report;
pub use scanner::RepositoryScanner;

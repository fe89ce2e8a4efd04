//! cve-finder crate
//!
//! Discovers repositories that reference CVE identifiers by querying the GitHub GraphQL
//! search API, working around its 1000-result ceiling and its rate limits.
//!
//! # Module Organization
//!
//! - [`github`]: rate-limit-aware query execution and the fixed query shapes
//! - [`search`]: date-range partitioning of repository searches
//! - [`details`]: batched retrieval of repository detail documents
//! - [`extract`]: CVE identifier extraction and normalization
//! - [`finder`]: orchestration of a complete run
//! - [`commands`]: command-line interface

/// Result type alias using `ohno::AppError` as the default error type.
pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

pub mod cancel;
pub mod commands;
pub mod config;
pub mod details;
pub mod extract;
pub mod finder;
pub mod github;
pub mod index;
pub mod model;
pub mod progress;
pub mod reports;
pub mod search;

pub use crate::commands::{Host, run};

//! # API Client
//!
//! HTTP transport for the ambulatorio persistence service.
//!
//! Implements [`amb_core::PersistenceService`] with `reqwest`. The core stays unaware of
//! URLs, headers and status codes; this crate turns them into
//! [`amb_core::RemoteCallError`]s.

pub mod client;
pub mod config;

pub use client::HttpPersistenceService;
pub use config::{base_url_from_env_value, timeout_from_env_value, RemoteConfig};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid persistence service URL: {0}")]
    InvalidBaseUrl(String),
    #[error("invalid request timeout '{0}': expected whole seconds")]
    InvalidTimeout(String),
    #[error("failed to build HTTP client: {0}")]
    Build(reqwest::Error),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

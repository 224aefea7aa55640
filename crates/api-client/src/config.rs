//! Transport configuration.
//!
//! Resolved once at startup from raw environment values, the same way the core's
//! [`amb_core::CoreConfig`] is.

use crate::{ClientError, ClientResult};
use reqwest::Url;
use std::time::Duration;

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8001/api";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteConfig {
    base_url: Url,
    api_token: Option<String>,
    timeout: Option<Duration>,
}

impl RemoteConfig {
    /// Create a new `RemoteConfig`.
    ///
    /// `base_url` must be an absolute `http` or `https` URL. The core defines no
    /// timeouts of its own; `timeout` is the only one applied to calls.
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        timeout: Option<Duration>,
    ) -> ClientResult<Self> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| ClientError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl(format!(
                "{base_url}: expected an http(s) URL"
            )));
        }

        let api_token = api_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(Self {
            base_url,
            api_token,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Returns the configured base URL, or [`DEFAULT_BASE_URL`] when unset or blank.
pub fn base_url_from_env_value(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// Parse a request timeout in whole seconds from an optional string value.
///
/// `None`, blank and `0` all mean "no timeout".
pub fn timeout_from_env_value(value: Option<String>) -> ClientResult<Option<Duration>> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let Some(value) = value else {
        return Ok(None);
    };

    let secs: u64 = value
        .parse()
        .map_err(|_| ClientError::InvalidTimeout(value.clone()))?;
    Ok((secs > 0).then_some(Duration::from_secs(secs)))
}

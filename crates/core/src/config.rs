//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into the core services.
//! Nothing in this crate reads environment variables while handling an operation.

use crate::constants::DEFAULT_SITE;
use crate::error::{CoreError, CoreResult};
use crate::patient::Site;

/// Core configuration resolved at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoreConfig {
    site: Site,
}

impl CoreConfig {
    pub fn new(site: Site) -> Self {
        Self { site }
    }

    /// The clinical site this process works for. Every list, creation and record
    /// operation is scoped to it.
    pub fn site(&self) -> Site {
        self.site
    }
}

/// Parse the working site from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default site.
pub fn site_from_env_value(value: Option<String>) -> CoreResult<Site> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        None => Ok(DEFAULT_SITE),
        Some(v) => Site::parse(&v).map_err(|e| CoreError::Config(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_defaults_when_unset_or_blank() {
        assert_eq!(site_from_env_value(None).unwrap(), Site::PtaCentro);
        assert_eq!(
            site_from_env_value(Some("   ".into())).unwrap(),
            Site::PtaCentro
        );
    }

    #[test]
    fn site_parses_configured_value() {
        assert_eq!(
            site_from_env_value(Some(" villa_ginestre\n".into())).unwrap(),
            Site::VillaGinestre
        );
    }

    #[test]
    fn unknown_site_is_a_config_error() {
        let err = site_from_env_value(Some("ospedale".into())).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}

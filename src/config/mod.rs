//! Configuration resolution.
//!
//! [`ProxyOptions`] is the raw, caller-supplied shape (deserialized from an
//! options file or assembled from CLI flags). [`resolve`] validates it,
//! applies defaults, and produces the immutable [`ResolvedConfig`] that
//! every collaborator shares through an `Arc`. Submodules provide
//! validation, the trust-proxy directive, and options-file parsing.

pub mod sources;
pub mod trust;
pub mod validation;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::client::model::FeatureToggle;
use crate::error::ProxyError;
use crate::logging::{Logger, TracingLogger};
use trust::TrustProxySetting;

pub const DEFAULT_APP_NAME: &str = "unleash-proxy";
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_METRICS_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_MAX_BODY_SIZE: usize = 102_400;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProxyOptions {
    #[serde(default)]
    pub unleash_url: Option<String>,

    #[serde(default)]
    pub unleash_api_token: Option<String>,

    #[serde(default)]
    pub unleash_app_name: Option<String>,

    #[serde(default)]
    pub unleash_instance_id: Option<String>,

    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub proxy_base_path: Option<String>,

    #[serde(default)]
    pub trust_proxy: Option<TrustProxySetting>,

    /// Milliseconds between upstream toggle fetches.
    #[serde(default)]
    pub refresh_interval: Option<u64>,

    /// Milliseconds between upstream metrics submissions.
    #[serde(default)]
    pub metrics_interval: Option<u64>,

    #[serde(default)]
    pub enable_all_endpoint: Option<bool>,

    #[serde(default)]
    pub max_body_size: Option<usize>,

    #[serde(default)]
    pub openapi_schema_path: Option<PathBuf>,

    #[serde(default)]
    pub bootstrap: Vec<FeatureToggle>,

    #[serde(skip)]
    pub logger: Option<Arc<dyn Logger>>,
}

impl ProxyOptions {
    /// Overlay every field set in `overrides` on top of `self`.
    #[must_use]
    pub fn merge(self, overrides: Self) -> Self {
        Self {
            unleash_url: overrides.unleash_url.or(self.unleash_url),
            unleash_api_token: overrides.unleash_api_token.or(self.unleash_api_token),
            unleash_app_name: overrides.unleash_app_name.or(self.unleash_app_name),
            unleash_instance_id: overrides.unleash_instance_id.or(self.unleash_instance_id),
            environment: overrides.environment.or(self.environment),
            proxy_base_path: overrides.proxy_base_path.or(self.proxy_base_path),
            trust_proxy: overrides.trust_proxy.or(self.trust_proxy),
            refresh_interval: overrides.refresh_interval.or(self.refresh_interval),
            metrics_interval: overrides.metrics_interval.or(self.metrics_interval),
            enable_all_endpoint: overrides.enable_all_endpoint.or(self.enable_all_endpoint),
            max_body_size: overrides.max_body_size.or(self.max_body_size),
            openapi_schema_path: overrides.openapi_schema_path.or(self.openapi_schema_path),
            bootstrap: if overrides.bootstrap.is_empty() {
                self.bootstrap
            } else {
                overrides.bootstrap
            },
            logger: overrides.logger.or(self.logger),
        }
    }
}

/// Validated, immutable configuration. Never mutated after [`resolve`].
#[derive(Debug)]
pub struct ResolvedConfig {
    pub unleash_url: Option<Url>,
    pub unleash_api_token: Option<String>,
    pub app_name: String,
    pub instance_id: String,
    pub environment: Option<String>,
    /// Normalized: empty, or starts with `/` and has no trailing `/`.
    pub proxy_base_path: String,
    /// Passed through unvalidated; applying it may fail at composition time.
    pub trust_proxy: TrustProxySetting,
    pub refresh_interval: Duration,
    pub metrics_interval: Duration,
    pub enable_all_endpoint: bool,
    pub max_body_size: usize,
    pub openapi_schema_path: Option<PathBuf>,
    pub bootstrap: Vec<FeatureToggle>,
    pub logger: Arc<dyn Logger>,
}

impl ResolvedConfig {
    #[must_use]
    pub fn proxy_path(&self) -> String {
        format!("{}/proxy", self.proxy_base_path)
    }
}

pub fn resolve(options: ProxyOptions) -> Result<ResolvedConfig, ProxyError> {
    if let Err(errors) = validation::validate(&options) {
        return Err(ProxyError::ConfigValidation { errors });
    }

    // validate() has already checked the URL parses
    let unleash_url = options
        .unleash_url
        .as_deref()
        .map(Url::parse)
        .transpose()
        .map_err(|e| ProxyError::UriParse {
            source: Box::new(e),
        })?;

    let instance_id = options
        .unleash_instance_id
        .unwrap_or_else(|| format!("flagproxy-{}", uuid::Uuid::new_v4()));

    Ok(ResolvedConfig {
        unleash_url,
        unleash_api_token: options.unleash_api_token,
        app_name: options
            .unleash_app_name
            .unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
        instance_id,
        environment: options.environment,
        proxy_base_path: validation::normalize_base_path(
            options.proxy_base_path.as_deref().unwrap_or(""),
        ),
        trust_proxy: options.trust_proxy.unwrap_or_default(),
        refresh_interval: Duration::from_millis(
            options
                .refresh_interval
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_MS),
        ),
        metrics_interval: Duration::from_millis(
            options
                .metrics_interval
                .unwrap_or(DEFAULT_METRICS_INTERVAL_MS),
        ),
        enable_all_endpoint: options.enable_all_endpoint.unwrap_or(false),
        max_body_size: options.max_body_size.unwrap_or(DEFAULT_MAX_BODY_SIZE),
        openapi_schema_path: options.openapi_schema_path,
        bootstrap: options.bootstrap,
        logger: options.logger.unwrap_or_else(|| Arc::new(TracingLogger)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let config = resolve(ProxyOptions::default()).unwrap();
        assert_eq!(config.app_name, "unleash-proxy");
        assert_eq!(config.proxy_base_path, "");
        assert_eq!(config.proxy_path(), "/proxy");
        assert_eq!(config.trust_proxy, TrustProxySetting::Flag(false));
        assert_eq!(config.refresh_interval, Duration::from_millis(5_000));
        assert_eq!(config.metrics_interval, Duration::from_millis(30_000));
        assert!(!config.enable_all_endpoint);
        assert_eq!(config.max_body_size, 102_400);
        assert!(config.instance_id.starts_with("flagproxy-"));
    }

    #[test]
    fn base_path_is_normalized() {
        let options = ProxyOptions {
            proxy_base_path: Some("edge/".into()),
            ..Default::default()
        };
        let config = resolve(options).unwrap();
        assert_eq!(config.proxy_path(), "/edge/proxy");
    }

    #[test]
    fn invalid_trust_proxy_is_not_rejected_here() {
        let options = ProxyOptions {
            trust_proxy: Some(TrustProxySetting::Addresses("not-an-ip".into())),
            ..Default::default()
        };
        assert!(resolve(options).is_ok());
    }

    #[test]
    fn missing_token_is_fatal() {
        let options = ProxyOptions {
            unleash_url: Some("https://flags.example.com/api".into()),
            ..Default::default()
        };
        let err = resolve(options).unwrap_err();
        assert!(matches!(err, ProxyError::ConfigValidation { .. }));
    }

    #[test]
    fn each_resolution_gets_its_own_instance_id() {
        let a = resolve(ProxyOptions::default()).unwrap();
        let b = resolve(ProxyOptions::default()).unwrap();
        assert_ne!(a.instance_id, b.instance_id);
    }

    #[test]
    fn merge_prefers_overrides() {
        let file = ProxyOptions {
            proxy_base_path: Some("/file".into()),
            environment: Some("production".into()),
            ..Default::default()
        };
        let flags = ProxyOptions {
            proxy_base_path: Some("/flag".into()),
            ..Default::default()
        };
        let merged = file.merge(flags);
        assert_eq!(merged.proxy_base_path.as_deref(), Some("/flag"));
        assert_eq!(merged.environment.as_deref(), Some("production"));
    }
}

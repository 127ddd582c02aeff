//! Options validation with detailed error reporting.
//!
//! The [`validate`] function checks raw [`ProxyOptions`] for structural
//! errors such as a malformed upstream URL, a missing API token, zero
//! intervals, and duplicate bootstrap toggles. Returns a list of
//! [`ValidationError`] values with per-field suggestions.
//!
//! The trust-proxy directive is deliberately not checked here.

use std::collections::HashSet;

use url::Url;

use super::ProxyOptions;
use crate::error::ValidationError;

/// Validate the upstream URL. Returns `Ok(())` or a human-readable error.
pub fn validate_upstream_url(url: &str) -> Result<(), String> {
    match Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                Err(format!(
                    "unsupported scheme '{scheme}' (expected http or https)"
                ))
            } else {
                Ok(())
            }
        }
        Err(_) => Err(format!("'{url}' is not a valid URL")),
    }
}

/// Trim, drop trailing slashes, and ensure a leading slash when non-empty.
#[must_use]
pub fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn error(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.into(),
        message: message.into(),
        suggestion: None,
    }
}

pub fn validate(options: &ProxyOptions) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(ref url) = options.unleash_url {
        if let Err(msg) = validate_upstream_url(url) {
            errors.push(ValidationError {
                suggestion: (!url.contains("://")).then(|| format!("did you mean 'https://{url}'?")),
                ..error("unleashUrl", msg)
            });
        }
        if options
            .unleash_api_token
            .as_deref()
            .map_or(true, str::is_empty)
        {
            errors.push(ValidationError {
                suggestion: Some("set --unleash-api-token or UNLEASH_API_TOKEN".into()),
                ..error("unleashApiToken", "required when unleashUrl is set")
            });
        }
    }

    if let Some(ref base) = options.proxy_base_path {
        if base.contains(['?', '#', '*', '{', '}']) {
            errors.push(error(
                "proxyBasePath",
                format!("'{base}' must be a plain path prefix"),
            ));
        }
    }

    if options.refresh_interval == Some(0) {
        errors.push(error("refreshInterval", "must be greater than 0"));
    }
    if options.metrics_interval == Some(0) {
        errors.push(error("metricsInterval", "must be greater than 0"));
    }
    if options.max_body_size == Some(0) {
        errors.push(error("maxBodySize", "must be greater than 0"));
    }

    let mut seen = HashSet::new();
    for (i, toggle) in options.bootstrap.iter().enumerate() {
        if toggle.name.is_empty() {
            errors.push(error(
                &format!("bootstrap[{i}].name"),
                "toggle name cannot be empty",
            ));
        } else if !seen.insert(toggle.name.as_str()) {
            errors.push(error(
                &format!("bootstrap[{i}].name"),
                format!("duplicate toggle '{}'", toggle.name),
            ));
        }

        let total: u64 = toggle.variants.iter().map(|v| u64::from(v.weight)).sum();
        if total > u64::from(u32::MAX) {
            errors.push(ValidationError {
                suggestion: Some("weights are relative, scale them down (e.g. to sum to 1000)".into()),
                ..error(
                    &format!("bootstrap[{i}].variants"),
                    format!("variant weights add up to {total}, more than {}", u32::MAX),
                )
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[must_use]
pub fn format_validation_report(path: &str, options: &ProxyOptions) -> String {
    let upstream = options.unleash_url.as_deref().unwrap_or("none (bootstrap only)");
    let base = normalize_base_path(options.proxy_base_path.as_deref().unwrap_or(""));
    let trust = options
        .trust_proxy
        .as_ref()
        .map_or_else(|| "false".to_string(), ToString::to_string);

    let lines = [
        format!("  upstream:    {upstream}"),
        format!("  proxy path:  {base}/proxy"),
        format!("  trustProxy:  {trust}"),
        format!("  bootstrap:   {} toggles", options.bootstrap.len()),
    ];

    format!("{path} is valid\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::model::{FeatureToggle, VariantDefinition};

    fn toggle(name: &str) -> FeatureToggle {
        FeatureToggle {
            name: name.into(),
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn empty_options_pass() {
        assert!(validate(&ProxyOptions::default()).is_ok());
    }

    #[test]
    fn invalid_url_fails_with_suggestion() {
        let options = ProxyOptions {
            unleash_url: Some("flags.example.com".into()),
            unleash_api_token: Some("secret".into()),
            ..Default::default()
        };
        let errors = validate(&options).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].suggestion.as_deref(),
            Some("did you mean 'https://flags.example.com'?")
        );
    }

    #[test]
    fn unsupported_scheme_fails() {
        let options = ProxyOptions {
            unleash_url: Some("ftp://flags.example.com".into()),
            unleash_api_token: Some("secret".into()),
            ..Default::default()
        };
        let errors = validate(&options).unwrap_err();
        assert!(errors[0].message.contains("unsupported scheme"));
    }

    #[test]
    fn zero_intervals_fail() {
        let options = ProxyOptions {
            refresh_interval: Some(0),
            metrics_interval: Some(0),
            ..Default::default()
        };
        let errors = validate(&options).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn duplicate_bootstrap_toggle_fails() {
        let options = ProxyOptions {
            bootstrap: vec![toggle("checkout"), toggle("checkout")],
            ..Default::default()
        };
        let errors = validate(&options).unwrap_err();
        assert!(errors[0].message.contains("duplicate toggle"));
    }

    #[test]
    fn oversized_variant_weights_fail() {
        let mut heavy = toggle("checkout");
        heavy.variants = vec![
            VariantDefinition {
                name: "blue".into(),
                weight: u32::MAX,
                ..Default::default()
            },
            VariantDefinition {
                name: "green".into(),
                weight: 1,
                ..Default::default()
            },
        ];
        let options = ProxyOptions {
            bootstrap: vec![heavy],
            ..Default::default()
        };
        let errors = validate(&options).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "bootstrap[0].variants");
    }

    #[test]
    fn base_path_normalization() {
        assert_eq!(normalize_base_path(""), "");
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(normalize_base_path("edge"), "/edge");
        assert_eq!(normalize_base_path("/edge/"), "/edge");
    }
}

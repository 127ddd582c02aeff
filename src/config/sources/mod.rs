//! Options-file loading.
//!
//! Provides file-based options (YAML, JSON, TOML) gated by feature flags.
//! [`parse_options_str`] handles format-specific deserialization and
//! [`load_options`] reads a file asynchronously and picks the format from
//! its extension.

use std::path::Path;

use crate::config::ProxyOptions;
use crate::error::ProxyError;

/// Parse an options string based on file extension.
pub fn parse_options_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<ProxyOptions, ProxyError> {
    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| ProxyError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| ProxyError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| ProxyError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        other => {
            let _ = (content, path_display);
            Err(ProxyError::UnsupportedFormat(other.to_string()))
        }
    }
}

pub async fn load_options(path: &Path) -> Result<ProxyOptions, ProxyError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProxyError::ConfigFileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            ProxyError::Io(e)
        }
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    parse_options_str(ext, &content, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::trust::TrustProxySetting;

    #[test]
    fn unsupported_format_returns_error() {
        let result = parse_options_str("xml", "{}", "proxy.xml");
        assert!(matches!(result, Err(ProxyError::UnsupportedFormat(_))));
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_options_parse() {
        let content = r"
unleashUrl: https://flags.example.com/api
unleashApiToken: secret
proxyBasePath: /edge
trustProxy: loopback
bootstrap:
  - name: checkout
    enabled: true
";
        let options = parse_options_str("yaml", content, "proxy.yaml").unwrap();
        assert_eq!(options.proxy_base_path.as_deref(), Some("/edge"));
        assert_eq!(
            options.trust_proxy,
            Some(TrustProxySetting::Addresses("loopback".into()))
        );
        assert_eq!(options.bootstrap.len(), 1);
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn unknown_fields_are_rejected() {
        let result = parse_options_str("yaml", "proxyPort: 3000\n", "proxy.yaml");
        assert!(matches!(result, Err(ProxyError::ConfigParse { .. })));
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_trust_proxy_variants() {
        let hops = parse_options_str("json", r#"{"trustProxy": 2}"#, "a.json").unwrap();
        assert_eq!(hops.trust_proxy, Some(TrustProxySetting::Hops(2)));

        let flag = parse_options_str("json", r#"{"trustProxy": true}"#, "b.json").unwrap();
        assert_eq!(flag.trust_proxy, Some(TrustProxySetting::Flag(true)));

        let list =
            parse_options_str("json", r#"{"trustProxy": ["10.0.0.0/8"]}"#, "c.json").unwrap();
        assert_eq!(
            list.trust_proxy,
            Some(TrustProxySetting::List(vec!["10.0.0.0/8".into()]))
        );
    }
}

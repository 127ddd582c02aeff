//! Serde data structures shared by the evaluation client and the proxy
//! endpoints: toggle definitions as served by the upstream flag API, the
//! evaluation [`Context`], evaluated results, and SDK metrics/registration
//! payloads.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureToggle {
    pub name: String,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub strategies: Vec<Strategy>,

    #[serde(default)]
    pub variants: Vec<VariantDefinition>,

    #[serde(default)]
    pub impression_data: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Strategy {
    pub name: String,

    /// Upstream sends most parameters as strings but older servers emit
    /// numbers for `rollout` and `percentage`.
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

impl Strategy {
    #[must_use]
    pub fn param(&self, key: &str) -> Option<String> {
        match self.parameters.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct VariantDefinition {
    pub name: String,

    #[serde(default)]
    pub weight: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stickiness: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Payload {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
}

impl Context {
    /// Build a context from flat query parameters. Known keys map to their
    /// fields; `properties[key]` and any other key land in `properties`.
    #[must_use]
    pub fn from_query(query: HashMap<String, String>) -> Self {
        let mut context = Self::default();
        for (key, value) in query {
            match key.as_str() {
                "userId" => context.user_id = Some(value),
                "sessionId" => context.session_id = Some(value),
                "remoteAddress" => context.remote_address = Some(value),
                "environment" => context.environment = Some(value),
                "appName" => context.app_name = Some(value),
                _ => {
                    let name = key
                        .strip_prefix("properties[")
                        .and_then(|k| k.strip_suffix(']'))
                        .map_or(key.clone(), str::to_string);
                    context.properties.insert(name, value);
                }
            }
        }
        context
    }

    /// Value used for sticky bucketing.
    #[must_use]
    pub fn stickiness_value(&self, stickiness: &str) -> Option<&str> {
        match stickiness {
            "default" => self.user_id.as_deref().or(self.session_id.as_deref()),
            "userId" => self.user_id.as_deref(),
            "sessionId" => self.session_id.as_deref(),
            "remoteAddress" => self.remote_address.as_deref(),
            other => self.properties.get(other).map(String::as_str),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Variant {
    pub name: String,
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl Variant {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            name: "disabled".into(),
            enabled: false,
            payload: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedToggle {
    pub name: String,
    pub enabled: bool,
    pub variant: Variant,
    pub impression_data: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToggleCount {
    #[serde(default)]
    pub yes: u64,

    #[serde(default)]
    pub no: u64,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variants: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetricsBucket {
    #[serde(default)]
    pub start: String,

    #[serde(default)]
    pub stop: String,

    #[serde(default)]
    pub toggles: HashMap<String, ToggleCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMetrics {
    #[serde(default)]
    pub app_name: String,

    #[serde(default)]
    pub instance_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(default)]
    pub bucket: MetricsBucket,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRegistration {
    #[serde(default)]
    pub app_name: String,

    #[serde(default)]
    pub instance_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_version: Option<String>,

    #[serde(default)]
    pub strategies: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<String>,

    #[serde(default)]
    pub interval: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_maps_known_keys_and_properties() {
        let query: HashMap<String, String> = [
            ("userId", "42"),
            ("sessionId", "s-1"),
            ("properties[tier]", "gold"),
            ("region", "eu"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let context = Context::from_query(query);
        assert_eq!(context.user_id.as_deref(), Some("42"));
        assert_eq!(context.session_id.as_deref(), Some("s-1"));
        assert_eq!(context.properties["tier"], "gold");
        assert_eq!(context.properties["region"], "eu");
    }

    #[test]
    fn numeric_strategy_parameters_read_as_strings() {
        let strategy: Strategy =
            serde_json::from_str(r#"{"name":"flexibleRollout","parameters":{"rollout":50}}"#)
                .unwrap();
        assert_eq!(strategy.param("rollout").as_deref(), Some("50"));
        assert_eq!(strategy.param("groupId"), None);
    }

    #[test]
    fn upstream_toggle_ignores_unknown_fields() {
        let toggle: FeatureToggle = serde_json::from_str(
            r#"{"name":"checkout","enabled":true,"type":"release","project":"default",
                "strategies":[{"name":"default","constraints":[]}]}"#,
        )
        .unwrap();
        assert_eq!(toggle.strategies.len(), 1);
        assert!(!toggle.impression_data);
    }
}

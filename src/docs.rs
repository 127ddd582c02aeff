//! OpenAPI documentation service.
//!
//! [`OpenApiService`] owns the API schema document. It attaches the raw
//! schema route (`{basePath}/docs/openapi.json`) to the application and
//! backs the interactive `/docs` page ([`docs_page`]), which loads the
//! schema at request time and renders it with Swagger UI.
//!
//! When `openapiSchemaPath` is configured the schema is read from that
//! file on every request, so a regenerated file is picked up without a
//! restart. Otherwise the built-in document describing the proxy endpoints
//! is served.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::Json;
use serde_json::{json, Value};

use crate::app::App;
use crate::config::ResolvedConfig;
use crate::error::ProxyError;

pub const DOCS_PATH: &str = "/docs";

const SWAGGER_UI_VERSION: &str = "5";

#[derive(Debug)]
pub struct OpenApiService {
    base_path: String,
    schema_path: Option<PathBuf>,
    builtin: Value,
}

impl OpenApiService {
    #[must_use]
    pub fn new(config: &ResolvedConfig) -> Self {
        Self {
            base_path: config.proxy_base_path.clone(),
            schema_path: config.openapi_schema_path.clone(),
            builtin: builtin_schema(&config.proxy_base_path, &config.app_name),
        }
    }

    #[must_use]
    pub fn schema_url(&self) -> String {
        format!("{}{DOCS_PATH}/openapi.json", self.base_path)
    }

    /// Register the raw schema route on `app`.
    pub fn use_docs(self: &Arc<Self>, app: &mut App) {
        app.route(
            &self.schema_url(),
            get(openapi_json).with_state(Arc::clone(self)),
        );
    }

    pub async fn load_schema(&self) -> Result<Value, ProxyError> {
        let Some(ref path) = self.schema_path else {
            return Ok(self.builtin.clone());
        };

        let location = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProxyError::SchemaLoad {
                location: location.clone(),
                source: Box::new(e),
            })?;
        serde_json::from_str(&content).map_err(|e| ProxyError::SchemaLoad {
            location,
            source: Box::new(e),
        })
    }
}

async fn openapi_json(State(docs): State<Arc<OpenApiService>>) -> Result<Json<Value>, ProxyError> {
    docs.load_schema().await.map(Json)
}

pub async fn docs_page(State(docs): State<Arc<OpenApiService>>) -> Result<Html<String>, ProxyError> {
    let schema = docs.load_schema().await?;
    Ok(Html(render_html(&schema)))
}

/// Swagger UI page with `schema` inlined.
#[must_use]
pub fn render_html(schema: &Value) -> String {
    let title = schema
        .pointer("/info/title")
        .and_then(Value::as_str)
        .unwrap_or("API documentation");
    // `</` inside a <script> would end it early
    let document = schema.to_string().replace("</", "<\\/");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title}</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@{SWAGGER_UI_VERSION}/swagger-ui.css">
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@{SWAGGER_UI_VERSION}/swagger-ui-bundle.js"></script>
  <script>
    window.onload = function () {{
      window.ui = SwaggerUIBundle({{
        spec: {document},
        dom_id: '#swagger-ui',
        deepLinking: true
      }});
    }};
  </script>
</body>
</html>
"#,
        title = escape_html(title),
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn builtin_schema(base_path: &str, app_name: &str) -> Value {
    let toggles_response = json!({
        "description": "Evaluated feature toggles",
        "headers": { "ETag": { "schema": { "type": "string" } } },
        "content": { "application/json": { "schema": { "$ref": "#/components/schemas/togglesSchema" } } }
    });
    let not_ready = json!({ "description": "The flag client has not received toggles yet" });
    let context_params = json!([
        { "name": "userId", "in": "query", "schema": { "type": "string" } },
        { "name": "sessionId", "in": "query", "schema": { "type": "string" } },
        { "name": "remoteAddress", "in": "query", "schema": { "type": "string" } },
        { "name": "properties", "in": "query", "style": "deepObject",
          "schema": { "type": "object", "additionalProperties": { "type": "string" } } }
    ]);
    let toggles_request = json!({
        "content": { "application/json": { "schema": { "$ref": "#/components/schemas/togglesRequestSchema" } } }
    });

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": format!("{app_name} API"),
            "version": env!("CARGO_PKG_VERSION"),
        },
        "servers": [ { "url": if base_path.is_empty() { "/" } else { base_path } } ],
        "paths": {
            "/proxy": {
                "get": {
                    "summary": "Enabled toggles for the query-string context",
                    "parameters": context_params.clone(),
                    "responses": { "200": toggles_response.clone(), "304": { "description": "Not modified" }, "503": not_ready.clone() }
                },
                "post": {
                    "summary": "Enabled (or named) toggles for the body context",
                    "requestBody": toggles_request.clone(),
                    "responses": { "200": toggles_response.clone(), "400": { "description": "Malformed JSON body" }, "503": not_ready.clone() }
                }
            },
            "/proxy/all": {
                "get": {
                    "summary": "All toggles, including disabled ones",
                    "parameters": context_params,
                    "responses": { "200": toggles_response.clone(), "501": { "description": "Endpoint disabled" }, "503": not_ready.clone() }
                },
                "post": {
                    "summary": "All toggles for the body context",
                    "requestBody": toggles_request,
                    "responses": { "200": toggles_response, "501": { "description": "Endpoint disabled" }, "503": not_ready.clone() }
                }
            },
            "/proxy/health": {
                "get": {
                    "summary": "Proxy readiness",
                    "responses": { "200": { "description": "ok" }, "503": not_ready }
                }
            },
            "/proxy/client/metrics": {
                "post": {
                    "summary": "Register usage metrics from a frontend SDK",
                    "responses": { "200": { "description": "Accepted" }, "400": { "description": "Malformed JSON body" } }
                }
            },
            "/proxy/client/register": {
                "post": {
                    "summary": "Register a frontend SDK instance",
                    "responses": { "200": { "description": "Accepted" }, "400": { "description": "Malformed JSON body" } }
                }
            }
        },
        "components": {
            "schemas": {
                "contextSchema": {
                    "type": "object",
                    "properties": {
                        "userId": { "type": "string" },
                        "sessionId": { "type": "string" },
                        "remoteAddress": { "type": "string" },
                        "environment": { "type": "string" },
                        "appName": { "type": "string" },
                        "properties": { "type": "object", "additionalProperties": { "type": "string" } }
                    }
                },
                "togglesRequestSchema": {
                    "type": "object",
                    "properties": {
                        "context": { "$ref": "#/components/schemas/contextSchema" },
                        "toggles": { "type": "array", "items": { "type": "string" } }
                    }
                },
                "togglesSchema": {
                    "type": "object",
                    "required": ["toggles"],
                    "properties": {
                        "toggles": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["name", "enabled", "variant", "impressionData"],
                                "properties": {
                                    "name": { "type": "string" },
                                    "enabled": { "type": "boolean" },
                                    "impressionData": { "type": "boolean" },
                                    "variant": {
                                        "type": "object",
                                        "properties": {
                                            "name": { "type": "string" },
                                            "enabled": { "type": "boolean" },
                                            "payload": {
                                                "type": "object",
                                                "properties": { "type": { "type": "string" }, "value": { "type": "string" } }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ProxyOptions};

    fn service(options: ProxyOptions) -> OpenApiService {
        OpenApiService::new(&resolve(options).unwrap())
    }

    #[test]
    fn schema_url_follows_base_path() {
        let docs = service(ProxyOptions {
            proxy_base_path: Some("/edge".into()),
            ..Default::default()
        });
        assert_eq!(docs.schema_url(), "/edge/docs/openapi.json");
    }

    #[tokio::test]
    async fn builtin_schema_describes_proxy() {
        let docs = service(ProxyOptions::default());
        let schema = docs.load_schema().await.unwrap();
        assert_eq!(schema["openapi"], "3.0.3");
        assert!(schema["paths"]["/proxy"]["post"].is_object());
        assert_eq!(schema["info"]["title"], "unleash-proxy API");
    }

    #[tokio::test]
    async fn missing_schema_file_is_an_error() {
        let docs = service(ProxyOptions {
            openapi_schema_path: Some("/nonexistent/openapi.json".into()),
            ..Default::default()
        });
        let err = docs.load_schema().await.unwrap_err();
        assert!(matches!(err, ProxyError::SchemaLoad { .. }));
    }

    #[test]
    fn html_inlines_schema_and_escapes_script_end() {
        let schema = json!({ "info": { "title": "Flags <API>" }, "x": "</script>" });
        let html = render_html(&schema);
        assert!(html.contains("SwaggerUIBundle"));
        assert!(html.contains("<title>Flags &lt;API&gt;</title>"));
        assert!(html.contains(r"<\/script>"));
        assert!(!html.contains(r#""x":"</script>""#));
    }
}

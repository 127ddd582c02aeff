//! Calls to the upstream flag API.
//!
//! [`fetch_features`] performs a conditional `GET {url}/client/features`
//! and [`post_metrics`] submits a usage bucket to `{url}/client/metrics`.
//! Both send the identifying `UNLEASH-APPNAME` / `UNLEASH-INSTANCEID`
//! headers and the API token.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{self, HeaderValue};
use hyper::{Method, Request, StatusCode};
use serde::Deserialize;
use url::Url;

use super::model::{ClientMetrics, FeatureToggle};
use crate::config::ResolvedConfig;
use crate::error::ProxyError;
use crate::server::HttpClient;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct FeaturesResponse {
    #[serde(default)]
    features: Vec<FeatureToggle>,
}

#[derive(Debug)]
pub enum FetchOutcome {
    NotModified,
    Updated {
        features: Vec<FeatureToggle>,
        etag: Option<String>,
    },
}

fn endpoint(base: &Url, path: &str) -> String {
    format!("{}/{path}", base.as_str().trim_end_matches('/'))
}

fn request(
    config: &ResolvedConfig,
    method: Method,
    uri: &str,
    body: Bytes,
) -> Result<hyper::http::request::Builder, ProxyError> {
    let uri: hyper::Uri = uri.parse().map_err(
        |e: hyper::http::uri::InvalidUri| ProxyError::UriParse {
            source: Box::new(e),
        },
    )?;

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("unleash-appname", &config.app_name)
        .header("unleash-instanceid", &config.instance_id)
        .header(header::USER_AGENT, concat!("flagproxy/", env!("CARGO_PKG_VERSION")));

    if let Some(ref token) = config.unleash_api_token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    if !body.is_empty() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    Ok(builder)
}

async fn send(
    http: &HttpClient,
    req: Request<Full<Bytes>>,
) -> Result<(StatusCode, hyper::HeaderMap, Bytes), ProxyError> {
    let response = tokio::time::timeout(REQUEST_TIMEOUT, http.request(req))
        .await
        .map_err(|_| ProxyError::HttpRequest {
            source: format!("upstream request timed out after {}s", REQUEST_TIMEOUT.as_secs())
                .into(),
        })?
        .map_err(|e| ProxyError::HttpRequest {
            source: Box::new(e),
        })?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| ProxyError::HttpRequest {
            source: Box::new(e),
        })?
        .to_bytes();
    Ok((status, headers, body))
}

pub async fn fetch_features(
    http: &HttpClient,
    config: &ResolvedConfig,
    base: &Url,
    etag: Option<&str>,
) -> Result<FetchOutcome, ProxyError> {
    let uri = endpoint(base, "client/features");
    let mut builder = request(config, Method::GET, &uri, Bytes::new())?;
    if let Some(tag) = etag.and_then(|t| HeaderValue::from_str(t).ok()) {
        builder = builder.header(header::IF_NONE_MATCH, tag);
    }
    let req = builder
        .body(Full::new(Bytes::new()))
        .map_err(|e| ProxyError::HttpRequest {
            source: Box::new(e),
        })?;

    let (status, headers, body) = send(http, req).await?;
    if status == StatusCode::NOT_MODIFIED {
        return Ok(FetchOutcome::NotModified);
    }
    if !status.is_success() {
        return Err(ProxyError::UpstreamStatus(status));
    }

    let parsed: FeaturesResponse =
        serde_json::from_slice(&body).map_err(|e| ProxyError::HttpRequest {
            source: Box::new(e),
        })?;
    let etag = headers
        .get(header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    Ok(FetchOutcome::Updated {
        features: parsed.features,
        etag,
    })
}

pub async fn post_metrics(
    http: &HttpClient,
    config: &ResolvedConfig,
    base: &Url,
    metrics: &ClientMetrics,
) -> Result<(), ProxyError> {
    let uri = endpoint(base, "client/metrics");
    let body = Bytes::from(serde_json::to_vec(metrics).map_err(|e| {
        ProxyError::HttpRequest {
            source: Box::new(e),
        }
    })?);
    let req = request(config, Method::POST, &uri, body.clone())?
        .body(Full::new(body))
        .map_err(|e| ProxyError::HttpRequest {
            source: Box::new(e),
        })?;

    let (status, _, _) = send(http, req).await?;
    if status.is_success() {
        Ok(())
    } else {
        Err(ProxyError::UpstreamStatus(status))
    }
}

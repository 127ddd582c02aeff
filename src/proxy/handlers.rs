//! Handlers behind `{basePath}/proxy`.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::body::JsonBody;
use super::ProxyState;
use crate::client::model::{ClientMetrics, ClientRegistration, Context, EvaluatedToggle};
use crate::middleware::ClientIp;

const NOT_READY: &str = "Not ready";

const ALL_ENDPOINT_DISABLED: &str = "The /proxy/all endpoint is disabled. \
    To enable it, set the `enableAllEndpoint` option or the \
    `ENABLE_ALL_ENDPOINT` environment variable to `true`.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct TogglesRequest {
    context: Context,
    toggles: Vec<String>,
}

#[derive(Serialize)]
struct TogglesResponse<'a> {
    toggles: &'a [EvaluatedToggle],
}

fn not_ready() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, NOT_READY).into_response()
}

fn etag_matches(request_headers: &HeaderMap, etag: &str) -> bool {
    request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.split(',').map(str::trim).any(|candidate| {
                candidate == "*"
                    || candidate == etag
                    || candidate.strip_prefix("W/") == Some(etag)
            })
        })
}

impl ProxyState {
    /// Fill context gaps from the connection and the configuration.
    fn context(&self, mut context: Context, ClientIp(ip): ClientIp) -> Context {
        if context.remote_address.is_none() {
            context.remote_address = ip.map(|ip| ip.to_string());
        }
        if context.environment.is_none() {
            context.environment.clone_from(&self.config.environment);
        }
        if context.app_name.is_none() {
            context.app_name = Some(self.config.app_name.clone());
        }
        context
    }

    fn toggles_response(&self, request_headers: &HeaderMap, toggles: &[EvaluatedToggle]) -> Response {
        let body = match serde_json::to_vec(&TogglesResponse { toggles }) {
            Ok(body) => body,
            Err(e) => {
                self.config
                    .logger
                    .error("failed to serialize toggles", &e);
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let etag = format!("\"{:x}\"", Sha256::digest(&body));
        let mut response = if etag_matches(request_headers, &etag) {
            StatusCode::NOT_MODIFIED.into_response()
        } else {
            ([(header::CONTENT_TYPE, "application/json")], body).into_response()
        };

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&etag) {
            headers.insert(header::ETAG, value);
        }
        let described_by = format!("<{}>; rel=\"describedby\"", self.docs.schema_url());
        if let Ok(value) = HeaderValue::from_str(&described_by) {
            headers.insert(header::LINK, value);
        }
        response
    }
}

pub(super) async fn get_enabled(
    State(state): State<ProxyState>,
    ip: ClientIp,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !state.client.is_ready() {
        return not_ready();
    }
    let context = state.context(Context::from_query(query), ip);
    let toggles = state.client.get_enabled_toggles(&context);
    state.toggles_response(&headers, &toggles)
}

pub(super) async fn post_enabled(
    State(state): State<ProxyState>,
    ip: ClientIp,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    if !state.client.is_ready() {
        return not_ready();
    }
    let request: TogglesRequest = match body.into_typed() {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };
    let context = state.context(request.context, ip);
    let toggles = if request.toggles.is_empty() {
        state.client.get_enabled_toggles(&context)
    } else {
        state.client.get_defined_toggles(&request.toggles, &context)
    };
    state.toggles_response(&headers, &toggles)
}

pub(super) async fn get_all(
    State(state): State<ProxyState>,
    ip: ClientIp,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !state.config.enable_all_endpoint {
        return (StatusCode::NOT_IMPLEMENTED, ALL_ENDPOINT_DISABLED).into_response();
    }
    if !state.client.is_ready() {
        return not_ready();
    }
    let context = state.context(Context::from_query(query), ip);
    let toggles = state.client.get_all_toggles(&context);
    state.toggles_response(&headers, &toggles)
}

pub(super) async fn post_all(
    State(state): State<ProxyState>,
    ip: ClientIp,
    headers: HeaderMap,
    body: JsonBody,
) -> Response {
    if !state.config.enable_all_endpoint {
        return (StatusCode::NOT_IMPLEMENTED, ALL_ENDPOINT_DISABLED).into_response();
    }
    if !state.client.is_ready() {
        return not_ready();
    }
    let request: TogglesRequest = match body.into_typed() {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };
    let context = state.context(request.context, ip);
    let toggles = state.client.get_all_toggles(&context);
    state.toggles_response(&headers, &toggles)
}

pub(super) async fn health(State(state): State<ProxyState>) -> Response {
    if state.client.is_ready() {
        (StatusCode::OK, "ok").into_response()
    } else {
        not_ready()
    }
}

pub(super) async fn metrics(State(state): State<ProxyState>, body: JsonBody) -> Response {
    match body.into_typed::<ClientMetrics>() {
        Ok(metrics) => {
            state.client.register_metrics(metrics);
            StatusCode::OK.into_response()
        }
        Err(rejection) => rejection,
    }
}

pub(super) async fn register(State(state): State<ProxyState>, body: JsonBody) -> Response {
    match body.into_typed::<ClientRegistration>() {
        Ok(registration) => {
            state.client.register_client(registration);
            StatusCode::OK.into_response()
        }
        Err(rejection) => rejection,
    }
}

//! JSON body parsing scoped to the proxy endpoint.
//!
//! [`parse_json`] reads bodies declared as JSON (`application/json` or a
//! `+json` suffix) up to the configured limit, rejects malformed or
//! non-container payloads with `400`, oversized ones with `413`, and
//! exposes the parsed value to handlers as [`JsonBody`]. Requests with any
//! other content type pass through untouched and handlers see an empty
//! body.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http_body_util::LengthLimitError;
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonBody(pub Option<serde_json::Value>);

impl JsonBody {
    /// Deserialize the parsed body, treating an absent body as `{}`.
    pub fn into_typed<T: DeserializeOwned + Default>(self) -> Result<T, Response> {
        match self.0 {
            None => Ok(T::default()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| rejection(StatusCode::BAD_REQUEST, &e.to_string())),
        }
    }
}

impl<S> FromRequestParts<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned().unwrap_or_default())
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| mime.trim().to_ascii_lowercase())
        .is_some_and(|mime| mime == "application/json" || mime.ends_with("+json"))
}

fn rejection(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": status.canonical_reason().unwrap_or("error"),
            "message": message,
        })),
    )
        .into_response()
}

/// The limit error may sit below other body errors in the source chain.
fn exceeds_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

pub async fn parse_json(State(limit): State<usize>, request: Request, next: Next) -> Response {
    if !is_json(request.headers()) {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return if exceeds_limit(&e) {
                rejection(StatusCode::PAYLOAD_TOO_LARGE, "request entity too large")
            } else {
                rejection(StatusCode::BAD_REQUEST, &e.to_string())
            };
        }
    };

    let parsed = if bytes.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(value) if value.is_object() || value.is_array() => Some(value),
            Ok(_) => {
                return rejection(
                    StatusCode::BAD_REQUEST,
                    "JSON body must be an object or an array",
                )
            }
            Err(e) => return rejection(StatusCode::BAD_REQUEST, &e.to_string()),
        }
    };

    parts.extensions.insert(JsonBody(parsed));
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

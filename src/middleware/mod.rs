//! Tower/axum middleware shared by the composed application.
//!
//! - [`cors_layer`] builds the single cross-origin policy used both
//!   globally and on the proxy endpoint. [`expose_etag_layer`] goes
//!   outside it so preflight answers also list `ETag` as exposed.
//! - [`resolve_client_ip`] applies the trust-proxy directive and stores
//!   the result as a [`ClientIp`] request extension.
//! - [`strip_fingerprint`] drops implementation-identifying headers.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use http::{header, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::trust::TrustProxy;

/// Browsers may cache a preflight result for 48 hours.
pub const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(172_800);

#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::DELETE,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers([header::ETAG])
        .max_age(PREFLIGHT_MAX_AGE)
}

/// `CorsLayer` only sets `Access-Control-Expose-Headers` on actual
/// requests. Wrapped around it, this adds the header to preflight
/// responses and leaves the ones `CorsLayer` already set alone.
#[must_use]
pub fn expose_etag_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("etag"),
    )
}

/// Client address after applying the trust-proxy directive. `None` when
/// the connection carried no peer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientIp(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().copied().unwrap_or_default())
    }
}

pub async fn resolve_client_ip(
    State(trust): State<Arc<TrustProxy>>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let client = peer.map(|peer| {
        let forwarded_for = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok());
        trust.client_addr(peer, forwarded_for)
    });

    request.extensions_mut().insert(ClientIp(client));
    next.run(request).await
}

pub async fn strip_fingerprint(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.remove("x-powered-by");
    headers.remove(header::SERVER);
    response
}

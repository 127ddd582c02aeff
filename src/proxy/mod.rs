//! The proxy endpoint.
//!
//! [`ProxyHandler`] turns an [`EvaluationClient`], the resolved
//! configuration, and the documentation service into a router mounted at
//! `{basePath}/proxy`. The router carries its own CORS policy, request
//! body limit, and JSON body parsing ([`body`]) so nothing outside the
//! proxy path pays for parsing.

pub mod body;
mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::client::EvaluationClient;
use crate::config::ResolvedConfig;
use crate::docs::OpenApiService;
use crate::middleware::{cors_layer, expose_etag_layer};

#[derive(Clone)]
pub(crate) struct ProxyState {
    client: Arc<dyn EvaluationClient>,
    config: Arc<ResolvedConfig>,
    docs: Arc<OpenApiService>,
}

pub struct ProxyHandler {
    state: ProxyState,
}

impl ProxyHandler {
    #[must_use]
    pub fn new(
        client: Arc<dyn EvaluationClient>,
        config: Arc<ResolvedConfig>,
        docs: Arc<OpenApiService>,
    ) -> Self {
        Self {
            state: ProxyState {
                client,
                config,
                docs,
            },
        }
    }

    /// Request handling for the proxy path, relative to its mount point.
    #[must_use]
    pub fn router(&self) -> Router {
        let max_body = self.state.config.max_body_size;
        Router::new()
            .route("/", get(handlers::get_enabled).post(handlers::post_enabled))
            .route("/all", get(handlers::get_all).post(handlers::post_all))
            .route("/health", get(handlers::health))
            .route("/client/metrics", post(handlers::metrics))
            .route("/client/register", post(handlers::register))
            .layer(axum::middleware::from_fn_with_state(max_body, body::parse_json))
            .layer(RequestBodyLimitLayer::new(max_body))
            .layer(cors_layer())
            .layer(expose_etag_layer())
            .with_state(self.state.clone())
    }
}

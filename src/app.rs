//! Application container and the composer that assembles it.
//!
//! [`App`] wraps an axum [`Router`] with the bookkeeping axum itself does
//! not offer:
//!
//! - **Global layers** installed through [`App::layer`] wrap every route,
//!   including those registered after the layer. They are deferred until
//!   [`App::into_router`] and applied so the first installed layer is the
//!   outermost.
//! - **First registration wins.** A route whose path was already claimed
//!   (exactly, or underneath a nested router) is skipped with a warning
//!   rather than replacing the earlier handler.
//! - **Trust proxy** and **fingerprint suppression** are application
//!   settings applied as middleware when the router is built.
//!
//! [`compose`] (and the [`Composer`] builder behind it) wires the proxy
//! endpoint, the documentation page, and generated routes into an `App`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::IntoResponse;
use axum::routing::{get, MethodRouter, Route};
use axum::Router;
use tower::{Layer, Service};
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::client::{Client, EvaluationClient};
use crate::config::trust::{TrustProxy, TrustProxySetting};
use crate::config::{self, ProxyOptions, ResolvedConfig};
use crate::docs::{self, OpenApiService, DOCS_PATH};
use crate::error::ProxyError;
use crate::middleware;
use crate::proxy::ProxyHandler;
use crate::routes::{self, GeneratedRoute};

type GlobalLayer = Box<dyn FnOnce(Router) -> Router + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Claim {
    Exact(String),
    Nested(String),
}

/// `inner` is `outer` itself or a path below it.
fn is_under(inner: &str, outer: &str) -> bool {
    inner
        .strip_prefix(outer)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

impl Claim {
    fn path(&self) -> &str {
        match self {
            Self::Exact(p) | Self::Nested(p) => p,
        }
    }

    fn overlaps(&self, path: &str, nested: bool) -> bool {
        match self {
            Self::Exact(claimed) if nested => is_under(claimed, path),
            Self::Exact(claimed) => claimed == path,
            Self::Nested(claimed) => is_under(path, claimed) || (nested && is_under(claimed, path)),
        }
    }
}

pub struct App {
    router: Router,
    claims: Vec<Claim>,
    layers: Vec<GlobalLayer>,
    trust: TrustProxy,
    hide_fingerprint: bool,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("paths", &self.registered_paths())
            .field("layers", &self.layers.len())
            .field("trust", &self.trust)
            .field("hide_fingerprint", &self.hide_fingerprint)
            .finish()
    }
}

impl App {
    #[must_use]
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            claims: Vec::new(),
            layers: Vec::new(),
            trust: TrustProxy::default(),
            hide_fingerprint: false,
        }
    }

    fn claimed_by(&self, path: &str, nested: bool) -> Option<&str> {
        self.claims
            .iter()
            .find(|claim| claim.overlaps(path, nested))
            .map(Claim::path)
    }

    /// Register `method_router` at `path`. Returns `false` (and leaves the
    /// existing handler in place) if the path is already claimed.
    pub fn route(&mut self, path: &str, method_router: MethodRouter) -> bool {
        if !path.starts_with('/') {
            tracing::warn!(path, "route path must start with '/', skipping");
            return false;
        }
        if let Some(owner) = self.claimed_by(path, false) {
            tracing::warn!(path, owner, "path already registered, skipping");
            return false;
        }
        self.claims.push(Claim::Exact(path.to_owned()));
        self.router = std::mem::take(&mut self.router).route(path, method_router);
        true
    }

    /// Mount `router` under `path`. The whole subtree is claimed.
    pub fn nest(&mut self, path: &str, router: Router) -> bool {
        if !path.starts_with('/') || path == "/" {
            tracing::warn!(path, "nest path must be a non-root path, skipping");
            return false;
        }
        if let Some(owner) = self.claimed_by(path, true) {
            tracing::warn!(path, owner, "path already registered, skipping");
            return false;
        }
        self.claims.push(Claim::Nested(path.to_owned()));
        self.router = std::mem::take(&mut self.router).nest(path, router);
        true
    }

    /// Install a layer around every route of the finished application.
    pub fn layer<L>(&mut self, layer: L)
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.layers.push(Box::new(move |router: Router| router.layer(layer)));
    }

    /// Stop advertising the implementation in response headers.
    pub fn disable_fingerprint(&mut self) {
        self.hide_fingerprint = true;
    }

    /// Set the trust-proxy directive. On error the previous directive is kept.
    pub fn set_trust_proxy(&mut self, setting: &TrustProxySetting) -> Result<(), ProxyError> {
        self.trust = TrustProxy::parse(setting)?;
        Ok(())
    }

    #[must_use]
    pub const fn trust_proxy(&self) -> &TrustProxy {
        &self.trust
    }

    #[must_use]
    pub const fn fingerprint_hidden(&self) -> bool {
        self.hide_fingerprint
    }

    /// Paths in registration order. Nested mounts are reported by prefix.
    #[must_use]
    pub fn registered_paths(&self) -> Vec<&str> {
        self.claims.iter().map(Claim::path).collect()
    }

    /// Build the servable router.
    #[must_use]
    pub fn into_router(self) -> Router {
        let mut router = self.router.layer(axum::middleware::from_fn_with_state(
            Arc::new(self.trust),
            middleware::resolve_client_ip,
        ));
        for apply in self.layers.into_iter().rev() {
            router = apply(router);
        }
        if self.hide_fingerprint {
            router = router.layer(axum::middleware::map_response(middleware::strip_fingerprint));
        }
        router.layer(TraceLayer::new_for_http())
    }
}

/// Step-by-step builder for a composed [`App`].
///
/// ```no_run
/// # use flagproxy::app::Composer;
/// # use flagproxy::config::ProxyOptions;
/// let app = Composer::new(ProxyOptions::default()).build()?;
/// # Ok::<(), flagproxy::error::ProxyError>(())
/// ```
pub struct Composer {
    source: ConfigSource,
    client: Option<Arc<dyn EvaluationClient>>,
    app: Option<App>,
    extra_routes: Vec<GeneratedRoute>,
}

enum ConfigSource {
    Options(ProxyOptions),
    Resolved(Arc<ResolvedConfig>),
}

impl Composer {
    #[must_use]
    pub fn new(options: ProxyOptions) -> Self {
        Self::with_source(ConfigSource::Options(options))
    }

    /// Compose around a configuration that is already resolved, so the
    /// application shares it with a client built from the same config.
    #[must_use]
    pub fn from_config(config: Arc<ResolvedConfig>) -> Self {
        Self::with_source(ConfigSource::Resolved(config))
    }

    fn with_source(source: ConfigSource) -> Self {
        Self {
            source,
            client: None,
            app: None,
            extra_routes: Vec::new(),
        }
    }

    /// Use `client` instead of constructing the default [`Client`].
    #[must_use]
    pub fn client(mut self, client: Arc<dyn EvaluationClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Compose into an existing application rather than a fresh one.
    #[must_use]
    pub fn app(mut self, app: App) -> Self {
        self.app = Some(app);
        self
    }

    /// Extra route registered with the generated routes, after everything else.
    #[must_use]
    pub fn generated_route(mut self, route: GeneratedRoute) -> Self {
        self.extra_routes.push(route);
        self
    }

    pub fn build(self) -> Result<App, ProxyError> {
        let config = match self.source {
            ConfigSource::Options(options) => Arc::new(config::resolve(options)?),
            ConfigSource::Resolved(config) => config,
        };
        let client = self
            .client
            .unwrap_or_else(|| Arc::new(Client::new(Arc::clone(&config))));
        let mut app = self.app.unwrap_or_default();

        let docs = Arc::new(OpenApiService::new(&config));
        let proxy = ProxyHandler::new(Arc::clone(&client), Arc::clone(&config), Arc::clone(&docs));
        docs.use_docs(&mut app);

        app.disable_fingerprint();
        if let Err(e) = app.set_trust_proxy(&config.trust_proxy) {
            config.logger.error(
                &format!(
                    "The provided \"trustProxy\" option was not valid (\"{}\")",
                    config.trust_proxy
                ),
                &e,
            );
        }

        app.layer(middleware::expose_etag_layer());
        app.layer(middleware::cors_layer());
        app.layer(CompressionLayer::new());

        app.nest(&config.proxy_path(), proxy.router());
        app.route(DOCS_PATH, get(docs::docs_page).with_state(docs));

        let mut generated = routes::generated(&client, &config);
        generated.extend(self.extra_routes);
        routes::register(&mut app, generated);

        config.logger.debug(&format!(
            "composed {} at {}",
            config.app_name,
            config.proxy_path()
        ));
        Ok(app)
    }
}

/// Compose the proxy application from options.
///
/// Resolution errors are fatal. An invalid trust-proxy value is logged
/// through the configured logger and composition continues with the
/// default directive.
pub fn compose(
    options: ProxyOptions,
    client: Option<Arc<dyn EvaluationClient>>,
    app: Option<App>,
) -> Result<App, ProxyError> {
    let mut composer = Composer::new(options);
    if let Some(client) = client {
        composer = composer.client(client);
    }
    if let Some(app) = app {
        composer = composer.app(app);
    }
    composer.build()
}

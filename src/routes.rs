//! Generated routes.
//!
//! Operational endpoints that are not part of the proxy API. They are
//! registered after every other route, so a generated route whose path
//! collides with `/docs` or the proxy mount is dropped.

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, MethodRouter};

use crate::app::App;
use crate::client::EvaluationClient;
use crate::config::ResolvedConfig;
use crate::health::{self, HealthState};

pub struct GeneratedRoute {
    pub path: String,
    pub handler: MethodRouter,
}

impl GeneratedRoute {
    #[must_use]
    pub fn new(path: impl Into<String>, handler: MethodRouter) -> Self {
        Self {
            path: path.into(),
            handler,
        }
    }
}

impl std::fmt::Debug for GeneratedRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedRoute")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[must_use]
pub fn generated(
    client: &Arc<dyn EvaluationClient>,
    config: &Arc<ResolvedConfig>,
) -> Vec<GeneratedRoute> {
    let state = HealthState {
        client: Arc::clone(client),
        config: Arc::clone(config),
        start_time: Instant::now(),
    };
    vec![
        GeneratedRoute::new(
            "/health",
            get(health::health_handler).with_state(state.clone()),
        ),
        GeneratedRoute::new("/ready", get(health::ready_handler).with_state(state)),
    ]
}

/// Register `routes` in order. Returns how many were accepted.
pub fn register(app: &mut App, routes: impl IntoIterator<Item = GeneratedRoute>) -> usize {
    let mut accepted = 0;
    for route in routes {
        if app.route(&route.path, route.handler) {
            accepted += 1;
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok() -> &'static str {
        "ok"
    }

    #[test]
    fn colliding_routes_are_dropped() {
        let mut app = App::new();
        app.route("/docs", get(ok));
        let accepted = register(
            &mut app,
            vec![
                GeneratedRoute::new("/docs", get(ok)),
                GeneratedRoute::new("/metrics", get(ok)),
            ],
        );
        assert_eq!(accepted, 1);
        assert_eq!(app.registered_paths(), vec!["/docs", "/metrics"]);
    }
}

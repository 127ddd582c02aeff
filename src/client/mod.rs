//! Flag evaluation.
//!
//! [`EvaluationClient`] is the capability the proxy endpoints need. The
//! composer accepts any implementation (test doubles, alternative
//! backends) and falls back to the default [`Client`], which evaluates a
//! toggle snapshot seeded from bootstrap toggles and, once
//! [`Client::start`]ed, kept current by polling the upstream flag API.

pub mod metrics;
pub mod model;
pub mod strategy;
pub mod upstream;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ResolvedConfig;
use crate::server::{self, HttpClient};
use metrics::MetricsAccumulator;
use model::{ClientMetrics, ClientRegistration, Context, EvaluatedToggle, FeatureToggle};
use upstream::FetchOutcome;

pub trait EvaluationClient: Send + Sync {
    fn is_ready(&self) -> bool;

    fn get_enabled_toggles(&self, context: &Context) -> Vec<EvaluatedToggle>;

    fn get_all_toggles(&self, context: &Context) -> Vec<EvaluatedToggle>;

    /// Evaluations for the named toggles that exist, in request order.
    fn get_defined_toggles(&self, names: &[String], context: &Context) -> Vec<EvaluatedToggle>;

    fn register_metrics(&self, metrics: ClientMetrics);

    fn register_client(&self, registration: ClientRegistration);
}

#[derive(Debug, Default)]
struct Snapshot {
    toggles: Vec<FeatureToggle>,
    etag: Option<String>,
}

pub struct Client {
    config: Arc<ResolvedConfig>,
    snapshot: RwLock<Arc<Snapshot>>,
    ready: AtomicBool,
    metrics: MetricsAccumulator,
}

impl Client {
    #[must_use]
    pub fn new(config: Arc<ResolvedConfig>) -> Self {
        let ready = !config.bootstrap.is_empty() || config.unleash_url.is_none();
        let snapshot = Snapshot {
            toggles: config.bootstrap.clone(),
            etag: None,
        };
        Self {
            config,
            snapshot: RwLock::new(Arc::new(snapshot)),
            ready: AtomicBool::new(ready),
            metrics: MetricsAccumulator::new(),
        }
    }

    fn current(&self) -> Arc<Snapshot> {
        // Clone the Arc (cheap refcount bump) so evaluation runs without the lock
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn replace(&self, toggles: Vec<FeatureToggle>, etag: Option<String>) {
        let next = Arc::new(Snapshot { toggles, etag });
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = next;
        self.ready.store(true, Ordering::Release);
    }

    fn evaluate_counted(&self, toggle: &FeatureToggle, context: &Context) -> EvaluatedToggle {
        let result = strategy::evaluate(toggle, context);
        self.metrics.count(&result);
        result
    }

    /// Spawn the upstream poll loop. Returns `None` when no upstream is
    /// configured. The loop exits when `shutdown` flips or its sender drops.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        self.config.unleash_url.as_ref()?;
        let client = Arc::clone(self);
        Some(tokio::spawn(async move {
            client.poll(shutdown).await;
        }))
    }

    async fn poll(&self, mut shutdown: watch::Receiver<bool>) {
        let http = server::build_http_client();
        let mut refresh = tokio::time::interval(self.config.refresh_interval);
        let mut report = tokio::time::interval(self.config.metrics_interval);
        report.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = refresh.tick() => self.refresh(&http).await,
                _ = report.tick() => self.report(&http).await,
                _ = shutdown.changed() => {
                    self.config.logger.debug("toggle poll loop shutting down");
                    return;
                }
            }
        }
    }

    /// Fetch toggles once, conditional on the stored ETag. A `304` or a
    /// failed fetch keeps the current snapshot.
    pub async fn refresh(&self, http: &HttpClient) {
        let Some(ref base) = self.config.unleash_url else {
            return;
        };
        let etag = self.current().etag.clone();
        match upstream::fetch_features(http, &self.config, base, etag.as_deref()).await {
            Ok(FetchOutcome::NotModified) => {}
            Ok(FetchOutcome::Updated { features, etag }) => {
                let count = features.len();
                self.replace(features, etag);
                self.config
                    .logger
                    .debug(&format!("toggle snapshot updated ({count} toggles)"));
            }
            Err(e) => self
                .config
                .logger
                .error("failed to fetch toggles, keeping current snapshot", &e),
        }
    }

    /// Submit the pending metrics bucket. On failure the counts are kept
    /// for the next report.
    pub async fn report(&self, http: &HttpClient) {
        let Some(ref base) = self.config.unleash_url else {
            return;
        };
        let Some(bucket) = self.metrics.drain() else {
            return;
        };
        let payload = ClientMetrics {
            app_name: self.config.app_name.clone(),
            instance_id: self.config.instance_id.clone(),
            environment: self.config.environment.clone(),
            bucket,
        };
        if let Err(e) = upstream::post_metrics(http, &self.config, base, &payload).await {
            self.config.logger.error("failed to submit metrics", &e);
            self.metrics.restore(payload.bucket);
        }
    }
}

impl EvaluationClient for Client {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn get_enabled_toggles(&self, context: &Context) -> Vec<EvaluatedToggle> {
        self.current()
            .toggles
            .iter()
            .map(|t| self.evaluate_counted(t, context))
            .filter(|r| r.enabled)
            .collect()
    }

    fn get_all_toggles(&self, context: &Context) -> Vec<EvaluatedToggle> {
        self.current()
            .toggles
            .iter()
            .map(|t| self.evaluate_counted(t, context))
            .collect()
    }

    fn get_defined_toggles(&self, names: &[String], context: &Context) -> Vec<EvaluatedToggle> {
        let snapshot = self.current();
        names
            .iter()
            .filter_map(|name| snapshot.toggles.iter().find(|t| &t.name == name))
            .map(|t| self.evaluate_counted(t, context))
            .collect()
    }

    fn register_metrics(&self, metrics: ClientMetrics) {
        // Nothing would ever drain them
        if self.config.unleash_url.is_none() {
            return;
        }
        self.metrics.merge(&metrics.bucket);
    }

    fn register_client(&self, registration: ClientRegistration) {
        self.config.logger.debug(&format!(
            "client registered: {} ({})",
            registration.app_name, registration.instance_id
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ProxyOptions};

    fn client_with(bootstrap: Vec<FeatureToggle>) -> Client {
        let config = resolve(ProxyOptions {
            bootstrap,
            ..Default::default()
        })
        .unwrap();
        Client::new(Arc::new(config))
    }

    fn toggle(name: &str, enabled: bool) -> FeatureToggle {
        FeatureToggle {
            name: name.into(),
            enabled,
            ..Default::default()
        }
    }

    #[test]
    fn ready_without_upstream() {
        assert!(client_with(vec![]).is_ready());
    }

    #[test]
    fn not_ready_until_first_fetch() {
        let config = resolve(ProxyOptions {
            unleash_url: Some("https://flags.example.com/api".into()),
            unleash_api_token: Some("secret".into()),
            ..Default::default()
        })
        .unwrap();
        let client = Client::new(Arc::new(config));
        assert!(!client.is_ready());

        client.replace(vec![toggle("a", true)], Some("\"v1\"".into()));
        assert!(client.is_ready());
        assert_eq!(client.current().etag.as_deref(), Some("\"v1\""));
    }

    #[test]
    fn enabled_filters_disabled_toggles() {
        let client = client_with(vec![toggle("a", true), toggle("b", false)]);
        let context = Context::default();

        let enabled = client.get_enabled_toggles(&context);
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "a");
        assert_eq!(client.get_all_toggles(&context).len(), 2);
    }

    #[test]
    fn defined_toggles_keep_request_order_and_skip_unknown() {
        let client = client_with(vec![toggle("a", true), toggle("b", false)]);
        let names = vec!["b".to_string(), "missing".to_string(), "a".to_string()];
        let result = client.get_defined_toggles(&names, &Context::default());
        let got: Vec<&str> = result.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(got, ["b", "a"]);
    }

    #[test]
    fn posted_metrics_are_dropped_without_upstream() {
        let client = client_with(vec![toggle("a", true)]);
        let mut posted = ClientMetrics::default();
        posted
            .bucket
            .toggles
            .insert("unknown".into(), model::ToggleCount::default());
        client.register_metrics(posted);
        assert!(client.metrics.drain().is_none());
    }

    #[test]
    fn evaluations_are_counted() {
        let client = client_with(vec![toggle("a", true)]);
        client.get_all_toggles(&Context::default());
        client.get_all_toggles(&Context::default());
        let bucket = client.metrics.drain().unwrap();
        assert_eq!(bucket.toggles["a"].yes, 2);
    }
}

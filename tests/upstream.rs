//! Integration tests for the upstream flag API protocol, driven against a
//! local axum server standing in for the flag API.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use flagproxy::client::model::{ClientMetrics, Context, MetricsBucket, ToggleCount};
use flagproxy::client::upstream::{self, FetchOutcome};
use flagproxy::client::{Client, EvaluationClient};
use flagproxy::config::{resolve, ProxyOptions, ResolvedConfig};
use flagproxy::server;

const ETAG: &str = "\"v1\"";

#[derive(Default)]
struct Upstream {
    feature_requests: Mutex<Vec<HeaderMap>>,
    metrics_requests: Mutex<Vec<(HeaderMap, Value)>>,
    reject_metrics: AtomicBool,
}

async fn features(State(api): State<Arc<Upstream>>, headers: HeaderMap) -> Response {
    let cached = headers
        .get(header::IF_NONE_MATCH)
        .is_some_and(|v| v == ETAG);
    api.feature_requests.lock().unwrap().push(headers);
    if cached {
        return StatusCode::NOT_MODIFIED.into_response();
    }
    let body = json!({
        "version": 1,
        "features": [
            { "name": "remote-flag", "enabled": true, "strategies": [{ "name": "default" }] }
        ]
    });
    ([(header::ETAG, ETAG)], Json(body)).into_response()
}

async fn metrics(
    State(api): State<Arc<Upstream>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    if api.reject_metrics.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    api.metrics_requests.lock().unwrap().push((headers, body));
    StatusCode::ACCEPTED
}

async fn start_upstream() -> (SocketAddr, Arc<Upstream>, tokio::sync::oneshot::Sender<()>) {
    let api = Arc::new(Upstream::default());
    let app = Router::new()
        .route("/api/client/features", get(features))
        .route("/api/client/metrics", post(metrics))
        .with_state(Arc::clone(&api));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    (addr, api, shutdown_tx)
}

fn config_for(addr: SocketAddr) -> Arc<ResolvedConfig> {
    Arc::new(
        resolve(ProxyOptions {
            unleash_url: Some(format!("http://{addr}/api")),
            unleash_api_token: Some("secret-token".into()),
            unleash_app_name: Some("edge".into()),
            unleash_instance_id: Some("edge-1".into()),
            ..Default::default()
        })
        .unwrap(),
    )
}

fn assert_identifies(headers: &HeaderMap) {
    assert_eq!(headers[header::AUTHORIZATION], "secret-token");
    assert_eq!(headers["unleash-appname"], "edge");
    assert_eq!(headers["unleash-instanceid"], "edge-1");
}

#[tokio::test]
async fn fetch_is_conditional_on_etag() {
    let (addr, api, shutdown) = start_upstream().await;
    let config = config_for(addr);
    let base = config.unleash_url.clone().unwrap();
    let http = server::build_http_client();

    let outcome = upstream::fetch_features(&http, &config, &base, None)
        .await
        .unwrap();
    let FetchOutcome::Updated { features, etag } = outcome else {
        panic!("expected a full response, got {outcome:?}");
    };
    assert_eq!(features[0].name, "remote-flag");
    assert_eq!(etag.as_deref(), Some(ETAG));

    let outcome = upstream::fetch_features(&http, &config, &base, Some(ETAG))
        .await
        .unwrap();
    assert!(matches!(outcome, FetchOutcome::NotModified));

    let requests = api.feature_requests.lock().unwrap();
    assert!(requests[0].get(header::IF_NONE_MATCH).is_none());
    assert_eq!(requests[1][header::IF_NONE_MATCH], ETAG);
    for headers in requests.iter() {
        assert_identifies(headers);
    }

    let _ = shutdown.send(());
}

#[tokio::test]
async fn metrics_post_carries_identity_headers() {
    let (addr, api, shutdown) = start_upstream().await;
    let config = config_for(addr);
    let base = config.unleash_url.clone().unwrap();
    let http = server::build_http_client();

    let mut bucket = MetricsBucket::default();
    bucket.toggles.insert(
        "remote-flag".into(),
        ToggleCount {
            yes: 2,
            ..Default::default()
        },
    );
    let payload = ClientMetrics {
        app_name: config.app_name.clone(),
        instance_id: config.instance_id.clone(),
        environment: None,
        bucket,
    };
    upstream::post_metrics(&http, &config, &base, &payload)
        .await
        .unwrap();

    let requests = api.metrics_requests.lock().unwrap();
    let (headers, body) = &requests[0];
    assert_identifies(headers);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(body["appName"], "edge");
    assert_eq!(body["bucket"]["toggles"]["remote-flag"]["yes"], 2);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn client_refresh_replaces_then_keeps_snapshot() {
    let (addr, api, shutdown) = start_upstream().await;
    let client = Client::new(config_for(addr));
    let http = server::build_http_client();
    assert!(!client.is_ready());

    client.refresh(&http).await;
    assert!(client.is_ready());
    let names: Vec<String> = client
        .get_enabled_toggles(&Context::default())
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["remote-flag"]);

    client.refresh(&http).await;
    assert_eq!(
        api.feature_requests.lock().unwrap()[1][header::IF_NONE_MATCH],
        ETAG
    );
    assert_eq!(client.get_all_toggles(&Context::default()).len(), 1);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn failed_metrics_upload_is_retried_with_the_same_counts() {
    let (addr, api, shutdown) = start_upstream().await;
    let client = Client::new(config_for(addr));
    let http = server::build_http_client();
    client.refresh(&http).await;
    client.get_enabled_toggles(&Context::default());

    api.reject_metrics.store(true, Ordering::SeqCst);
    client.report(&http).await;
    assert!(api.metrics_requests.lock().unwrap().is_empty());

    api.reject_metrics.store(false, Ordering::SeqCst);
    client.get_enabled_toggles(&Context::default());
    client.report(&http).await;

    let requests = api.metrics_requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (headers, body) = &requests[0];
    assert_identifies(headers);
    assert_eq!(body["instanceId"], "edge-1");
    assert_eq!(body["bucket"]["toggles"]["remote-flag"]["yes"], 2);

    let _ = shutdown.send(());
}

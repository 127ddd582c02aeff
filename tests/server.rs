//! Integration tests for a composed application served over TCP: peer
//! address handling, health endpoints, and graceful shutdown.

use std::collections::HashMap;
use std::net::SocketAddr;

use flagproxy::app::compose;
use flagproxy::client::model::{FeatureToggle, Strategy};
use flagproxy::config::trust::TrustProxySetting;
use flagproxy::config::ProxyOptions;
use flagproxy::health::HealthResponse;
use flagproxy::server;

fn office_only_toggle() -> FeatureToggle {
    FeatureToggle {
        name: "office-only".into(),
        enabled: true,
        strategies: vec![Strategy {
            name: "remoteAddress".into(),
            parameters: HashMap::from([("IPs".to_string(), "203.0.113.7".into())]),
        }],
        ..Default::default()
    }
}

async fn start_test_server(options: ProxyOptions) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let app = compose(options, None, None).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        server::serve(listener, app, async {
            let _ = shutdown_rx.await;
        })
        .await
        .unwrap();
    });

    (addr, shutdown_tx)
}

async fn enabled_names(addr: SocketAddr, forwarded_for: Option<&str>) -> Vec<String> {
    let client = reqwest::Client::new();
    let mut request = client.get(format!("http://{addr}/proxy"));
    if let Some(xff) = forwarded_for {
        request = request.header("x-forwarded-for", xff);
    }
    let body: serde_json::Value = request.send().await.unwrap().json().await.unwrap();
    body["toggles"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn health_endpoint_returns_healthy() {
    let (addr, shutdown) = start_test_server(ProxyOptions::default()).await;

    let url = format!("http://{addr}/health");
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 200);

    let health: HealthResponse = resp.json().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    assert!(health.instance_id.starts_with("flagproxy-"));

    let resp = reqwest::get(format!("http://{addr}/ready")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn upstream_client_is_not_ready_before_first_fetch() {
    let options = ProxyOptions {
        unleash_url: Some("http://127.0.0.1:9/api".into()),
        unleash_api_token: Some("token".into()),
        ..Default::default()
    };
    let (addr, shutdown) = start_test_server(options).await;

    let resp = reqwest::get(format!("http://{addr}/ready")).await.unwrap();
    assert_eq!(resp.status(), 503);
    let resp = reqwest::get(format!("http://{addr}/proxy")).await.unwrap();
    assert_eq!(resp.status(), 503);
    let resp = reqwest::get(format!("http://{addr}/proxy/health")).await.unwrap();
    assert_eq!(resp.status(), 503);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn untrusted_peer_ignores_forwarded_for() {
    let options = ProxyOptions {
        bootstrap: vec![office_only_toggle()],
        ..Default::default()
    };
    let (addr, shutdown) = start_test_server(options).await;

    assert!(enabled_names(addr, Some("203.0.113.7")).await.is_empty());

    let _ = shutdown.send(());
}

#[tokio::test]
async fn trusted_loopback_honours_forwarded_for() {
    let options = ProxyOptions {
        bootstrap: vec![office_only_toggle()],
        trust_proxy: Some(TrustProxySetting::Addresses("loopback".into())),
        ..Default::default()
    };
    let (addr, shutdown) = start_test_server(options).await;

    assert_eq!(
        enabled_names(addr, Some("203.0.113.7")).await,
        vec!["office-only"]
    );
    assert!(enabled_names(addr, None).await.is_empty());

    let _ = shutdown.send(());
}

#[tokio::test]
async fn docs_page_is_served() {
    let (addr, shutdown) = start_test_server(ProxyOptions::default()).await;

    let resp = reqwest::get(format!("http://{addr}/docs")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers().get("x-powered-by").is_none());
    assert!(resp.text().await.unwrap().contains("SwaggerUIBundle"));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn unmatched_route_returns_404() {
    let (addr, shutdown) = start_test_server(ProxyOptions::default()).await;

    let url = format!("http://{addr}/nonexistent");
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 404);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn graceful_shutdown_works() {
    let (addr, shutdown) = start_test_server(ProxyOptions::default()).await;

    let url = format!("http://{addr}/health");
    assert!(reqwest::get(&url).await.is_ok());

    let _ = shutdown.send(());

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let result = reqwest::get(&url).await;
    assert!(result.is_err());
}

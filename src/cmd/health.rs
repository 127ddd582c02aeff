//! `flagproxy health`: check the health of a running instance.
//!
//! Sends a `GET /health` request (plain HTTP or TLS) to the instance and
//! prints either a summary or the raw JSON payload.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};

use crate::cli::HealthArgs;
use crate::error::ProxyError;
use crate::health::HealthResponse;
use crate::server;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

fn http_error(e: impl std::error::Error + Send + Sync + 'static) -> ProxyError {
    ProxyError::HttpRequest {
        source: Box::new(e),
    }
}

async fn fetch(url: &str) -> Result<Bytes, ProxyError> {
    let uri: hyper::Uri = url.parse().map_err(|e: hyper::http::uri::InvalidUri| {
        ProxyError::UriParse {
            source: Box::new(e),
        }
    })?;
    let request = hyper::Request::get(uri)
        .header(hyper::header::ACCEPT, "application/json")
        .body(Full::new(Bytes::new()))
        .map_err(http_error)?;

    let response = tokio::time::timeout(HEALTH_TIMEOUT, server::build_http_client().request(request))
        .await
        .map_err(|_| ProxyError::HttpRequest {
            source: format!("health check timed out after {}s", HEALTH_TIMEOUT.as_secs()).into(),
        })?
        .map_err(http_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProxyError::HealthCheckFailed(status));
    }
    Ok(response.into_body().collect().await.map_err(http_error)?.to_bytes())
}

pub async fn execute(args: HealthArgs) -> Result<(), ProxyError> {
    let url = format!("{}/health", args.url.trim_end_matches('/'));
    let body = fetch(&url).await?;

    if args.json {
        println!("{}", String::from_utf8_lossy(&body));
        return Ok(());
    }

    match serde_json::from_slice::<HealthResponse>(&body) {
        Ok(health) => {
            println!("\u{2713} flagproxy is {} ({})", health.status, args.url);
            println!("  version:      {}", health.version);
            println!("  uptime:       {}", format_uptime(health.uptime_seconds));
            println!("  app name:     {}", health.app_name);
            println!("  instance id:  {}", health.instance_id);
            println!(
                "  toggles:      {}",
                if health.ready { "loaded" } else { "not loaded yet" }
            );
        }
        Err(e) => {
            eprintln!("Failed to parse health response: {e}");
            println!("{}", String::from_utf8_lossy(&body));
        }
    }

    Ok(())
}

fn format_uptime(seconds: u64) -> String {
    let (hours, minutes, secs) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    match (hours, minutes) {
        (0, 0) => format!("{secs}s"),
        (0, _) => format!("{minutes}m {secs}s"),
        _ => format!("{hours}h {minutes}m {secs}s"),
    }
}

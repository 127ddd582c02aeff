//! `flagproxy run`: start the proxy server.
//!
//! Merges the options file with command-line flags, starts the flag
//! client's polling loop, composes the application, and serves it until
//! SIGTERM / Ctrl+C.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::app::Composer;
use crate::cli::RunArgs;
use crate::client::{Client, EvaluationClient};
use crate::config::{self, sources, ProxyOptions};
use crate::error::ProxyError;
use crate::logging;
use crate::server;

pub async fn execute(args: RunArgs) -> Result<(), ProxyError> {
    logging::init(
        &args.log_level,
        logging::resolve_format(args.pretty, args.json),
    );

    let file_options = match args.config {
        Some(ref path) => sources::load_options(path).await?,
        None => ProxyOptions::default(),
    };
    let options = file_options.merge(args.to_options());

    // The default client is built here rather than by the composer so its
    // polling loop can be tied to the server's shutdown.
    let config = Arc::new(config::resolve(options)?);
    let client = Arc::new(Client::new(Arc::clone(&config)));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let poll_handle = client.start(shutdown_rx);

    let application = Composer::from_config(config)
        .client(client as Arc<dyn EvaluationClient>)
        .build()?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        routes = ?application.registered_paths(),
        "flagproxy started"
    );

    let graceful_shutdown = async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    server::serve(listener, application, graceful_shutdown).await?;

    if let Some(handle) = poll_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "toggle polling task failed");
        }
    }

    tracing::info!("flagproxy stopped");
    Ok(())
}

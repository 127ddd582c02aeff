//! Structured logging setup using the `tracing` ecosystem.
//!
//! Configures a `tracing-subscriber` with either JSON output (for
//! production) or pretty-printed output (for TTY / local dev). Format
//! is auto-detected from the terminal but can be forced via `--json`
//! or `--pretty`.
//!
//! Also defines the [`Logger`] capability carried by the resolved
//! configuration. Collaborators log through it instead of calling
//! `tracing` directly, so embedders can route composition-time
//! diagnostics elsewhere. [`TracingLogger`] is the default.

use std::fmt;

use tracing_subscriber::{fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::LogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[must_use]
pub fn resolve_format(pretty: bool, json: bool) -> LogFormat {
    if json {
        LogFormat::Json
    } else if pretty || std::io::IsTerminal::is_terminal(&std::io::stdout()) {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

pub fn init(level: &LogLevel, format: LogFormat) {
    let tracing_level = level.to_tracing_level();
    let filter = tracing_subscriber::filter::Targets::new().with_default(tracing_level);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_fmt::layer().json().with_target(false))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_fmt::layer().pretty())
                .init();
        }
    }
}

/// Logging capability handed to every collaborator through the resolved
/// configuration.
pub trait Logger: Send + Sync + fmt::Debug {
    fn debug(&self, message: &str);
    fn error(&self, message: &str, error: &dyn std::error::Error);
}

/// Forwards to the global `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!("{message}");
    }

    fn error(&self, message: &str, error: &dyn std::error::Error) {
        tracing::error!(error = %error, "{message}");
    }
}

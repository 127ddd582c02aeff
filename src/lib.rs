//! flagproxy is an edge proxy for feature flags.
//!
//! It evaluates feature toggles on behalf of frontend clients so that
//! browsers and mobile apps never hold a server-side API token. Toggle
//! definitions are polled from an upstream flag server (or bootstrapped
//! from the options file) and evaluated per request against the caller's
//! context.
//!
//! # Architecture
//!
//! - [`app`] -- The [`App`](app::App) container and the composer that wires
//!   everything below into one axum router.
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`client`] -- The flag evaluation client: polling, strategies, metrics.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate, health).
//! - [`config`] -- Options loading, merging, validation, and resolution.
//! - [`docs`] -- OpenAPI schema and the `/docs` page.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` and `GET /ready` handlers.
//! - [`logging`] -- Structured tracing setup and the [`Logger`](logging::Logger)
//!   capability.
//! - [`middleware`] -- CORS, client address resolution, header hygiene.
//! - [`proxy`] -- The `{basePath}/proxy` endpoint.
//! - [`routes`] -- Generated operational routes, registered last.
//! - [`server`] -- HTTP client, listener loop, and graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML options file support _(enabled by default)_ |
//! | `json` | JSON options file support |
//! | `toml` | TOML options file support |
//! | `file-backends` | All file format backends |
//! | `full` | All features |

// Public functions are consumed by the binary and tests only.
#![allow(clippy::missing_errors_doc)]

pub mod app;
pub mod cli;
pub mod client;
pub mod cmd;
pub mod config;
pub mod docs;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod server;

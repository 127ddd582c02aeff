//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, validate, health), and their associated argument
//! structs. Every proxy option has an environment variable equivalent for
//! container deployments; flags override values from the options file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::trust::TrustProxySetting;
use crate::config::ProxyOptions;

#[derive(Parser)]
#[command(
    name = "flagproxy",
    version,
    about = "Feature flag edge proxy",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        flagproxy run --unleash-url https://flags.example.com/api --unleash-api-token <token>\n  \
        flagproxy run -c flagproxy.yaml      Start with an options file\n  \
        flagproxy validate flagproxy.yaml    Check an options file"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Run(Box<RunArgs>),

    /// Validate an options file without starting
    Validate(ValidateArgs),

    /// Check health of a running instance
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        flagproxy run -c flagproxy.yaml                     Options from file\n  \
        flagproxy run -c flagproxy.yaml -p 8080 --pretty    Local dev mode\n  \
        flagproxy run --proxy-base-path /edge              Serve under /edge/proxy")]
pub struct RunArgs {
    /// Options file path (.yaml, .json, .toml)
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // -- Upstream --
    /// Base URL of the upstream flag API
    #[arg(long, env = "UNLEASH_URL", help_heading = "Upstream")]
    pub unleash_url: Option<String>,

    /// Server-side API token for the upstream
    #[arg(long, env = "UNLEASH_API_TOKEN", help_heading = "Upstream")]
    pub unleash_api_token: Option<String>,

    /// Application name reported upstream
    #[arg(long, env = "UNLEASH_APP_NAME", help_heading = "Upstream")]
    pub unleash_app_name: Option<String>,

    /// Instance id reported upstream
    #[arg(long, env = "UNLEASH_INSTANCE_ID", help_heading = "Upstream")]
    pub unleash_instance_id: Option<String>,

    /// Environment added to every evaluation context
    #[arg(long, env = "UNLEASH_ENVIRONMENT", help_heading = "Upstream")]
    pub environment: Option<String>,

    // -- HTTP --
    /// Path prefix for the proxy endpoint
    #[arg(long, env = "PROXY_BASE_PATH", help_heading = "HTTP")]
    pub proxy_base_path: Option<String>,

    /// Trust-proxy directive: true, false, a hop count, or addresses/CIDRs
    #[arg(long, env = "TRUST_PROXY", help_heading = "HTTP")]
    pub trust_proxy: Option<TrustProxySetting>,

    /// Serve the /proxy/all endpoint
    #[arg(long, env = "ENABLE_ALL_ENDPOINT", help_heading = "HTTP")]
    pub enable_all_endpoint: Option<bool>,

    /// Max request body size in bytes
    #[arg(long, env = "MAX_BODY_SIZE", help_heading = "HTTP")]
    pub max_body: Option<usize>,

    /// OpenAPI schema file served by /docs instead of the built-in one
    #[arg(long, env = "OPENAPI_SCHEMA_PATH", help_heading = "HTTP")]
    pub openapi_schema_path: Option<PathBuf>,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Tuning --
    /// Toggle refresh interval in milliseconds
    #[arg(long, env = "UNLEASH_REFRESH_INTERVAL", help_heading = "Tuning")]
    pub refresh_interval: Option<u64>,

    /// Metrics reporting interval in milliseconds
    #[arg(long, env = "UNLEASH_METRICS_INTERVAL", help_heading = "Tuning")]
    pub metrics_interval: Option<u64>,
}

impl RunArgs {
    /// Options set on the command line or through the environment.
    #[must_use]
    pub fn to_options(&self) -> ProxyOptions {
        ProxyOptions {
            unleash_url: self.unleash_url.clone(),
            unleash_api_token: self.unleash_api_token.clone(),
            unleash_app_name: self.unleash_app_name.clone(),
            unleash_instance_id: self.unleash_instance_id.clone(),
            environment: self.environment.clone(),
            proxy_base_path: self.proxy_base_path.clone(),
            trust_proxy: self.trust_proxy.clone(),
            refresh_interval: self.refresh_interval,
            metrics_interval: self.metrics_interval,
            enable_all_endpoint: self.enable_all_endpoint,
            max_body_size: self.max_body,
            openapi_schema_path: self.openapi_schema_path.clone(),
            ..ProxyOptions::default()
        }
    }
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Options file to validate
    #[arg(default_value = "flagproxy.yaml")]
    pub config: PathBuf,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:3000")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_become_options() {
        let cli = Cli::try_parse_from([
            "flagproxy",
            "run",
            "--trust-proxy",
            "loopback, 10.0.0.0/8",
            "--proxy-base-path",
            "/edge",
            "--enable-all-endpoint",
            "true",
        ])
        .unwrap();
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run");
        };
        let options = args.to_options();
        assert_eq!(options.proxy_base_path.as_deref(), Some("/edge"));
        assert_eq!(options.enable_all_endpoint, Some(true));
        assert_eq!(
            options.trust_proxy,
            Some(TrustProxySetting::Addresses("loopback, 10.0.0.0/8".into()))
        );
    }
}

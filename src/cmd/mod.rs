//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`validate`], or [`health`]. Each handler
//! lives in its own submodule.

pub mod health;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::ProxyError;

pub async fn dispatch(cli: Cli) -> Result<(), ProxyError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args),
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  flagproxy v{version}: feature flag edge proxy\n\n  \
         No command provided. To get started:\n\n    \
         flagproxy run --unleash-url <url> --unleash-api-token <token>\n    \
         flagproxy run -c flagproxy.yaml     Start with an options file\n    \
         flagproxy --help                    See all commands and options\n"
    );
}

use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = flagproxy::cli::Cli::parse();
    if let Err(e) = flagproxy::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

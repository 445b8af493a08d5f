//! Entry point: parses CLI flags, loads `.env`, initializes tracing, and
//! hands off to the supervisor.

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use exchange_price_index::config::{load_env, Cli};
use exchange_price_index::supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting exchange-price-index");

    if let Err(e) = supervisor::run(cli).await {
        tracing::error!(error = %e, "fatal startup error");
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exchange_price_index=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

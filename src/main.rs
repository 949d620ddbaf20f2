use autoprofit::config::Config;
use autoprofit::content::llm::{LlmClient, OpenAiClient};
use autoprofit::feeds::exchange::ExchangeAdapter;
use autoprofit::feeds::paper::PaperExchange;
use autoprofit::feeds::venue::RestVenue;
use autoprofit::strategies::orchestrator::Orchestrator;
use autoprofit::telemetry::performance::SystemState;

use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads .env first so RUST_LOG can come from there
    let mut config = Config::load_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.telemetry.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("================================================");
    info!("  AUTOPROFIT v{}", env!("CARGO_PKG_VERSION"));
    info!("  Arbitrage scanner, signal bot, content pipeline");
    info!("================================================");

    if let Err(e) = config.validate() {
        error!("Config validation failed: {e}");
        info!("Continuing in dry-run (paper) mode...");
        config.runtime.dry_run = true;
    }

    let dry_run = config.is_dry_run();
    let binance: Arc<dyn ExchangeAdapter> = Arc::new(RestVenue::binance(&config.exchanges)?);
    let mut venues = RestVenue::from_config(&config.exchanges)?;

    let trading: Arc<dyn ExchangeAdapter> = if dry_run {
        warn!(
            "DRY RUN: orders are simulated against a {} {} paper balance",
            config.runtime.paper_starting_balance, config.trading.quote_asset
        );
        venues = venues
            .into_iter()
            .map(|venue| paper(venue, &config))
            .collect();
        paper(binance, &config)
    } else {
        binance
    };
    info!(
        "Trading {} on {}; arbitrage across {} venues",
        config.trading.pairs.join(", "),
        trading.id(),
        venues.len()
    );

    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(&config.content)?);

    let previous = match SystemState::load(&config.runtime.state_file).await {
        Ok(state) => state,
        Err(e) => {
            warn!("Ignoring unreadable state file: {e:#}");
            None
        }
    };

    let orchestrator = Arc::new(Orchestrator::new(config, trading, venues, llm, previous)?);
    orchestrator.run(shutdown_signal()).await?;

    info!("Shutdown complete.");
    Ok(())
}

fn paper(venue: Arc<dyn ExchangeAdapter>, config: &Config) -> Arc<dyn ExchangeAdapter> {
    Arc::new(PaperExchange::new(
        venue,
        &config.trading.quote_asset,
        config.runtime.paper_starting_balance,
    ))
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Ctrl-C handler failed: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("SIGTERM handler failed: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received. Cleaning up..."),
        _ = terminate => info!("SIGTERM received. Cleaning up..."),
    }
}

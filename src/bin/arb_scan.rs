//! One-shot cross-exchange scan.
//!
//! Fetches every configured arbitrage symbol from every configured venue once
//! and prints the best net opportunity per symbol. Never places orders.
//!
//! Usage:  cargo run --bin arb-scan

use autoprofit::config::Config;
use autoprofit::feeds::exchange::CallGuard;
use autoprofit::feeds::quotes::QuoteFetcher;
use autoprofit::feeds::venue::RestVenue;
use autoprofit::signals::arbitrage::ArbitrageEvaluator;

use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let config = Config::load_or_default();
    let venues = RestVenue::from_config(&config.exchanges)?;
    anyhow::ensure!(venues.len() >= 2, "need at least two venues to compare");

    let guard = CallGuard::new(
        config.runtime.max_concurrent_requests,
        Duration::from_secs(config.exchanges.request_timeout_secs.max(1)),
    );
    let fetcher = QuoteFetcher::new(venues, guard);
    let evaluator = ArbitrageEvaluator::from_config(&config.arbitrage);

    println!(
        "Scanning {} symbols across {} (min net {}%)",
        config.arbitrage.symbols.len(),
        config.exchanges.arbitrage_venues.join(", "),
        config.arbitrage.min_profit * rust_decimal::Decimal::ONE_HUNDRED
    );
    println!("{}", "-".repeat(72));

    let mut found = 0;
    for symbol in &config.arbitrage.symbols {
        let quotes = fetcher.fetch_quotes(symbol).await;
        match evaluator.evaluate(symbol, &quotes) {
            Some(opp) => {
                found += 1;
                println!(
                    "{:<10} buy {:<9} @ {:<14} sell {:<9} @ {:<14} gross {:>6}%  net {:>6}%",
                    opp.symbol,
                    opp.buy_exchange,
                    opp.buy_price,
                    opp.sell_exchange,
                    opp.sell_price,
                    opp.gross_profit_pct.round_dp(3),
                    opp.net_profit_pct.round_dp(3),
                );
            }
            None => println!("{symbol:<10} no opportunity ({} venues quoted)", quotes.len()),
        }
    }

    println!("{}", "-".repeat(72));
    println!("{found} opportunities found");
    Ok(())
}

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::ArbitrageConfig;
use crate::feeds::exchange::{CallGuard, ExchangeAdapter, ExchangeError};
use crate::models::opportunity::{ArbitrageOpportunity, ExecutedArbitrage};
use crate::models::order::OrderSide;
use crate::models::quote::split_symbol;
use crate::risk::sizing::{Sizing, SizingError};

#[derive(Debug, Error)]
pub enum ArbitrageError {
    #[error("venue {0} is not configured")]
    UnknownVenue(String),

    #[error("malformed symbol {0}")]
    Symbol(String),

    #[error(transparent)]
    Sizing(#[from] SizingError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("leg failed (buy: {buy}, sell: {sell})")]
    LegFailed { buy: String, sell: String },
}

/// Places both legs of a cross-venue opportunity at the quoted prices.
pub struct ArbitrageExecutor {
    guard: CallGuard,
    safety_factor: Decimal,
    min_trade_amount: Decimal,
}

impl ArbitrageExecutor {
    pub fn new(guard: CallGuard, config: &ArbitrageConfig) -> Self {
        Self {
            guard,
            safety_factor: config.safety_factor,
            min_trade_amount: config.min_trade_amount,
        }
    }

    /// Size against the buy venue's quote balance and the sell venue's base
    /// balance, then submit both limit orders concurrently. Profit is only
    /// booked when both legs are accepted.
    pub async fn execute(
        &self,
        opp: &ArbitrageOpportunity,
        buy_venue: Arc<dyn ExchangeAdapter>,
        sell_venue: Arc<dyn ExchangeAdapter>,
    ) -> Result<ExecutedArbitrage, ArbitrageError> {
        let (base, quote) =
            split_symbol(&opp.symbol).ok_or_else(|| ArbitrageError::Symbol(opp.symbol.clone()))?;

        let (quote_balance, base_balance) = tokio::join!(
            self.guard.run(buy_venue.fetch_free_balance(quote)),
            self.guard.run(sell_venue.fetch_free_balance(base)),
        );
        let amount = Sizing::arbitrage_amount(
            quote_balance?,
            base_balance?,
            opp.buy_price,
            self.safety_factor,
            self.min_trade_amount,
        )
        .map_err(|e| {
            warn!("Insufficient balance for arbitrage on {}: {e}", opp.symbol);
            e
        })?;
        let amount = amount.round_dp(6);

        let (buy, sell) = tokio::join!(
            self.guard.run(buy_venue.place_limit_order(
                &opp.symbol,
                OrderSide::Buy,
                amount,
                opp.buy_price
            )),
            self.guard.run(sell_venue.place_limit_order(
                &opp.symbol,
                OrderSide::Sell,
                amount,
                opp.sell_price
            )),
        );

        match (buy, sell) {
            (Ok(buy), Ok(sell)) => {
                let profit = (opp.sell_price - opp.buy_price) * amount;
                info!(
                    "Arbitrage executed: {} {} buy {} on {} / sell {} on {} ({}/{}), profit ${}",
                    amount,
                    opp.symbol,
                    opp.buy_price,
                    opp.buy_exchange,
                    opp.sell_price,
                    opp.sell_exchange,
                    buy.order_id,
                    sell.order_id,
                    profit.round_dp(2)
                );
                Ok(ExecutedArbitrage {
                    opportunity: opp.clone(),
                    amount,
                    profit,
                    executed_at: Utc::now(),
                })
            }
            (buy, sell) => {
                let describe = |r: &Result<_, ExchangeError>| match r {
                    Ok(_) => "ok".to_string(),
                    Err(e) => e.to_string(),
                };
                let err = ArbitrageError::LegFailed {
                    buy: describe(&buy),
                    sell: describe(&sell),
                };
                error!("Arbitrage execution error on {}: {err}", opp.symbol);
                Err(err)
            }
        }
    }
}

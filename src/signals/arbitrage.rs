use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::config::ArbitrageConfig;
use crate::models::opportunity::ArbitrageOpportunity;
use crate::models::quote::Quote;

/// Finds the best cross-venue buy/sell pair for one symbol.
///
/// Every ordered pair of distinct venues is a candidate: buy at one venue's ask,
/// sell at the other's bid. Gross % = (bid - ask) / ask * 100; net % subtracts a
/// flat fee allowance (two 0.1% taker fees = 0.2 points).
///
/// Venues missing either side of the book are ignored. Pairs are visited in
/// `(buy, sell)` id order and only a strictly better net replaces the current
/// best, so ties go to the lexicographically first pair.
#[derive(Debug, Clone)]
pub struct ArbitrageEvaluator {
    /// Minimum net profit in percentage points (0.5 = 0.5%)
    min_net_pct: Decimal,
    fee_allowance_pct: Decimal,
}

impl ArbitrageEvaluator {
    /// `min_profit` is a fraction (0.005 = 0.5%).
    pub fn new(min_profit: Decimal, fee_allowance_pct: Decimal) -> Self {
        Self {
            min_net_pct: min_profit * Decimal::ONE_HUNDRED,
            fee_allowance_pct,
        }
    }

    pub fn from_config(config: &ArbitrageConfig) -> Self {
        Self::new(config.min_profit, config.fee_allowance_pct)
    }

    pub fn evaluate(
        &self,
        symbol: &str,
        quotes: &BTreeMap<String, Quote>,
    ) -> Option<ArbitrageOpportunity> {
        // BTreeMap iteration is already in venue id order
        let books: Vec<(&str, Decimal, Decimal)> = quotes
            .iter()
            .filter(|(_, q)| q.is_two_sided())
            .filter_map(|(id, q)| Some((id.as_str(), q.bid?, q.ask?)))
            .collect();

        if books.len() < 2 {
            return None;
        }

        let mut best: Option<ArbitrageOpportunity> = None;

        for &(buy_id, _, buy_ask) in &books {
            for &(sell_id, sell_bid, _) in &books {
                if buy_id == sell_id || sell_bid <= buy_ask {
                    continue;
                }

                let gross = (sell_bid - buy_ask) / buy_ask * Decimal::ONE_HUNDRED;
                let net = gross - self.fee_allowance_pct;
                if net <= self.min_net_pct {
                    continue;
                }

                let better = best
                    .as_ref()
                    .map(|b| net > b.net_profit_pct)
                    .unwrap_or(true);
                if better {
                    best = Some(ArbitrageOpportunity {
                        symbol: symbol.to_string(),
                        buy_exchange: buy_id.to_string(),
                        sell_exchange: sell_id.to_string(),
                        buy_price: buy_ask,
                        sell_price: sell_bid,
                        gross_profit_pct: gross,
                        net_profit_pct: net,
                        observed_at: Utc::now(),
                    });
                }
            }
        }

        best
    }
}

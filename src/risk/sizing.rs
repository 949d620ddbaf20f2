use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

use crate::config::TradingConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizingError {
    #[error("balance {balance} is below the {minimum} minimum")]
    BalanceBelowMinimum { balance: Decimal, minimum: Decimal },

    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("amount {amount} is below the {minimum} minimum trade size")]
    AmountBelowMinimum { amount: Decimal, minimum: Decimal },
}

/// Risk inputs for one order.
#[derive(Debug, Clone, Copy)]
pub struct RiskParams {
    pub risk_per_trade: Decimal,
    pub stop_loss_pct: Decimal,
    pub max_balance_fraction: Decimal,
    pub min_balance: Decimal,
}

impl RiskParams {
    pub fn from_config(config: &TradingConfig) -> Self {
        Self {
            risk_per_trade: config.risk_per_trade,
            stop_loss_pct: config.stop_loss_pct,
            max_balance_fraction: config.max_balance_fraction,
            min_balance: config.min_balance,
        }
    }
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            risk_per_trade: dec!(0.02),
            stop_loss_pct: dec!(0.03),
            max_balance_fraction: dec!(0.95),
            min_balance: dec!(10),
        }
    }
}

/// Position sizing rules.
pub struct Sizing;

impl Sizing {
    /// Base amount to buy with `balance` quote units at `price`.
    ///
    /// amount = min(balance * risk / stop_loss / price, balance * max_fraction / price)
    ///
    /// The minimum-balance check runs first, so a small balance is rejected
    /// whatever the risk parameters are.
    pub fn order_amount(
        balance: Decimal,
        price: Decimal,
        params: &RiskParams,
    ) -> Result<Decimal, SizingError> {
        if balance < params.min_balance {
            return Err(SizingError::BalanceBelowMinimum {
                balance,
                minimum: params.min_balance,
            });
        }
        if price <= Decimal::ZERO {
            return Err(SizingError::NonPositivePrice(price));
        }

        let cap = balance * params.max_balance_fraction / price;
        if params.stop_loss_pct <= Decimal::ZERO {
            return Ok(cap);
        }
        let risk_sized = balance * params.risk_per_trade / params.stop_loss_pct / price;
        Ok(risk_sized.min(cap))
    }

    /// Size both legs of an arbitrage: what the buy venue can afford and the sell
    /// venue can deliver, scaled by a safety factor.
    pub fn arbitrage_amount(
        quote_balance: Decimal,
        base_balance: Decimal,
        buy_price: Decimal,
        safety_factor: Decimal,
        min_amount: Decimal,
    ) -> Result<Decimal, SizingError> {
        if buy_price <= Decimal::ZERO {
            return Err(SizingError::NonPositivePrice(buy_price));
        }
        let affordable = quote_balance / buy_price;
        let amount = affordable.min(base_balance) * safety_factor;
        if amount < min_amount {
            return Err(SizingError::AmountBelowMinimum {
                amount,
                minimum: min_amount,
            });
        }
        Ok(amount)
    }
}

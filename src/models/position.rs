use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::order::CloseReason;

/// An open long position. Created on a BUY fill, removed on a SELL fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub entry_price: Decimal,
    pub amount: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// Open at `entry_price` with stop-loss and take-profit at fixed fractional offsets.
    pub fn open(
        symbol: impl Into<String>,
        entry_price: Decimal,
        amount: Decimal,
        stop_loss_pct: Decimal,
        take_profit_pct: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            entry_price,
            amount,
            stop_loss_price: entry_price * (Decimal::ONE - stop_loss_pct),
            take_profit_price: entry_price * (Decimal::ONE + take_profit_pct),
            opened_at: Utc::now(),
        }
    }

    pub fn cost_basis(&self) -> Decimal {
        self.entry_price * self.amount
    }

    pub fn realized_profit(&self, exit_price: Decimal) -> Decimal {
        (exit_price - self.entry_price) * self.amount
    }

    pub fn return_pct(&self, exit_price: Decimal) -> Decimal {
        if self.entry_price == Decimal::ZERO {
            return Decimal::ZERO;
        }
        (exit_price - self.entry_price) / self.entry_price * Decimal::ONE_HUNDRED
    }

    /// Stop-loss takes precedence when both thresholds are crossed.
    pub fn exit_trigger(&self, price: Decimal) -> Option<CloseReason> {
        if price <= self.stop_loss_price {
            Some(CloseReason::StopLoss)
        } else if price >= self.take_profit_price {
            Some(CloseReason::TakeProfit)
        } else {
            None
        }
    }
}

/// Open positions keyed by symbol. At most one per symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionBook {
    positions: BTreeMap<String, Position>,
    pub realized_pnl: Decimal,
    pub total_trades: u64,
    pub winning_trades: u64,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Insert a new position. Returns false if the symbol already has one.
    pub fn insert(&mut self, position: Position) -> bool {
        if self.positions.contains_key(&position.symbol) {
            return false;
        }
        self.positions.insert(position.symbol.clone(), position);
        true
    }

    /// Remove and settle a position at `exit_price`.
    pub fn close(&mut self, symbol: &str, exit_price: Decimal) -> Option<(Position, Decimal)> {
        let position = self.positions.remove(symbol)?;
        let pnl = position.realized_profit(exit_price);
        self.realized_pnl += pnl;
        self.total_trades += 1;
        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
        }
        Some((position, pnl))
    }

    pub fn total_exposure(&self) -> Decimal {
        self.positions.values().map(|p| p.cost_basis()).sum()
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64
    }

    pub fn snapshot(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }
}

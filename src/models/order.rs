use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Venue acknowledgement for a placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub exchange_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// Why a position is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    Signal,
    StopLoss,
    TakeProfit,
}

/// Result of handing a decision to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TradeOutcome {
    NoAction,
    InsufficientFunds {
        balance: Decimal,
    },
    AlreadyOpen {
        symbol: String,
    },
    MaxPositions {
        open: usize,
    },
    NoPosition {
        symbol: String,
    },
    Opened {
        symbol: String,
        amount: Decimal,
        price: Decimal,
        order_id: String,
    },
    Closed {
        symbol: String,
        amount: Decimal,
        price: Decimal,
        profit: Decimal,
        profit_pct: Decimal,
        reason: CloseReason,
        order_id: String,
    },
    Error {
        message: String,
    },
}

impl TradeOutcome {
    pub fn is_fill(&self) -> bool {
        matches!(self, TradeOutcome::Opened { .. } | TradeOutcome::Closed { .. })
    }

    pub fn realized_profit(&self) -> Option<Decimal> {
        match self {
            TradeOutcome::Closed { profit, .. } => Some(*profit),
            _ => None,
        }
    }
}

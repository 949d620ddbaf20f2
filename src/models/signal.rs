use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// Directional proposal carried by a vote. Votes never carry HOLD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl From<Direction> for Action {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Buy => Action::Buy,
            Direction::Sell => Action::Sell,
        }
    }
}

/// Rule families, in descending priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    Rsi,
    Macd,
    Prediction,
    Bollinger,
}

impl RuleKind {
    /// Lower value wins the action.
    pub fn priority(&self) -> u8 {
        match self {
            RuleKind::Rsi => 0,
            RuleKind::Macd => 1,
            RuleKind::Prediction => 2,
            RuleKind::Bollinger => 3,
        }
    }
}

/// One rule's opinion on the latest bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub kind: RuleKind,
    pub direction: Direction,
    pub weight: f64,
    pub reason: String,
}

/// Latest-bar indicator values fed to the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub action: Action,
    pub strength: f64,
    pub buy_weight: f64,
    pub sell_weight: f64,
    pub reasons: Vec<String>,
    pub votes: Vec<Vote>,
    pub observed_at: DateTime<Utc>,
}

impl Signal {
    pub fn hold(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            action: Action::Hold,
            strength: 0.0,
            buy_weight: 0.0,
            sell_weight: 0.0,
            reasons: Vec::new(),
            votes: Vec::new(),
            observed_at: Utc::now(),
        }
    }

    pub fn is_actionable(&self, threshold: f64) -> bool {
        self.action != Action::Hold && self.strength >= threshold
    }
}

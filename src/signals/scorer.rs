use chrono::Utc;

use crate::models::signal::{Action, Direction, IndicatorSnapshot, RuleKind, Signal, Vote};

/// Indicator vote scorer.
///
/// Rules and weights:
///   - RSI < 30 / > 70:                 BUY / SELL, 2
///   - MACD above / below signal line:  BUY / SELL, 1
///   - Predicted move > +2% / < -2%:    BUY / SELL, 3
///   - Close below lower / above upper: BUY / SELL, 1
///
/// Each rule emits at most one `Vote`. `aggregate` reduces them: the action is
/// the direction of the highest-priority vote (RSI > MACD > Prediction >
/// Bollinger), strength is the sum of every fired weight.
#[derive(Debug, Clone)]
pub struct SignalScorer {
    rsi_oversold: f64,
    rsi_overbought: f64,
    /// Fractional move the predictor must forecast (0.02 = 2%)
    prediction_threshold: f64,
}

impl Default for SignalScorer {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            prediction_threshold: 0.02,
        }
    }
}

impl SignalScorer {
    pub fn new(rsi_oversold: f64, rsi_overbought: f64, prediction_threshold: f64) -> Self {
        Self {
            rsi_oversold,
            rsi_overbought,
            prediction_threshold,
        }
    }

    /// Run every rule against the latest bar. `predicted_price` is the model's
    /// next-close forecast, if one is available.
    pub fn votes(&self, snap: &IndicatorSnapshot, predicted_price: Option<f64>) -> Vec<Vote> {
        let mut votes = Vec::with_capacity(4);

        if snap.rsi < self.rsi_oversold {
            votes.push(vote(RuleKind::Rsi, Direction::Buy, 2.0, "RSI oversold".into()));
        } else if snap.rsi > self.rsi_overbought {
            votes.push(vote(RuleKind::Rsi, Direction::Sell, 2.0, "RSI overbought".into()));
        }

        if snap.macd > snap.macd_signal {
            votes.push(vote(RuleKind::Macd, Direction::Buy, 1.0, "MACD bullish crossover".into()));
        } else if snap.macd < snap.macd_signal {
            votes.push(vote(RuleKind::Macd, Direction::Sell, 1.0, "MACD bearish crossover".into()));
        }

        if let Some(predicted) = predicted_price.filter(|_| snap.close > 0.0) {
            let change = (predicted - snap.close) / snap.close;
            if change > self.prediction_threshold {
                votes.push(vote(
                    RuleKind::Prediction,
                    Direction::Buy,
                    3.0,
                    format!("Model predicts {:.2}% increase", change * 100.0),
                ));
            } else if change < -self.prediction_threshold {
                votes.push(vote(
                    RuleKind::Prediction,
                    Direction::Sell,
                    3.0,
                    format!("Model predicts {:.2}% decrease", change * 100.0),
                ));
            }
        }

        if snap.close < snap.bb_lower {
            votes.push(vote(
                RuleKind::Bollinger,
                Direction::Buy,
                1.0,
                "Price below lower Bollinger Band".into(),
            ));
        } else if snap.close > snap.bb_upper {
            votes.push(vote(
                RuleKind::Bollinger,
                Direction::Sell,
                1.0,
                "Price above upper Bollinger Band".into(),
            ));
        }

        votes
    }

    pub fn score(
        &self,
        symbol: &str,
        snap: &IndicatorSnapshot,
        predicted_price: Option<f64>,
    ) -> Signal {
        aggregate(symbol, self.votes(snap, predicted_price))
    }
}

fn vote(kind: RuleKind, direction: Direction, weight: f64, reason: String) -> Vote {
    Vote {
        kind,
        direction,
        weight,
        reason,
    }
}

/// Reduce votes to one signal. The action comes from the highest-priority vote;
/// HOLD when nothing fired. Ties in priority cannot happen since each rule
/// votes at most once.
pub fn aggregate(symbol: &str, mut votes: Vec<Vote>) -> Signal {
    votes.sort_by_key(|v| v.kind.priority());

    let action = votes
        .first()
        .map(|v| Action::from(v.direction))
        .unwrap_or(Action::Hold);

    let tally = |d: Direction| -> f64 {
        votes
            .iter()
            .filter(|v| v.direction == d)
            .map(|v| v.weight)
            .sum()
    };
    let buy_weight = tally(Direction::Buy);
    let sell_weight = tally(Direction::Sell);

    Signal {
        symbol: symbol.to_string(),
        action,
        strength: buy_weight + sell_weight,
        buy_weight,
        sell_weight,
        reasons: votes.iter().map(|v| v.reason.clone()).collect(),
        votes,
        observed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Neutral bar: RSI mid-range, MACD on its signal line, close inside the bands.
    fn neutral() -> IndicatorSnapshot {
        IndicatorSnapshot {
            close: 100.0,
            rsi: 50.0,
            macd: 0.0,
            macd_signal: 0.0,
            bb_upper: 110.0,
            bb_middle: 100.0,
            bb_lower: 90.0,
        }
    }

    #[test]
    fn test_oversold_bullish_macd_and_prediction_is_buy_6() {
        let snap = IndicatorSnapshot {
            rsi: 25.0,
            macd: 1.0,
            macd_signal: 0.5,
            ..neutral()
        };
        let signal = SignalScorer::default().score("BTC/USDT", &snap, Some(103.0));
        assert_eq!(signal.action, Action::Buy);
        assert!((signal.strength - 6.0).abs() < 0.001);
        assert_eq!(signal.reasons.len(), 3);
        assert!(signal.is_actionable(3.0));
    }

    #[test]
    fn test_overbought_not_flipped_by_bullish_prediction() {
        let snap = IndicatorSnapshot {
            rsi: 75.0,
            ..neutral()
        };
        let signal = SignalScorer::default().score("BTC/USDT", &snap, Some(103.0));
        // RSI outranks the prediction rule, so the action stays SELL
        assert_eq!(signal.action, Action::Sell);
        assert!((signal.strength - 5.0).abs() < 0.001);
        assert!((signal.sell_weight - 2.0).abs() < 0.001);
        assert!((signal.buy_weight - 3.0).abs() < 0.001);
        assert_eq!(signal.reasons[0], "RSI overbought");
    }

    #[test]
    fn test_no_votes_is_hold() {
        let signal = SignalScorer::default().score("BTC/USDT", &neutral(), None);
        assert_eq!(signal.action, Action::Hold);
        assert_eq!(signal.strength, 0.0);
        assert!(signal.reasons.is_empty());
        assert!(!signal.is_actionable(3.0));
    }

    #[test]
    fn test_below_threshold_not_actionable() {
        let snap = IndicatorSnapshot {
            close: 85.0,
            ..neutral()
        };
        let signal = SignalScorer::default().score("ETH/USDT", &snap, None);
        assert_eq!(signal.action, Action::Buy);
        assert!(!signal.is_actionable(3.0));
    }

    #[test]
    fn test_priority_order_independent_of_input_order() {
        let votes = vec![
            vote(RuleKind::Bollinger, Direction::Buy, 1.0, "bb".into()),
            vote(RuleKind::Macd, Direction::Sell, 1.0, "macd".into()),
        ];
        let signal = aggregate("X/USDT", votes);
        assert_eq!(signal.action, Action::Sell);
        assert_eq!(signal.reasons, vec!["macd".to_string(), "bb".to_string()]);
    }

    #[test]
    fn test_bearish_prediction() {
        let signal = SignalScorer::default().score("BTC/USDT", &neutral(), Some(95.0));
        assert_eq!(signal.action, Action::Sell);
        assert!((signal.strength - 3.0).abs() < 0.001);
        assert!(signal.reasons[0].contains("decrease"));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;

use super::signal::IndicatorSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
}

impl Candle {
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let hl = self.high - self.low;
        match prev_close {
            Some(pc) => {
                let hc = (self.high - pc).abs();
                let lc = (self.low - pc).abs();
                hl.max(hc).max(lc)
            }
            None => hl,
        }
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// Per-bar indicator values, aligned with the candle buffer. `None` during warm-up.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSeries {
    pub sma_fast: Vec<Option<f64>>,
    pub sma_slow: Vec<Option<f64>>,
    pub ema_fast: Vec<Option<f64>>,
    pub ema_slow: Vec<Option<f64>>,
    pub macd: Vec<Option<f64>>,
    pub macd_signal: Vec<Option<f64>>,
    pub macd_hist: Vec<Option<f64>>,
    pub rsi: Vec<Option<f64>>,
    pub bb_upper: Vec<Option<f64>>,
    pub bb_middle: Vec<Option<f64>>,
    pub bb_lower: Vec<Option<f64>>,
    pub atr: Vec<Option<f64>>,
    pub returns: Vec<Option<f64>>,
    pub volatility: Vec<Option<f64>>,
}

/// Model input for one bar, paired with that bar's close.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub features: Vec<f64>,
    pub close: f64,
}

pub const FEATURE_COUNT: usize = 19;

/// Rolling indicator calculator using a ring buffer of candles.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    candles: VecDeque<Candle>,
    max_size: usize,
    rsi_period: usize,
    atr_period: usize,
    macd_fast: usize,
    macd_slow: usize,
    macd_signal: usize,
    bb_period: usize,
    bb_std: f64,
    sma_fast: usize,
    sma_slow: usize,
    vol_window: usize,
}

impl IndicatorEngine {
    pub fn new(max_size: usize) -> Self {
        Self {
            candles: VecDeque::with_capacity(max_size),
            max_size,
            rsi_period: 14,
            atr_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_std: 2.0,
            sma_fast: 20,
            sma_slow: 50,
            vol_window: 20,
        }
    }

    pub fn from_candles(candles: &[Candle]) -> Self {
        let mut engine = Self::new(candles.len().max(1));
        for c in candles {
            engine.push(*c);
        }
        engine
    }

    pub fn push(&mut self, candle: Candle) {
        if self.candles.len() >= self.max_size {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.candles.back()
    }

    fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Simple moving average over the trailing `period` values.
    fn sma_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
        let mut out = vec![None; values.len()];
        if period == 0 || values.len() < period {
            return out;
        }
        let mut sum: f64 = values[..period].iter().sum();
        out[period - 1] = Some(sum / period as f64);
        for i in period..values.len() {
            sum += values[i] - values[i - period];
            out[i] = Some(sum / period as f64);
        }
        out
    }

    /// EMA seeded with the SMA of the first `period` values.
    fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
        let mut out = vec![None; values.len()];
        if period == 0 || values.len() < period {
            return out;
        }
        let multiplier = 2.0 / (period as f64 + 1.0);
        let mut ema = values[..period].iter().sum::<f64>() / period as f64;
        out[period - 1] = Some(ema);
        for i in period..values.len() {
            ema = (values[i] - ema) * multiplier + ema;
            out[i] = Some(ema);
        }
        out
    }

    /// Wilder-smoothed RSI.
    fn rsi_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
        let mut out = vec![None; values.len()];
        if period == 0 || values.len() <= period {
            return out;
        }

        let mut gain = 0.0;
        let mut loss = 0.0;
        for i in 1..=period {
            let change = values[i] - values[i - 1];
            if change > 0.0 {
                gain += change;
            } else {
                loss -= change;
            }
        }
        let mut avg_gain = gain / period as f64;
        let mut avg_loss = loss / period as f64;
        out[period] = Some(Self::rsi_from(avg_gain, avg_loss));

        for i in (period + 1)..values.len() {
            let change = values[i] - values[i - 1];
            let (g, l) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
            avg_gain = (avg_gain * (period as f64 - 1.0) + g) / period as f64;
            avg_loss = (avg_loss * (period as f64 - 1.0) + l) / period as f64;
            out[i] = Some(Self::rsi_from(avg_gain, avg_loss));
        }
        out
    }

    fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
        if avg_loss == 0.0 {
            if avg_gain == 0.0 {
                return 50.0;
            }
            return 100.0;
        }
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }

    /// Compute every indicator for every bar in the buffer.
    pub fn series(&self) -> IndicatorSeries {
        let closes = self.closes();
        let n = closes.len();

        let ema_fast = Self::ema_series(&closes, self.macd_fast);
        let ema_slow = Self::ema_series(&closes, self.macd_slow);

        // MACD line exists where both EMAs exist; signal is an EMA over the defined part
        let macd: Vec<Option<f64>> = ema_fast
            .iter()
            .zip(&ema_slow)
            .map(|(f, s)| Some((*f)? - (*s)?))
            .collect();
        let first_macd = macd.iter().position(|m| m.is_some());
        let mut macd_signal = vec![None; n];
        if let Some(start) = first_macd {
            let defined: Vec<f64> = macd[start..].iter().flatten().copied().collect();
            for (offset, v) in Self::ema_series(&defined, self.macd_signal).into_iter().enumerate() {
                macd_signal[start + offset] = v;
            }
        }
        let macd_hist = macd
            .iter()
            .zip(&macd_signal)
            .map(|(m, s)| Some((*m)? - (*s)?))
            .collect();

        let bb_middle = Self::sma_series(&closes, self.bb_period);
        let mut bb_upper = vec![None; n];
        let mut bb_lower = vec![None; n];
        for i in 0..n {
            if let Some(mid) = bb_middle[i] {
                let window = &closes[i + 1 - self.bb_period..=i];
                let sd = window.iter().population_std_dev();
                bb_upper[i] = Some(mid + self.bb_std * sd);
                bb_lower[i] = Some(mid - self.bb_std * sd);
            }
        }

        let mut returns = vec![None; n];
        for i in 1..n {
            if closes[i - 1] != 0.0 {
                returns[i] = Some((closes[i] - closes[i - 1]) / closes[i - 1]);
            }
        }
        let mut volatility = vec![None; n];
        for i in 0..n {
            if i >= self.vol_window {
                let window: Option<Vec<f64>> = returns[i + 1 - self.vol_window..=i].iter().copied().collect();
                if let Some(w) = window {
                    volatility[i] = Some(w.iter().std_dev());
                }
            }
        }

        let mut atr = vec![None; n];
        for i in 0..n {
            if i >= self.atr_period {
                let sum: f64 = (i + 1 - self.atr_period..=i)
                    .map(|j| self.candles[j].true_range(Some(self.candles[j - 1].close)))
                    .sum();
                atr[i] = Some(sum / self.atr_period as f64);
            }
        }

        IndicatorSeries {
            sma_fast: Self::sma_series(&closes, self.sma_fast),
            sma_slow: Self::sma_series(&closes, self.sma_slow),
            ema_fast,
            ema_slow,
            macd,
            macd_signal,
            macd_hist,
            rsi: Self::rsi_series(&closes, self.rsi_period),
            bb_upper,
            bb_middle,
            bb_lower,
            atr,
            returns,
            volatility,
        }
    }

    /// Latest RSI value.
    pub fn rsi(&self) -> Option<f64> {
        *Self::rsi_series(&self.closes(), self.rsi_period).last()?
    }

    /// Latest (macd, signal, histogram).
    pub fn macd(&self) -> Option<(f64, f64, f64)> {
        let s = self.series();
        let i = s.macd.len().checked_sub(1)?;
        Some((s.macd[i]?, s.macd_signal[i]?, s.macd_hist[i]?))
    }

    /// Latest (upper, middle, lower) Bollinger bands.
    pub fn bollinger(&self) -> Option<(f64, f64, f64)> {
        let s = self.series();
        let i = s.bb_middle.len().checked_sub(1)?;
        Some((s.bb_upper[i]?, s.bb_middle[i]?, s.bb_lower[i]?))
    }

    pub fn atr(&self) -> Option<f64> {
        *self.series().atr.last()?
    }

    /// Indicator values the scorer needs for the latest bar.
    pub fn snapshot(&self) -> Option<IndicatorSnapshot> {
        let s = self.series();
        let i = self.candles.len().checked_sub(1)?;
        Some(IndicatorSnapshot {
            close: self.candles[i].close,
            rsi: s.rsi[i]?,
            macd: s.macd[i]?,
            macd_signal: s.macd_signal[i]?,
            bb_upper: s.bb_upper[i]?,
            bb_middle: s.bb_middle[i]?,
            bb_lower: s.bb_lower[i]?,
        })
    }

    /// Feature rows for every bar past warm-up, oldest first.
    pub fn feature_rows(&self) -> Vec<FeatureRow> {
        let s = self.series();
        (0..self.candles.len())
            .filter_map(|i| {
                let c = &self.candles[i];
                let features = vec![
                    c.open,
                    c.high,
                    c.low,
                    c.close,
                    c.volume,
                    s.sma_fast[i]?,
                    s.sma_slow[i]?,
                    s.ema_fast[i]?,
                    s.ema_slow[i]?,
                    s.macd[i]?,
                    s.macd_signal[i]?,
                    s.macd_hist[i]?,
                    s.rsi[i]?,
                    s.bb_upper[i]?,
                    s.bb_middle[i]?,
                    s.bb_lower[i]?,
                    s.atr[i]?,
                    s.returns[i]?,
                    s.volatility[i]?,
                ];
                Some(FeatureRow {
                    features,
                    close: c.close,
                })
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_candle(close: f64) -> Candle {
        Candle {
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000.0,
            open_time: Utc::now(),
            close_time: Utc::now(),
        }
    }

    pub(crate) fn engine_from(closes: &[f64]) -> IndicatorEngine {
        let candles: Vec<Candle> = closes.iter().map(|c| make_candle(*c)).collect();
        IndicatorEngine::from_candles(&candles)
    }

    #[test]
    fn test_rsi_extremes() {
        let up: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(engine_from(&up).rsi(), Some(100.0));

        let flat = vec![100.0; 30];
        assert_eq!(engine_from(&flat).rsi(), Some(50.0));

        let down: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        assert!(engine_from(&down).rsi().unwrap() < 1.0);
    }

    #[test]
    fn test_rsi_needs_warmup() {
        let closes: Vec<f64> = (0..14).map(|i| 100.0 + i as f64).collect();
        assert_eq!(engine_from(&closes).rsi(), None);
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.5).collect();
        let (macd, _signal, _hist) = engine_from(&closes).macd().unwrap();
        assert!(macd > 0.0);
    }

    #[test]
    fn test_bollinger_flat_market_collapses() {
        let closes = vec![50.0; 25];
        let (upper, middle, lower) = engine_from(&closes).bollinger().unwrap();
        assert_eq!(middle, 50.0);
        assert_eq!(upper, 50.0);
        assert_eq!(lower, 50.0);
    }

    #[test]
    fn test_snapshot_and_features_after_warmup() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let engine = engine_from(&closes);
        let snap = engine.snapshot().unwrap();
        assert_eq!(snap.close, *closes.last().unwrap());
        assert!(snap.bb_upper >= snap.bb_middle && snap.bb_middle >= snap.bb_lower);

        let rows = engine.feature_rows();
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|r| r.features.len() == FEATURE_COUNT));
    }

    #[test]
    fn test_ring_buffer_bounded() {
        let mut engine = IndicatorEngine::new(10);
        for i in 0..25 {
            engine.push(make_candle(i as f64));
        }
        assert_eq!(engine.len(), 10);
        assert_eq!(engine.latest().map(|c| c.close), Some(24.0));
    }
}

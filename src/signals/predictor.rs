use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nalgebra::{DMatrix, DVector};
use statrs::statistics::Statistics;
use std::time::Duration;
use tracing::info;

use crate::models::candle::FeatureRow;

const MIN_SAMPLES: usize = 30;
const TRAIN_FRACTION: f64 = 0.8;

/// Ridge regression over standardized indicator features, predicting the next close.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    means: Vec<f64>,
    stds: Vec<f64>,
    weights: Vec<f64>,
    intercept: f64,
    /// R² on the hold-out set
    pub score: f64,
    pub samples: usize,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn predict(&self, features: &[f64]) -> Option<f64> {
        if features.len() != self.weights.len() {
            return None;
        }
        let y = self.intercept
            + features
                .iter()
                .zip(&self.means)
                .zip(&self.stds)
                .zip(&self.weights)
                .map(|(((x, m), s), w)| (x - m) / s * w)
                .sum::<f64>();
        y.is_finite().then_some(y)
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.trained_at
    }
}

#[derive(Debug, Clone)]
pub struct PricePredictor {
    lambda: f64,
}

impl Default for PricePredictor {
    fn default() -> Self {
        Self { lambda: 1.0 }
    }
}

impl PricePredictor {
    pub fn new(lambda: f64) -> Self {
        Self { lambda }
    }

    /// Fit on rows in time order. Row `i` is paired with the close of row `i + 1`;
    /// the first 80% of pairs train, the rest are held out for R².
    pub fn train(&self, rows: &[FeatureRow]) -> anyhow::Result<TrainedModel> {
        anyhow::ensure!(
            rows.len() > MIN_SAMPLES,
            "need more than {MIN_SAMPLES} feature rows, got {}",
            rows.len()
        );
        let width = rows[0].features.len();
        anyhow::ensure!(width > 0, "feature rows are empty");
        anyhow::ensure!(
            rows.iter().all(|r| r.features.len() == width),
            "feature rows have mixed widths"
        );

        let xs: Vec<&[f64]> = rows[..rows.len() - 1].iter().map(|r| r.features.as_slice()).collect();
        let ys: Vec<f64> = rows[1..].iter().map(|r| r.close).collect();

        let split = ((xs.len() as f64) * TRAIN_FRACTION).round() as usize;
        let split = split.clamp(1, xs.len() - 1);
        let (train_x, test_x) = xs.split_at(split);
        let (train_y, test_y) = ys.split_at(split);

        let mut means = Vec::with_capacity(width);
        let mut stds = Vec::with_capacity(width);
        for j in 0..width {
            let col: Vec<f64> = train_x.iter().map(|x| x[j]).collect();
            let mean = col.iter().mean();
            let sd = col.iter().population_std_dev();
            means.push(mean);
            // Constant columns carry no signal; a unit scale keeps them at zero
            stds.push(if sd.is_finite() && sd > 1e-12 { sd } else { 1.0 });
        }

        let intercept = train_y.iter().mean();
        let z = DMatrix::from_fn(train_x.len(), width, |i, j| (train_x[i][j] - means[j]) / stds[j]);
        let y = DVector::from_iterator(train_y.len(), train_y.iter().map(|y| y - intercept));

        // Normal equations: (ZᵀZ + λI) w = Zᵀ(y - ȳ)
        let zt = z.transpose();
        let a = &zt * &z + DMatrix::<f64>::identity(width, width) * self.lambda;
        let weights = a
            .cholesky()
            .ok_or_else(|| anyhow::anyhow!("normal equations are not positive definite"))?
            .solve(&(&zt * y));
        let weights: Vec<f64> = weights.iter().copied().collect();

        let mut model = TrainedModel {
            means,
            stds,
            weights,
            intercept,
            score: 0.0,
            samples: train_x.len(),
            trained_at: Utc::now(),
        };

        let preds: Vec<f64> = test_x
            .iter()
            .map(|x| model.predict(x).unwrap_or(intercept))
            .collect();
        model.score = r_squared(test_y, &preds);
        Ok(model)
    }

    /// Train on the blocking pool so the fit never stalls the runtime.
    pub async fn train_blocking(&self, rows: Vec<FeatureRow>) -> anyhow::Result<TrainedModel> {
        let predictor = self.clone();
        tokio::task::spawn_blocking(move || predictor.train(&rows)).await?
    }
}

fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    let mean = actual.iter().mean();
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}

/// Latest model per symbol.
#[derive(Default)]
pub struct ModelStore {
    models: DashMap<String, TrainedModel>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no model exists or the current one is older than `max_age`.
    pub fn needs_training(&self, symbol: &str, max_age: Duration) -> bool {
        match self.models.get(symbol) {
            None => true,
            Some(model) => model
                .age()
                .to_std()
                .map(|age| age >= max_age)
                .unwrap_or(false),
        }
    }

    pub fn insert(&self, symbol: &str, model: TrainedModel) {
        info!(
            "Model trained for {symbol}: R² {:.4} on hold-out ({} samples)",
            model.score, model.samples
        );
        self.models.insert(symbol.to_string(), model);
    }

    pub fn predict(&self, symbol: &str, features: &[f64]) -> Option<f64> {
        self.models.get(symbol)?.predict(features)
    }

    pub fn score(&self, symbol: &str) -> Option<f64> {
        self.models.get(symbol).map(|m| m.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_rows(n: usize) -> Vec<FeatureRow> {
        // close follows a gentle trend; features include the close itself
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.5 + (i as f64 * 0.7).sin();
                FeatureRow {
                    features: vec![close, close * 0.99, (i as f64 * 0.7).sin(), 1.0],
                    close,
                }
            })
            .collect()
    }

    #[test]
    fn test_fits_trend() {
        let rows = linear_rows(200);
        let model = PricePredictor::new(0.01).train(&rows).unwrap();
        assert!(model.score > 0.8, "R² was {}", model.score);

        let last = rows.last().unwrap();
        let pred = model.predict(&last.features).unwrap();
        assert!((pred - last.close).abs() < 5.0);
    }

    #[test]
    fn test_rejects_short_history() {
        let rows = linear_rows(10);
        assert!(PricePredictor::default().train(&rows).is_err());
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let model = PricePredictor::default().train(&linear_rows(100)).unwrap();
        assert!(model.predict(&[1.0, 2.0]).is_none());
    }

    #[test]
    fn test_heavy_ridge_falls_back_to_mean() {
        let rows = linear_rows(100);
        let model = PricePredictor::new(1e9).train(&rows).unwrap();
        let mean = rows[1..80].iter().map(|r| r.close).mean();
        let pred = model.predict(&rows[50].features).unwrap();
        assert!((pred - mean).abs() < 1e-3, "{pred} vs {mean}");
    }

    #[test]
    fn test_store_retrain_rules() {
        let store = ModelStore::new();
        assert!(store.needs_training("BTC/USDT", Duration::from_secs(60)));

        let model = PricePredictor::default().train(&linear_rows(100)).unwrap();
        store.insert("BTC/USDT", model);
        assert!(!store.needs_training("BTC/USDT", Duration::from_secs(3600)));
        assert!(store.needs_training("BTC/USDT", Duration::ZERO));
    }

    #[tokio::test]
    async fn test_train_blocking() {
        let model = PricePredictor::default()
            .train_blocking(linear_rows(100))
            .await
            .unwrap();
        assert_eq!(model.samples, 79);
    }
}

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
struct DayTotals {
    trading: f64,
    arbitrage: f64,
}

impl DayTotals {
    fn total(&self) -> f64 {
        self.trading + self.arbitrage
    }
}

/// Aggregate counters, persisted as `performance_metrics` in the state file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub trading_profit: f64,
    pub arbitrage_profit: f64,
    pub content_potential: f64,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub success_rate: f64,
    pub arbitrage_executions: u64,
    pub content_count: u64,
    pub opportunities: u64,
    pub best_asset: Option<String>,
}

/// Snapshot written on shutdown and read back at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub total_profit: f64,
    pub daily_profits: BTreeMap<String, f64>,
    pub performance_metrics: PerformanceMetrics,
    pub shutdown_time: DateTime<Utc>,
}

impl SystemState {
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!("System state saved to {}", path.display());
        Ok(())
    }

    /// `Ok(None)` when no state file exists yet.
    pub async fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let state = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(state))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub total_profit: f64,
    pub trading_profit: f64,
    pub content_profit: f64,
    pub arbitrage_profit: f64,
    pub success_rate: f64,
    pub total_trades: u64,
    pub content_count: u64,
    pub opportunities: u64,
    pub best_asset: Option<String>,
}

/// Profit and activity counters fed by every loop. Only realized results are
/// recorded; content revenue stays an estimate and is tracked separately.
#[derive(Default)]
pub struct PerformanceTracker {
    daily: DashMap<NaiveDate, DayTotals>,
    asset_profit: DashMap<String, f64>,
    carried_trading: std::sync::Mutex<f64>,
    carried_arbitrage: std::sync::Mutex<f64>,
    content_potential: std::sync::Mutex<f64>,
    total_trades: AtomicU64,
    winning_trades: AtomicU64,
    arbitrage_executions: AtomicU64,
    content_count: AtomicU64,
    opportunities: AtomicU64,
}

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

fn add(cell: &std::sync::Mutex<f64>, v: f64) {
    let mut guard = cell.lock().unwrap_or_else(|p| p.into_inner());
    *guard += v;
}

fn read(cell: &std::sync::Mutex<f64>) -> f64 {
    *cell.lock().unwrap_or_else(|p| p.into_inner())
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed counters from a previous run's state file.
    pub fn restore(state: &SystemState) -> Self {
        let tracker = Self::new();
        let m = &state.performance_metrics;
        for (day, profit) in &state.daily_profits {
            if let Ok(date) = NaiveDate::parse_from_str(day, "%Y-%m-%d") {
                // Per-source split is not persisted per day.
                tracker.daily.insert(
                    date,
                    DayTotals {
                        trading: *profit,
                        arbitrage: 0.0,
                    },
                );
            }
        }
        let daily_sum: f64 = state.daily_profits.values().sum();
        // Daily totals were booked as trading above; the carry restores the split.
        add(&tracker.carried_trading, m.trading_profit - daily_sum);
        add(&tracker.carried_arbitrage, m.arbitrage_profit);
        add(&tracker.content_potential, m.content_potential);
        tracker.total_trades.store(m.total_trades, Ordering::Relaxed);
        tracker.winning_trades.store(m.winning_trades, Ordering::Relaxed);
        tracker
            .arbitrage_executions
            .store(m.arbitrage_executions, Ordering::Relaxed);
        tracker.content_count.store(m.content_count, Ordering::Relaxed);
        tracker.opportunities.store(m.opportunities, Ordering::Relaxed);
        tracker
    }

    pub fn record_trade(&self, symbol: &str, profit: Decimal, at: DateTime<Utc>) {
        let profit = to_f64(profit);
        self.total_trades.fetch_add(1, Ordering::Relaxed);
        if profit > 0.0 {
            self.winning_trades.fetch_add(1, Ordering::Relaxed);
        }
        *self.asset_profit.entry(symbol.to_string()).or_insert(0.0) += profit;
        self.daily.entry(at.date_naive()).or_default().trading += profit;
    }

    pub fn record_arbitrage(&self, profit: Decimal, at: DateTime<Utc>) {
        self.arbitrage_executions.fetch_add(1, Ordering::Relaxed);
        self.daily.entry(at.date_naive()).or_default().arbitrage += to_f64(profit);
    }

    pub fn record_content(&self, estimated_monthly: f64) {
        self.content_count.fetch_add(1, Ordering::Relaxed);
        add(&self.content_potential, estimated_monthly);
    }

    pub fn record_opportunities(&self, count: usize) {
        self.opportunities.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn trading_profit(&self) -> f64 {
        read(&self.carried_trading) + self.daily.iter().map(|d| d.trading).sum::<f64>()
    }

    fn arbitrage_profit(&self) -> f64 {
        read(&self.carried_arbitrage) + self.daily.iter().map(|d| d.arbitrage).sum::<f64>()
    }

    pub fn total_profit(&self) -> f64 {
        self.trading_profit() + self.arbitrage_profit()
    }

    pub fn profit_on(&self, date: NaiveDate) -> f64 {
        self.daily.get(&date).map(|d| d.total()).unwrap_or(0.0)
    }

    fn success_rate(&self) -> f64 {
        let total = self.total_trades.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.winning_trades.load(Ordering::Relaxed) as f64 / total as f64 * 100.0
    }

    fn best_asset(&self) -> Option<String> {
        self.asset_profit
            .iter()
            .filter(|e| *e.value() > 0.0)
            .max_by(|a, b| a.value().total_cmp(b.value()))
            .map(|e| e.key().clone())
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            trading_profit: self.trading_profit(),
            arbitrage_profit: self.arbitrage_profit(),
            content_potential: read(&self.content_potential),
            total_trades: self.total_trades.load(Ordering::Relaxed),
            winning_trades: self.winning_trades.load(Ordering::Relaxed),
            success_rate: self.success_rate(),
            arbitrage_executions: self.arbitrage_executions.load(Ordering::Relaxed),
            content_count: self.content_count.load(Ordering::Relaxed),
            opportunities: self.opportunities.load(Ordering::Relaxed),
            best_asset: self.best_asset(),
        }
    }

    /// Profit figures are for `date`; counts are lifetime totals.
    pub fn daily_report(&self, date: NaiveDate) -> DailyReport {
        let day = self.daily.get(&date).map(|d| *d).unwrap_or_default();
        let m = self.metrics();
        DailyReport {
            date,
            total_profit: day.total(),
            trading_profit: day.trading,
            content_profit: 0.0,
            arbitrage_profit: day.arbitrage,
            success_rate: m.success_rate,
            total_trades: m.total_trades,
            content_count: m.content_count,
            opportunities: m.opportunities,
            best_asset: m.best_asset,
        }
    }

    pub fn state(&self, shutdown_time: DateTime<Utc>) -> SystemState {
        let daily_profits = self
            .daily
            .iter()
            .map(|e| (e.key().format("%Y-%m-%d").to_string(), e.value().total()))
            .collect();
        SystemState {
            total_profit: self.total_profit(),
            daily_profits,
            performance_metrics: self.metrics(),
            shutdown_time,
        }
    }

    /// Body of the hourly notification.
    pub fn hourly_update(&self, today: NaiveDate) -> String {
        let m = self.metrics();
        format!(
            "Total profit: ${:.2}\nToday: ${:.2}\nTrades: {} ({:.1}% success)\nArbitrage executions: {}\nOpportunities found: {}",
            self.total_profit(),
            self.profit_on(today),
            m.total_trades,
            m.success_rate,
            m.arbitrage_executions,
            m.opportunities,
        )
    }

    pub fn log_summary(&self) {
        let m = self.metrics();
        info!(
            "=== PERFORMANCE === total=${:.2} trading=${:.2} arbitrage=${:.2} trades={} success={:.1}% content={} opportunities={}",
            self.total_profit(),
            m.trading_profit,
            m.arbitrage_profit,
            m.total_trades,
            m.success_rate,
            m.content_count,
            m.opportunities,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    #[test]
    fn test_profits_split_by_day_and_source() {
        let tracker = PerformanceTracker::new();
        tracker.record_trade("BTC/USDT", dec!(12.5), at(1));
        tracker.record_trade("ETH/USDT", dec!(-2.5), at(1));
        tracker.record_arbitrage(dec!(5), at(2));

        assert_eq!(tracker.profit_on(date(1)), 10.0);
        assert_eq!(tracker.profit_on(date(2)), 5.0);
        assert_eq!(tracker.total_profit(), 15.0);

        let m = tracker.metrics();
        assert_eq!(m.total_trades, 2);
        assert_eq!(m.success_rate, 50.0);
        assert_eq!(m.best_asset.as_deref(), Some("BTC/USDT"));
    }

    #[test]
    fn test_hourly_update_figures() {
        let tracker = PerformanceTracker::new();
        tracker.record_trade("BTC/USDT", dec!(12.5), at(1));
        tracker.record_arbitrage(dec!(5), at(2));
        tracker.record_opportunities(3);

        let text = tracker.hourly_update(date(2));
        assert!(text.contains("Total profit: $17.50"));
        assert!(text.contains("Today: $5.00"));
        assert!(text.contains("Trades: 1 (100.0% success)"));
        assert!(text.contains("Arbitrage executions: 1"));
        assert!(text.contains("Opportunities found: 3"));
    }

    #[test]
    fn test_daily_report_counts() {
        let tracker = PerformanceTracker::new();
        tracker.record_trade("BTC/USDT", dec!(3), at(4));
        tracker.record_content(120.0);
        tracker.record_opportunities(7);

        let report = tracker.daily_report(date(4));
        assert_eq!(report.trading_profit, 3.0);
        assert_eq!(report.content_count, 1);
        assert_eq!(report.opportunities, 7);
        assert_eq!(report.success_rate, 100.0);

        let empty = tracker.daily_report(date(5));
        assert_eq!(empty.total_profit, 0.0);
    }

    #[test]
    fn test_no_trades_means_no_success_rate() {
        let m = PerformanceTracker::new().metrics();
        assert_eq!(m.success_rate, 0.0);
        assert!(m.best_asset.is_none());
    }

    #[tokio::test]
    async fn test_state_file_round_trip_restores_totals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system_state.json");

        let tracker = PerformanceTracker::new();
        tracker.record_trade("BTC/USDT", dec!(40), at(1));
        tracker.record_arbitrage(dec!(10), at(1));
        tracker.state(at(1)).save(&path).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["total_profit"], 50.0);
        assert_eq!(json["daily_profits"]["2025-03-01"], 50.0);
        assert!(json["shutdown_time"].is_string());

        let state = SystemState::load(&path).await.unwrap().unwrap();
        let restored = PerformanceTracker::restore(&state);
        assert_eq!(restored.total_profit(), 50.0);
        assert_eq!(restored.metrics().total_trades, 1);

        restored.record_trade("BTC/USDT", dec!(1), at(2));
        assert_eq!(restored.total_profit(), 51.0);
    }

    #[tokio::test]
    async fn test_missing_state_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = SystemState::load(dir.path().join("absent.json")).await.unwrap();
        assert!(loaded.is_none());
    }
}

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::content::generator::ContentGenerator;
use crate::content::llm::LlmClient;
use crate::execution::arbitrage::{ArbitrageError, ArbitrageExecutor};
use crate::execution::executor::{Executor, ExecutorHandle, ExecutorSettings};
use crate::feeds::exchange::{CallGuard, ExchangeAdapter};
use crate::feeds::quotes::QuoteFetcher;
use crate::models::candle::IndicatorEngine;
use crate::models::content::ContentPackage;
use crate::models::history::History;
use crate::models::opportunity::{
    ArbitrageOpportunity, ExecutedArbitrage, Opportunity, OpportunitySummary,
};
use crate::models::order::TradeOutcome;
use crate::models::quote::Quote;
use crate::signals::arbitrage::ArbitrageEvaluator;
use crate::signals::opportunities::{DomainScanner, ProductScanner};
use crate::signals::predictor::{ModelStore, PricePredictor};
use crate::signals::scorer::SignalScorer;
use crate::telemetry::alerts::{AlertManager, Notification, Notifier, Severity};
use crate::telemetry::performance::{PerformanceTracker, SystemState};

const NOTIFICATION_QUEUE: usize = 1024;
const NOTIFICATION_INTERVAL: Duration = Duration::from_secs(10);
const PERFORMANCE_INTERVAL: Duration = Duration::from_secs(60);
const HEALTH_INTERVAL: Duration = Duration::from_secs(300);

/// Polling period and post-error pause for one service loop.
#[derive(Debug, Clone, Copy)]
struct LoopTiming {
    name: &'static str,
    period: Duration,
    backoff: Duration,
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n.max(1))
}

/// Runs every service loop against shared state and owns the shutdown path.
pub struct Orchestrator {
    config: Config,
    trading: Arc<dyn ExchangeAdapter>,
    guard: CallGuard,
    quotes: QuoteFetcher,
    evaluator: ArbitrageEvaluator,
    arb_executor: ArbitrageExecutor,
    scorer: SignalScorer,
    predictor: PricePredictor,
    models: ModelStore,
    executor: ExecutorHandle,
    executor_task: Mutex<Option<JoinHandle<()>>>,
    products: ProductScanner,
    domains: DomainScanner,
    content: ContentGenerator,
    alerts: AlertManager,
    notifier: Notifier,
    notifications: Mutex<mpsc::Receiver<Notification>>,
    performance: PerformanceTracker,
    opportunities: RwLock<History<Opportunity>>,
    executed: RwLock<History<ExecutedArbitrage>>,
    library: RwLock<History<ContentPackage>>,
    rng: std::sync::Mutex<StdRng>,
    last_tick: std::sync::Mutex<DateTime<Utc>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Orchestrator {
    /// `trading` carries the signal bot's orders; `venues` are the arbitrage
    /// venues. Both are already paper-wrapped in dry-run mode.
    pub fn new(
        config: Config,
        trading: Arc<dyn ExchangeAdapter>,
        venues: Vec<Arc<dyn ExchangeAdapter>>,
        llm: Arc<dyn LlmClient>,
        previous: Option<SystemState>,
    ) -> Result<Self> {
        let alerts = AlertManager::new(config.telemetry.clone())
            .context("building notification client")?;
        let guard = CallGuard::new(
            config.runtime.max_concurrent_requests,
            Duration::from_secs(config.exchanges.request_timeout_secs.max(1)),
        );
        let (shutdown_tx, _) = broadcast::channel(4);
        let (executor, executor_task) = Executor::spawn(
            trading.clone(),
            guard.clone(),
            ExecutorSettings::from_config(&config.trading),
            shutdown_tx.subscribe(),
        );
        let (notifier, notifications) = Notifier::channel(NOTIFICATION_QUEUE);
        let performance = match &previous {
            Some(state) => {
                info!(
                    "Restored state from {}: total profit ${:.2}",
                    state.shutdown_time, state.total_profit
                );
                PerformanceTracker::restore(state)
            }
            None => PerformanceTracker::new(),
        };

        Ok(Self {
            trading,
            quotes: QuoteFetcher::new(venues, guard.clone()),
            evaluator: ArbitrageEvaluator::from_config(&config.arbitrage),
            arb_executor: ArbitrageExecutor::new(guard.clone(), &config.arbitrage),
            guard,
            scorer: SignalScorer::default(),
            predictor: PricePredictor::default(),
            models: ModelStore::new(),
            executor,
            executor_task: Mutex::new(Some(executor_task)),
            products: ProductScanner::default(),
            domains: DomainScanner::default(),
            content: ContentGenerator::new(llm, &config.content),
            alerts,
            notifier,
            notifications: Mutex::new(notifications),
            performance,
            opportunities: RwLock::new(History::new(config.arbitrage.history_capacity)),
            executed: RwLock::new(History::new(config.arbitrage.history_capacity)),
            library: RwLock::new(History::new(config.content.library_capacity)),
            rng: std::sync::Mutex::new(StdRng::from_entropy()),
            last_tick: std::sync::Mutex::new(Utc::now()),
            shutdown_tx,
            config,
        })
    }

    pub fn executor(&self) -> &ExecutorHandle {
        &self.executor
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn performance(&self) -> &PerformanceTracker {
        &self.performance
    }

    pub async fn opportunities(&self) -> Vec<Opportunity> {
        self.opportunities.read().await.to_vec()
    }

    pub async fn opportunity_summary(&self) -> OpportunitySummary {
        OpportunitySummary::summarize(self.opportunities.read().await.iter())
    }

    pub async fn executed_arbitrage(&self) -> Vec<ExecutedArbitrage> {
        self.executed.read().await.to_vec()
    }

    pub async fn content_library(&self) -> Vec<ContentPackage> {
        self.library.read().await.to_vec()
    }

    fn timings(&self) -> [LoopTiming; 7] {
        let t = &self.config.trading;
        let a = &self.config.arbitrage;
        [
            LoopTiming { name: "trading", period: secs(t.trade_interval_secs), backoff: secs(300) },
            LoopTiming { name: "monitor", period: secs(t.monitor_interval_secs), backoff: secs(60) },
            LoopTiming { name: "arbitrage", period: secs(a.scan_interval_secs), backoff: secs(60) },
            LoopTiming { name: "products", period: secs(a.product_scan_interval_secs), backoff: secs(600) },
            LoopTiming { name: "domains", period: secs(a.domain_scan_interval_secs), backoff: secs(600) },
            LoopTiming { name: "content", period: secs(self.config.content.interval_secs), backoff: secs(300) },
            LoopTiming { name: "performance", period: PERFORMANCE_INTERVAL, backoff: secs(60) },
        ]
    }

    // --- Trading ---

    /// Score every pair and hand actionable signals to the executor. Fails only
    /// when no pair could be processed.
    pub async fn trading_cycle(&self) -> Result<()> {
        let pairs = &self.config.trading.pairs;
        let mut failures = 0;
        for pair in pairs {
            if let Err(e) = self.trade_pair(pair).await {
                warn!("Trading {pair} failed: {e:#}");
                failures += 1;
            }
        }
        if !pairs.is_empty() && failures == pairs.len() {
            bail!("every trading pair failed");
        }
        Ok(())
    }

    async fn trade_pair(&self, pair: &str) -> Result<()> {
        let t = &self.config.trading;
        let candles = self
            .guard
            .run(self.trading.fetch_candles(pair, &t.candle_interval, t.candle_limit))
            .await
            .with_context(|| format!("candles for {pair}"))?;
        let engine = IndicatorEngine::from_candles(&candles);
        let Some(snapshot) = engine.snapshot() else {
            debug!("Not enough history for {pair} ({} bars)", engine.len());
            return Ok(());
        };

        self.ensure_model(pair).await;
        let predicted = engine
            .feature_rows()
            .last()
            .and_then(|row| self.models.predict(pair, &row.features));

        let signal = self.scorer.score(pair, &snapshot, predicted);
        debug!(
            "{pair}: {} strength {:.1} ({})",
            signal.action,
            signal.strength,
            signal.reasons.join("; ")
        );
        if signal.is_actionable(t.signal_threshold) {
            info!(
                "Signal for {pair}: {} strength {:.1}: {}",
                signal.action,
                signal.strength,
                signal.reasons.join(", ")
            );
            let outcome = self.executor.execute_signal(&signal).await;
            self.handle_outcome(&outcome);
        }
        Ok(())
    }

    /// Retrain when the model is missing or stale. Training failures only
    /// cost the prediction vote.
    async fn ensure_model(&self, pair: &str) {
        let t = &self.config.trading;
        if !self
            .models
            .needs_training(pair, Duration::from_secs(t.retrain_interval_secs))
        {
            return;
        }
        let history = match self
            .guard
            .run(self.trading.fetch_candles(pair, &t.candle_interval, t.training_limit))
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                warn!("Training data for {pair} unavailable: {e}");
                return;
            }
        };
        let rows = IndicatorEngine::from_candles(&history).feature_rows();
        match self.predictor.train_blocking(rows).await {
            Ok(model) => self.models.insert(pair, model),
            Err(e) => warn!("Model training for {pair} failed: {e:#}"),
        }
    }

    fn handle_outcome(&self, outcome: &TradeOutcome) {
        match outcome {
            TradeOutcome::Opened {
                symbol,
                amount,
                price,
                order_id,
            } => info!("BUY order executed: {amount} {symbol} at {price} ({order_id})"),
            TradeOutcome::Closed {
                symbol,
                profit,
                profit_pct,
                reason,
                ..
            } => {
                info!(
                    "SELL order executed: {symbol} ({reason:?}), profit ${} ({}%)",
                    profit.round_dp(2),
                    profit_pct.round_dp(2)
                );
                self.performance.record_trade(symbol, *profit, Utc::now());
                if let Some(n) = Notification::from_trade(outcome) {
                    self.notifier.send(n);
                }
            }
            TradeOutcome::Error { message } => {
                error!("Order failed: {message}");
                self.notifier.alert("Trading", message.clone(), Severity::Warning);
            }
            other => debug!("No trade: {other:?}"),
        }
    }

    /// Close positions whose stop-loss or take-profit has been crossed.
    pub async fn monitor_cycle(&self) -> Result<()> {
        for position in self.executor.positions() {
            let ticker = match self.guard.run(self.trading.fetch_ticker(&position.symbol)).await {
                Ok(t) => t,
                Err(e) => {
                    warn!("Price check for {} failed: {e}", position.symbol);
                    continue;
                }
            };
            let Some(price) = Quote::from_ticker(self.trading.id(), ticker).mark_price() else {
                continue;
            };
            if let Some(reason) = position.exit_trigger(price) {
                info!("{reason:?} hit for {} at {price}", position.symbol);
                let outcome = self.executor.sell(&position.symbol, reason).await;
                self.handle_outcome(&outcome);
            }
        }
        Ok(())
    }

    // --- Opportunities ---

    pub async fn arbitrage_cycle(&self) -> Result<()> {
        let threshold = self.config.arbitrage.execution_threshold_pct;
        for symbol in &self.config.arbitrage.symbols {
            let quotes = self.quotes.fetch_quotes(symbol).await;
            let Some(opp) = self.evaluator.evaluate(symbol, &quotes) else {
                continue;
            };
            info!(
                "Arbitrage opportunity: {} buy {} @ {} sell {} @ {} net {}%",
                opp.symbol,
                opp.buy_exchange,
                opp.buy_price,
                opp.sell_exchange,
                opp.sell_price,
                opp.net_profit_pct.round_dp(2)
            );
            self.opportunities
                .write()
                .await
                .push(Opportunity::Crypto(opp.clone()));
            self.performance.record_opportunities(1);
            self.notifier.send(Notification::from_arbitrage(&opp));

            if opp.net_profit_pct > threshold {
                self.execute_arbitrage(&opp).await;
            }
        }
        Ok(())
    }

    fn leg_venue(&self, id: &str) -> Result<Arc<dyn ExchangeAdapter>, ArbitrageError> {
        self.quotes
            .venue(id)
            .ok_or_else(|| ArbitrageError::UnknownVenue(id.to_string()))
    }

    async fn execute_arbitrage(&self, opp: &ArbitrageOpportunity) {
        let result = match (
            self.leg_venue(&opp.buy_exchange),
            self.leg_venue(&opp.sell_exchange),
        ) {
            (Ok(buy), Ok(sell)) => self.arb_executor.execute(opp, buy, sell).await,
            (Err(e), _) | (_, Err(e)) => Err(e),
        };
        match result {
            Ok(trade) => {
                self.performance.record_arbitrage(trade.profit, trade.executed_at);
                self.executed.write().await.push(trade);
            }
            Err(e @ ArbitrageError::UnknownVenue(_)) => {
                warn!("Arbitrage on {} not executed: {e}", opp.symbol)
            }
            Err(e) => debug!("Arbitrage on {} not executed: {e}", opp.symbol),
        }
    }

    async fn record_found(&self, found: Vec<Opportunity>) {
        if found.is_empty() {
            return;
        }
        self.performance.record_opportunities(found.len());
        let best = found
            .iter()
            .max_by(|a, b| a.score_pct().total_cmp(&b.score_pct()))
            .cloned();
        {
            let mut history = self.opportunities.write().await;
            for op in found {
                history.push(op);
            }
        }
        if let Some(best) = best {
            self.notifier.send(Notification::from_opportunity(&best));
        }
    }

    pub async fn product_cycle(&self) -> Result<()> {
        let found: Vec<Opportunity> = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            self.products
                .scan(&mut *rng)
                .into_iter()
                .map(Opportunity::Product)
                .collect()
        };
        info!("Product scan: {} opportunities", found.len());
        self.record_found(found).await;
        Ok(())
    }

    pub async fn domain_cycle(&self) -> Result<()> {
        let found: Vec<Opportunity> = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            self.domains
                .scan(&mut *rng)
                .into_iter()
                .map(Opportunity::Domain)
                .collect()
        };
        info!("Domain scan: {} opportunities", found.len());
        self.record_found(found).await;
        Ok(())
    }

    // --- Content ---

    pub async fn content_cycle(&self) -> Result<()> {
        let packages = self.content.generate_batch().await;
        let usable = packages
            .iter()
            .filter(|p| p.failed_pieces() < 3 + p.social_campaign.len())
            .count();

        for package in packages {
            let revenue = package.monetization.total_monthly_potential;
            self.performance.record_content(revenue);
            self.notifier.send(Notification::Content {
                topic: package.topic.topic.clone(),
                platform: "blog".into(),
                estimated_revenue: revenue,
            });
            self.library.write().await.push(package);
        }

        if usable == 0 && self.config.content.topics_per_batch > 0 {
            bail!("content generation produced nothing usable");
        }
        Ok(())
    }

    // --- Notifications and reporting ---

    pub async fn flush_notifications(&self) -> usize {
        let mut rx = self.notifications.lock().await;
        self.alerts.drain(&mut rx).await
    }

    pub async fn performance_cycle(&self) -> Result<()> {
        let now = Utc::now();
        let previous = {
            let mut last = self.last_tick.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::replace(&mut *last, now)
        };
        let (hourly, finished_day) = report_schedule(previous, now);
        if hourly {
            self.send_hourly_update(now);
        }
        if let Some(day) = finished_day {
            let report = self.performance.daily_report(day);
            info!("Daily report for {day}: ${:.2}", report.total_profit);
            self.notifier.send(Notification::DailyReport(report));
        }
        Ok(())
    }

    fn send_hourly_update(&self, now: DateTime<Utc>) {
        self.performance.log_summary();
        self.notifier.alert(
            "Performance Update",
            self.performance.hourly_update(now.date_naive()),
            Severity::Info,
        );
    }

    async fn health_check(&self, loops: &[(&'static str, JoinHandle<()>)]) {
        for (name, handle) in loops {
            if handle.is_finished() {
                error!("{name} loop has stopped");
                self.notifier.alert(
                    "Health Check",
                    format!("{name} loop stopped unexpectedly"),
                    Severity::Error,
                );
            }
        }
        match self.executor.stats().await {
            Some(stats) => info!(
                "Health: {} open positions, exposure {}, realized P&L {}, win rate {:.1}%",
                stats.open_positions,
                stats.exposure.round_dp(2),
                stats.realized_pnl.round_dp(2),
                stats.win_rate * 100.0
            ),
            None => {
                error!("Executor is not responding");
                self.notifier
                    .alert("Health Check", "executor stopped", Severity::Error);
            }
        }
    }

    // --- Lifecycle ---

    fn spawn_loop<F, Fut>(
        self: &Arc<Self>,
        timing: LoopTiming,
        step: F,
    ) -> (&'static str, JoinHandle<()>)
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let this = self.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            info!("Starting {} loop", timing.name);
            let mut interval = tokio::time::interval(timing.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = step(this.clone()).await {
                            error!("{} loop error: {e:#}", timing.name);
                            tokio::select! {
                                _ = tokio::time::sleep(timing.backoff) => {}
                                _ = shutdown.recv() => break,
                            }
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
            info!("{} loop stopped", timing.name);
        });
        (timing.name, handle)
    }

    /// Run every loop until `shutdown_signal` resolves, then stop them, flush
    /// queued notifications and write the state file.
    pub async fn run(self: Arc<Self>, shutdown_signal: impl Future<Output = ()>) -> Result<()> {
        let [trading, monitor, arbitrage, products, domains, content, performance] =
            self.timings();
        let mut loops = vec![
            self.spawn_loop(trading, |o| async move { o.trading_cycle().await }),
            self.spawn_loop(monitor, |o| async move { o.monitor_cycle().await }),
            self.spawn_loop(arbitrage, |o| async move { o.arbitrage_cycle().await }),
            self.spawn_loop(products, |o| async move { o.product_cycle().await }),
            self.spawn_loop(domains, |o| async move { o.domain_cycle().await }),
            self.spawn_loop(content, |o| async move { o.content_cycle().await }),
            self.spawn_loop(performance, |o| async move { o.performance_cycle().await }),
        ];
        loops.push(self.spawn_loop(
            LoopTiming {
                name: "notifications",
                period: NOTIFICATION_INTERVAL,
                backoff: secs(30),
            },
            |o| async move {
                o.flush_notifications().await;
                Ok(())
            },
        ));

        self.notifier.alert(
            "System Startup",
            format!(
                "Automated profit system started ({} mode)",
                if self.config.is_dry_run() { "paper" } else { "live" }
            ),
            Severity::Success,
        );

        let mut health = tokio::time::interval(HEALTH_INTERVAL);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown_signal);
        loop {
            tokio::select! {
                _ = health.tick() => self.health_check(&loops).await,
                _ = &mut shutdown_signal => break,
            }
        }

        self.shutdown(loops).await
    }

    async fn shutdown(&self, loops: Vec<(&'static str, JoinHandle<()>)>) -> Result<()> {
        info!("Shutting down automated profit system");
        let _ = self.shutdown_tx.send(());

        let mut handles: Vec<JoinHandle<()>> = loops.into_iter().map(|(_, h)| h).collect();
        if let Some(task) = self.executor_task.lock().await.take() {
            handles.push(task);
        }
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let grace = secs(self.config.runtime.shutdown_grace_secs);
        if tokio::time::timeout(grace, join_all(handles)).await.is_err() {
            warn!("Some loops did not stop within {grace:?}; aborting them");
            // Dropping an aborted loop releases any lock it held
            for abort in &aborts {
                abort.abort();
            }
        }

        self.notifier.alert(
            "System Shutdown",
            format!("Total profit: ${:.2}", self.performance.total_profit()),
            Severity::Info,
        );
        if tokio::time::timeout(grace, self.flush_notifications()).await.is_err() {
            warn!("Final notification flush did not finish within {grace:?}");
        }
        self.performance.log_summary();

        let summary = self.opportunity_summary().await;
        info!(
            "Opportunities in memory: {} (crypto {}, products {}, domains {}), potential ${:.2}",
            summary.total,
            summary.crypto,
            summary.products,
            summary.domains,
            summary.total_potential_profit
        );

        self.performance
            .state(Utc::now())
            .save(&self.config.runtime.state_file)
            .await
    }
}

/// Whether an hourly summary is due and which day, if any, just finished.
fn report_schedule(previous: DateTime<Utc>, now: DateTime<Utc>) -> (bool, Option<NaiveDate>) {
    let day_changed = now.date_naive() != previous.date_naive();
    let hourly = day_changed || now.hour() != previous.hour();
    (hourly, day_changed.then(|| previous.date_naive()))
}

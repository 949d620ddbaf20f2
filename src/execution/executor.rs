use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::TradingConfig;
use crate::feeds::exchange::{CallGuard, ExchangeAdapter};
use crate::models::history::History;
use crate::models::order::{CloseReason, OrderSide, TradeOutcome};
use crate::models::position::{Position, PositionBook};
use crate::models::quote::{split_symbol, Quote};
use crate::models::signal::{Action, Signal};
use crate::risk::sizing::{RiskParams, Sizing, SizingError};

/// Requests the executor task accepts. Every command gets exactly one reply.
#[derive(Debug)]
pub enum ExecutionCommand {
    Buy {
        symbol: String,
        reply: oneshot::Sender<TradeOutcome>,
    },
    Sell {
        symbol: String,
        reason: CloseReason,
        reply: oneshot::Sender<TradeOutcome>,
    },
    Stats {
        reply: oneshot::Sender<ExecutorStats>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    pub outcome: TradeOutcome,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutorStats {
    pub open_positions: usize,
    pub exposure: Decimal,
    pub realized_pnl: Decimal,
    pub total_trades: u64,
    pub win_rate: f64,
    pub recent: Vec<TradeRecord>,
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub risk: RiskParams,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub max_positions: usize,
    pub quote_asset: String,
    pub log_capacity: usize,
}

impl ExecutorSettings {
    pub fn from_config(config: &TradingConfig) -> Self {
        Self {
            risk: RiskParams::from_config(config),
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
            max_positions: config.max_positions,
            quote_asset: config.quote_asset.clone(),
            log_capacity: config.performance_log_capacity,
        }
    }
}

/// Sole owner of the position book. Signal and stop-loss/take-profit loops talk
/// to it through an `ExecutorHandle`, so commands for one symbol are applied one
/// at a time and a position can only be closed once.
pub struct Executor {
    exchange: Arc<dyn ExchangeAdapter>,
    guard: CallGuard,
    settings: ExecutorSettings,
    book: PositionBook,
    log: History<TradeRecord>,
    positions_tx: watch::Sender<Vec<Position>>,
}

impl Executor {
    pub fn new(
        exchange: Arc<dyn ExchangeAdapter>,
        guard: CallGuard,
        settings: ExecutorSettings,
    ) -> (Self, watch::Receiver<Vec<Position>>) {
        let (positions_tx, positions_rx) = watch::channel(Vec::new());
        let log = History::new(settings.log_capacity);
        (
            Self {
                exchange,
                guard,
                settings,
                book: PositionBook::new(),
                log,
                positions_tx,
            },
            positions_rx,
        )
    }

    /// Start the executor task. It stops on shutdown or when every handle is dropped.
    pub fn spawn(
        exchange: Arc<dyn ExchangeAdapter>,
        guard: CallGuard,
        settings: ExecutorSettings,
        mut shutdown: broadcast::Receiver<()>,
    ) -> (ExecutorHandle, JoinHandle<()>) {
        let (mut executor, positions_rx) = Self::new(exchange, guard, settings);
        let (tx, mut rx) = mpsc::channel::<ExecutionCommand>(64);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = rx.recv() => match cmd {
                        Some(cmd) => executor.handle(cmd).await,
                        None => break,
                    },
                    _ = shutdown.recv() => {
                        info!("Executor shutting down with {} open positions", executor.book.len());
                        break;
                    }
                }
            }
        });

        (
            ExecutorHandle {
                tx,
                positions: positions_rx,
            },
            task,
        )
    }

    async fn handle(&mut self, cmd: ExecutionCommand) {
        match cmd {
            ExecutionCommand::Buy { symbol, reply } => {
                let outcome = self.open(&symbol).await;
                self.record(&outcome);
                let _ = reply.send(outcome);
            }
            ExecutionCommand::Sell {
                symbol,
                reason,
                reply,
            } => {
                let outcome = self.close(&symbol, reason).await;
                self.record(&outcome);
                let _ = reply.send(outcome);
            }
            ExecutionCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn record(&mut self, outcome: &TradeOutcome) {
        if outcome.is_fill() {
            self.log.push(TradeRecord {
                outcome: outcome.clone(),
                recorded_at: Utc::now(),
            });
            // send_replace never fails, even with no receivers left
            self.positions_tx.send_replace(self.book.snapshot());
        }
    }

    fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            open_positions: self.book.len(),
            exposure: self.book.total_exposure(),
            realized_pnl: self.book.realized_pnl,
            total_trades: self.book.total_trades,
            win_rate: self.book.win_rate(),
            recent: self.log.to_vec(),
        }
    }

    async fn mark_price(&self, symbol: &str) -> Result<Decimal, String> {
        let ticker = self
            .guard
            .run(self.exchange.fetch_ticker(symbol))
            .await
            .map_err(|e| format!("ticker {symbol}: {e}"))?;
        Quote::from_ticker(self.exchange.id(), ticker)
            .mark_price()
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| format!("no price for {symbol}"))
    }

    pub async fn open(&mut self, symbol: &str) -> TradeOutcome {
        if self.book.contains(symbol) {
            return TradeOutcome::AlreadyOpen {
                symbol: symbol.to_string(),
            };
        }
        if self.book.len() >= self.settings.max_positions {
            return TradeOutcome::MaxPositions {
                open: self.book.len(),
            };
        }
        if split_symbol(symbol).is_none() {
            return TradeOutcome::Error {
                message: format!("malformed symbol {symbol}"),
            };
        }

        let balance = match self
            .guard
            .run(self.exchange.fetch_free_balance(&self.settings.quote_asset))
            .await
        {
            Ok(b) => b,
            Err(e) => {
                error!("Balance fetch failed for {symbol}: {e}");
                return TradeOutcome::Error {
                    message: e.to_string(),
                };
            }
        };

        let price = match self.mark_price(symbol).await {
            Ok(p) => p,
            Err(message) => {
                error!("Cannot open {symbol}: {message}");
                return TradeOutcome::Error { message };
            }
        };

        let amount = match Sizing::order_amount(balance, price, &self.settings.risk) {
            Ok(a) => a,
            Err(SizingError::BalanceBelowMinimum { balance, .. }) => {
                warn!("Insufficient balance for {symbol}: {balance}");
                return TradeOutcome::InsufficientFunds { balance };
            }
            Err(e) => {
                return TradeOutcome::Error {
                    message: e.to_string(),
                }
            }
        };
        let amount = amount.round_dp(6);

        let ack = match self
            .guard
            .run(self.exchange.place_market_order(symbol, OrderSide::Buy, amount))
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                error!("Buy order failed for {symbol}: {e}");
                return TradeOutcome::Error {
                    message: e.to_string(),
                };
            }
        };

        let entry = ack.price.unwrap_or(price);
        let position = Position::open(
            symbol,
            entry,
            ack.amount,
            self.settings.stop_loss_pct,
            self.settings.take_profit_pct,
        );
        info!(
            "BUY {} {} @ {} (SL {} / TP {})",
            position.amount, symbol, entry, position.stop_loss_price, position.take_profit_price
        );
        self.book.insert(position);

        TradeOutcome::Opened {
            symbol: symbol.to_string(),
            amount: ack.amount,
            price: entry,
            order_id: ack.order_id,
        }
    }

    pub async fn close(&mut self, symbol: &str, reason: CloseReason) -> TradeOutcome {
        let Some(position) = self.book.get(symbol).cloned() else {
            return TradeOutcome::NoPosition {
                symbol: symbol.to_string(),
            };
        };

        let ack = match self
            .guard
            .run(
                self.exchange
                    .place_market_order(symbol, OrderSide::Sell, position.amount),
            )
            .await
        {
            Ok(ack) => ack,
            Err(e) => {
                error!("Sell order failed for {symbol}: {e}");
                return TradeOutcome::Error {
                    message: e.to_string(),
                };
            }
        };

        let exit = match ack.price {
            Some(p) => p,
            None => self.mark_price(symbol).await.unwrap_or(position.entry_price),
        };
        let profit_pct = position.return_pct(exit);
        let profit = match self.book.close(symbol, exit) {
            Some((_, pnl)) => pnl,
            None => position.realized_profit(exit),
        };

        info!(
            "SELL {} {} @ {} ({:?}) profit {} ({}%)",
            position.amount,
            symbol,
            exit,
            reason,
            profit.round_dp(2),
            profit_pct.round_dp(2)
        );

        TradeOutcome::Closed {
            symbol: symbol.to_string(),
            amount: position.amount,
            price: exit,
            profit,
            profit_pct,
            reason,
            order_id: ack.order_id,
        }
    }
}

/// Cloneable front end to the executor task.
#[derive(Clone)]
pub struct ExecutorHandle {
    tx: mpsc::Sender<ExecutionCommand>,
    positions: watch::Receiver<Vec<Position>>,
}

impl ExecutorHandle {
    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<TradeOutcome>) -> ExecutionCommand,
    ) -> TradeOutcome {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(build(reply)).await.is_err() {
            return TradeOutcome::Error {
                message: "executor stopped".into(),
            };
        }
        rx.await.unwrap_or_else(|_| TradeOutcome::Error {
            message: "executor dropped the request".into(),
        })
    }

    pub async fn buy(&self, symbol: &str) -> TradeOutcome {
        let symbol = symbol.to_string();
        self.request(|reply| ExecutionCommand::Buy { symbol, reply })
            .await
    }

    pub async fn sell(&self, symbol: &str, reason: CloseReason) -> TradeOutcome {
        let symbol = symbol.to_string();
        self.request(|reply| ExecutionCommand::Sell {
            symbol,
            reason,
            reply,
        })
        .await
    }

    /// Act on a scored signal. HOLD does nothing.
    pub async fn execute_signal(&self, signal: &Signal) -> TradeOutcome {
        match signal.action {
            Action::Buy => self.buy(&signal.symbol).await,
            Action::Sell => self.sell(&signal.symbol, CloseReason::Signal).await,
            Action::Hold => TradeOutcome::NoAction,
        }
    }

    pub async fn stats(&self) -> Option<ExecutorStats> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(ExecutionCommand::Stats { reply }).await.ok()?;
        rx.await.ok()
    }

    /// Latest published snapshot of open positions.
    pub fn positions(&self) -> Vec<Position> {
        self.positions.borrow().clone()
    }
}

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::models::candle::Candle;
use crate::models::order::{OrderAck, OrderSide};
use crate::models::quote::Ticker;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode {what}: {detail}")]
    Decode { what: &'static str, detail: String },

    #[error("{venue} credentials are not configured")]
    MissingCredentials { venue: String },

    #[error("{venue} does not support {operation}")]
    Unsupported {
        venue: String,
        operation: &'static str,
    },

    #[error("unknown symbol {0}")]
    UnknownSymbol(String),

    #[error("insufficient {asset} balance: need {needed}, have {available}")]
    InsufficientBalance {
        asset: String,
        needed: Decimal,
        available: Decimal,
    },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Rejected(String),
}

impl ExchangeError {
    pub fn decode(what: &'static str, detail: impl ToString) -> Self {
        ExchangeError::Decode {
            what,
            detail: detail.to_string(),
        }
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// A spot venue: market data plus the few private calls the bots need.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn id(&self) -> &str;

    async fn fetch_ticker(&self, symbol: &str) -> ExchangeResult<Ticker>;

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> ExchangeResult<Vec<Candle>>;

    async fn fetch_free_balance(&self, asset: &str) -> ExchangeResult<Decimal>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
    ) -> ExchangeResult<OrderAck>;

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
    ) -> ExchangeResult<OrderAck>;
}

/// Shared guard for outbound venue calls: bounded concurrency plus a deadline.
#[derive(Clone)]
pub struct CallGuard {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl CallGuard {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `fut` once a permit is free. The deadline covers the wait for the permit too.
    pub async fn run<T, F>(&self, fut: F) -> ExchangeResult<T>
    where
        F: std::future::Future<Output = ExchangeResult<T>>,
    {
        let guarded = async {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| ExchangeError::Rejected("call guard closed".into()))?;
            fut.await
        };
        match tokio::time::timeout(self.timeout, guarded).await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_times_out_slow_calls() {
        let guard = CallGuard::new(2, Duration::from_millis(20));
        let result: ExchangeResult<()> = guard
            .run(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ExchangeError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_guard_passes_result_through() {
        let guard = CallGuard::new(1, Duration::from_secs(1));
        let result = guard.run(async { Ok::<_, ExchangeError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}

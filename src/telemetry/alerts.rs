use crate::config::TelemetryConfig;
use crate::models::opportunity::{ArbitrageOpportunity, Opportunity};
use crate::models::order::TradeOutcome;
use crate::telemetry::performance::DailyReport;
use anyhow::{bail, Result};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Arbitrage alerts go out above this net percentage...
const ARBITRAGE_NOTIFY_PCT: f64 = 1.0;
/// ...and reach every channel above this one.
const ARBITRAGE_BROADCAST_PCT: f64 = 3.0;
const SMS_MAX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "ℹ️",
            Severity::Success => "✅",
            Severity::Warning => "⚠️",
            Severity::Error => "🚨",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Telegram,
    Discord,
    Email,
    Sms,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Telegram => "Telegram",
            Channel::Discord => "Discord",
            Channel::Email => "Email",
            Channel::Sms => "SMS",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Trade {
        symbol: String,
        profit: f64,
        profit_pct: f64,
        reason: String,
    },
    Arbitrage {
        kind: &'static str,
        net_profit_pct: f64,
        details: String,
    },
    Content {
        topic: String,
        platform: String,
        estimated_revenue: f64,
    },
    DailyReport(DailyReport),
    Alert {
        kind: String,
        message: String,
        severity: Severity,
    },
}

impl Notification {
    /// Only closed positions carry a realized profit worth reporting.
    pub fn from_trade(outcome: &TradeOutcome) -> Option<Self> {
        match outcome {
            TradeOutcome::Closed {
                symbol,
                profit,
                profit_pct,
                reason,
                ..
            } => Some(Notification::Trade {
                symbol: symbol.clone(),
                profit: profit.to_f64().unwrap_or(0.0),
                profit_pct: profit_pct.to_f64().unwrap_or(0.0),
                reason: format!("{reason:?}"),
            }),
            _ => None,
        }
    }

    pub fn from_arbitrage(opp: &ArbitrageOpportunity) -> Self {
        Notification::Arbitrage {
            kind: "crypto",
            net_profit_pct: opp.net_profit_pct.to_f64().unwrap_or(0.0),
            details: format!(
                "{}: buy {} @ {} / sell {} @ {}",
                opp.symbol, opp.buy_exchange, opp.buy_price, opp.sell_exchange, opp.sell_price
            ),
        }
    }

    pub fn from_opportunity(opp: &Opportunity) -> Self {
        match opp {
            Opportunity::Crypto(o) => Self::from_arbitrage(o),
            Opportunity::Product(_) => Notification::Arbitrage {
                kind: "product",
                net_profit_pct: opp.score_pct(),
                details: opp.label(),
            },
            Opportunity::Domain(_) => Notification::Arbitrage {
                kind: "domain",
                net_profit_pct: opp.score_pct(),
                details: opp.label(),
            },
        }
    }

    pub fn alert(kind: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Notification::Alert {
            kind: kind.into(),
            message: message.into(),
            severity,
        }
    }

    /// Channels this notification goes to. Empty means it is dropped.
    pub fn channels(&self, config: &TelemetryConfig) -> Vec<Channel> {
        use Channel::*;
        match self {
            Notification::Trade { profit, .. } => {
                if config.alert_on_trade && *profit > config.trade_profit_alert {
                    vec![Telegram, Discord]
                } else {
                    vec![]
                }
            }
            Notification::Arbitrage { net_profit_pct, .. } => {
                if *net_profit_pct > ARBITRAGE_BROADCAST_PCT {
                    vec![Telegram, Discord, Email]
                } else if *net_profit_pct > ARBITRAGE_NOTIFY_PCT {
                    vec![Telegram]
                } else {
                    vec![]
                }
            }
            Notification::Content { .. } => vec![Telegram],
            Notification::DailyReport(_) => vec![Telegram, Discord, Email],
            Notification::Alert { severity, .. } => match severity {
                Severity::Info | Severity::Success => vec![Telegram],
                Severity::Warning => vec![Telegram, Discord],
                Severity::Error if config.alert_on_error => vec![Telegram, Discord, Sms],
                Severity::Error => vec![Telegram],
            },
        }
    }

    pub fn render(&self) -> String {
        let now = Utc::now().format("%Y-%m-%d %H:%M");
        match self {
            Notification::Trade {
                symbol,
                profit,
                profit_pct,
                reason,
            } => format!(
                "🚀 TRADE EXECUTED\nSymbol: {symbol}\nAction: SELL ({reason})\nProfit: ${profit:.2}\nROI: {profit_pct:.2}%\nTime: {now}"
            ),
            Notification::Arbitrage {
                kind,
                net_profit_pct,
                details,
            } => format!(
                "💰 ARBITRAGE OPPORTUNITY\nType: {kind}\nProfit: {net_profit_pct:.2}%\nDetails: {details}"
            ),
            Notification::Content {
                topic,
                platform,
                estimated_revenue,
            } => format!(
                "📝 CONTENT PUBLISHED\nTopic: {topic}\nPlatform: {platform}\nEstimated Revenue: ${estimated_revenue:.2}"
            ),
            Notification::DailyReport(r) => format!(
                "📊 DAILY PROFIT REPORT - {}\n\n💰 Total Profit: ${:.2}\n📈 Trading: ${:.2}\n✍️ Content: ${:.2}\n💱 Arbitrage: ${:.2}\n\n🎯 Success Rate: {:.1}%\n📊 Total Trades: {}\n📝 Content Generated: {}\n🔍 Opportunities Found: {}\nBest Asset: {}",
                r.date,
                r.total_profit,
                r.trading_profit,
                r.content_profit,
                r.arbitrage_profit,
                r.success_rate,
                r.total_trades,
                r.content_count,
                r.opportunities,
                r.best_asset.as_deref().unwrap_or("N/A"),
            ),
            Notification::Alert {
                kind,
                message,
                severity,
            } => format!(
                "{} {}\n{message}\nTime: {now}",
                severity.emoji(),
                kind.to_uppercase()
            ),
        }
    }

    fn email_subject(&self) -> String {
        match self {
            Notification::DailyReport(r) => format!("Daily Report - ${:.2} Profit", r.total_profit),
            Notification::Arbitrage { .. } => "High-Value Arbitrage Opportunity".to_string(),
            _ => "autoprofit notification".to_string(),
        }
    }

    fn sms_text(&self) -> String {
        match self {
            Notification::Alert { kind, message, .. } => {
                let short: String = message.chars().take(SMS_MAX_CHARS).collect();
                format!("URGENT: {kind} - {short}")
            }
            other => other.render().chars().take(SMS_MAX_CHARS).collect(),
        }
    }
}

/// Cloneable producer side of the notification queue.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn send(&self, notification: Notification) {
        if let Err(e) = self.tx.try_send(notification) {
            warn!("Notification dropped: {e}");
        }
    }

    pub fn alert(&self, kind: impl Into<String>, message: impl Into<String>, severity: Severity) {
        self.send(Notification::alert(kind, message, severity));
    }
}

/// Delivers notifications to Telegram, Discord, Twilio SMS and the log.
pub struct AlertManager {
    config: TelemetryConfig,
    http: reqwest::Client,
}

impl AlertManager {
    pub fn new(config: TelemetryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;
        Ok(Self { config, http })
    }

    pub async fn dispatch(&self, notification: &Notification) {
        let channels = notification.channels(&self.config);
        if channels.is_empty() {
            debug!("Notification below threshold: {notification:?}");
            return;
        }

        let message = notification.render();
        for channel in channels {
            let result = match channel {
                Channel::Telegram => self.send_telegram(&message).await,
                Channel::Discord => self.send_discord(&message).await,
                Channel::Email => {
                    self.send_email(&notification.email_subject(), &message);
                    Ok(())
                }
                Channel::Sms => self.send_sms(&notification.sms_text()).await,
            };
            if let Err(e) = result {
                error!("{channel} notification error: {e}");
            }
        }
    }

    /// Deliver everything currently queued; returns how many were taken.
    pub async fn drain(&self, rx: &mut mpsc::Receiver<Notification>) -> usize {
        let mut count = 0;
        while let Ok(notification) = rx.try_recv() {
            self.dispatch(&notification).await;
            count += 1;
        }
        count
    }

    async fn send_telegram(&self, message: &str) -> Result<()> {
        info!("Telegram notification: {message}");
        let (Some(token), Some(chat_id)) =
            (&self.config.telegram_bot_token, &self.config.telegram_chat_id)
        else {
            return Ok(());
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": message,
        });
        let resp = self.http.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            bail!("HTTP {}", resp.status());
        }
        Ok(())
    }

    async fn send_discord(&self, message: &str) -> Result<()> {
        info!("Discord notification: {message}");
        let Some(webhook_url) = &self.config.discord_webhook_url else {
            return Ok(());
        };

        let body = serde_json::json!({ "content": message });
        let resp = self.http.post(webhook_url).json(&body).send().await?;
        if !resp.status().is_success() {
            bail!("HTTP {}", resp.status());
        }
        Ok(())
    }

    fn send_email(&self, subject: &str, body: &str) {
        let preview: String = body.chars().take(50).collect();
        info!(
            "Email notification to {}: {subject} - {preview}...",
            self.config.alert_email
        );
    }

    async fn send_sms(&self, message: &str) -> Result<()> {
        let to = self.config.alert_phone_number.as_deref().unwrap_or("unset");
        info!("SMS notification to {to}: {message}");
        let (Some(sid), Some(token), Some(from), Some(to)) = (
            &self.config.twilio_account_sid,
            &self.config.twilio_auth_token,
            &self.config.twilio_from_number,
            &self.config.alert_phone_number,
        ) else {
            return Ok(());
        };

        let url = format!("https://api.twilio.com/2010-04-01/Accounts/{sid}/Messages.json");
        let resp = self
            .http
            .post(&url)
            .basic_auth(sid, Some(token))
            .form(&[("To", to.as_str()), ("From", from.as_str()), ("Body", message)])
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("HTTP {}", resp.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::CloseReason;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn arbitrage(pct: f64) -> Notification {
        Notification::Arbitrage {
            kind: "crypto",
            net_profit_pct: pct,
            details: String::new(),
        }
    }

    fn closed(profit: rust_decimal::Decimal) -> TradeOutcome {
        TradeOutcome::Closed {
            symbol: "BTC/USDT".into(),
            amount: dec!(1),
            price: dec!(100),
            profit,
            profit_pct: dec!(5),
            reason: CloseReason::TakeProfit,
            order_id: "1".into(),
        }
    }

    #[test]
    fn test_severity_routing() {
        let config = TelemetryConfig::default();
        let route = |s| Notification::alert("x", "y", s).channels(&config);
        assert_eq!(route(Severity::Info), vec![Channel::Telegram]);
        assert_eq!(route(Severity::Success), vec![Channel::Telegram]);
        assert_eq!(route(Severity::Warning), vec![Channel::Telegram, Channel::Discord]);
        assert_eq!(
            route(Severity::Error),
            vec![Channel::Telegram, Channel::Discord, Channel::Sms]
        );
    }

    #[test]
    fn test_arbitrage_tiers() {
        let config = TelemetryConfig::default();
        assert!(arbitrage(0.8).channels(&config).is_empty());
        assert!(arbitrage(1.0).channels(&config).is_empty());
        assert_eq!(arbitrage(1.5).channels(&config), vec![Channel::Telegram]);
        assert_eq!(
            arbitrage(3.5).channels(&config),
            vec![Channel::Telegram, Channel::Discord, Channel::Email]
        );
    }

    #[test]
    fn test_trade_needs_profit_above_threshold() {
        let config = TelemetryConfig::default();
        let small = Notification::from_trade(&closed(dec!(50))).unwrap();
        assert!(small.channels(&config).is_empty());
        let big = Notification::from_trade(&closed(dec!(150))).unwrap();
        assert_eq!(big.channels(&config), vec![Channel::Telegram, Channel::Discord]);

        assert!(Notification::from_trade(&TradeOutcome::NoAction).is_none());
    }

    #[test]
    fn test_daily_report_goes_everywhere_but_sms() {
        let report = DailyReport {
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            total_profit: 12.5,
            trading_profit: 12.5,
            content_profit: 0.0,
            arbitrage_profit: 0.0,
            success_rate: 50.0,
            total_trades: 2,
            content_count: 0,
            opportunities: 3,
            best_asset: None,
        };
        let n = Notification::DailyReport(report);
        assert_eq!(
            n.channels(&TelemetryConfig::default()),
            vec![Channel::Telegram, Channel::Discord, Channel::Email]
        );
        assert_eq!(n.email_subject(), "Daily Report - $12.50 Profit");
        assert!(n.render().contains("Success Rate: 50.0%"));
    }

    #[test]
    fn test_sms_text_is_truncated() {
        let long = "e".repeat(250);
        let n = Notification::alert("Trading", long, Severity::Error);
        let sms = n.sms_text();
        assert!(sms.starts_with("URGENT: Trading - "));
        assert_eq!(sms.len(), "URGENT: Trading - ".len() + SMS_MAX_CHARS);
    }

    #[test]
    fn test_alert_render_uses_emoji() {
        let text = Notification::alert("System Startup", "ok", Severity::Success).render();
        assert!(text.starts_with("✅ SYSTEM STARTUP"));
    }

    #[tokio::test]
    async fn test_queue_drains_without_transports() {
        let (notifier, mut rx) = Notifier::channel(8);
        notifier.alert("Test", "one", Severity::Info);
        notifier.send(arbitrage(0.1));
        notifier.send(Notification::Content {
            topic: "t".into(),
            platform: "blog".into(),
            estimated_revenue: 10.0,
        });

        let manager = AlertManager::new(TelemetryConfig::default()).unwrap();
        assert_eq!(manager.drain(&mut rx).await, 3);
        assert_eq!(manager.drain(&mut rx).await, 0);
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let (notifier, mut rx) = Notifier::channel(1);
        notifier.alert("a", "1", Severity::Info);
        notifier.alert("b", "2", Severity::Info);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}

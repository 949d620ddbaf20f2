use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Best buy/sell venue pair for a symbol after fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub symbol: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub gross_profit_pct: Decimal,
    pub net_profit_pct: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// A completed two-leg arbitrage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedArbitrage {
    pub opportunity: ArbitrageOpportunity,
    pub amount: Decimal,
    pub profit: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// Supplier product resold on a marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductOpportunity {
    pub product: String,
    pub supplier: String,
    pub supplier_price: f64,
    pub marketplace: String,
    pub marketplace_price: f64,
    pub profit_margin_pct: f64,
    pub estimated_profit: f64,
    pub observed_at: DateTime<Utc>,
}

/// Unregistered domain worth more than its registration fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainOpportunity {
    pub domain: String,
    pub registration_cost: f64,
    pub estimated_value: f64,
    pub profit_potential: f64,
    pub roi_pct: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Opportunity {
    Crypto(ArbitrageOpportunity),
    Product(ProductOpportunity),
    Domain(DomainOpportunity),
}

impl Opportunity {
    /// Percentage used to rank opportunities of different kinds against each other.
    pub fn score_pct(&self) -> f64 {
        match self {
            Opportunity::Crypto(o) => o.net_profit_pct.to_f64().unwrap_or(0.0),
            Opportunity::Product(o) => o.profit_margin_pct,
            Opportunity::Domain(o) => o.roi_pct,
        }
    }

    /// Absolute profit estimate; crypto opportunities carry none until executed.
    pub fn potential_profit(&self) -> f64 {
        match self {
            Opportunity::Crypto(_) => 0.0,
            Opportunity::Product(o) => o.estimated_profit,
            Opportunity::Domain(o) => o.profit_potential,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Opportunity::Crypto(o) => {
                format!("{} {}->{}", o.symbol, o.buy_exchange, o.sell_exchange)
            }
            Opportunity::Product(o) => format!("{} {}->{}", o.product, o.supplier, o.marketplace),
            Opportunity::Domain(o) => o.domain.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpportunitySummary {
    pub total: usize,
    pub crypto: usize,
    pub products: usize,
    pub domains: usize,
    pub total_potential_profit: f64,
    pub best: Option<Opportunity>,
}

impl OpportunitySummary {
    pub fn summarize<'a>(opportunities: impl Iterator<Item = &'a Opportunity>) -> Self {
        let mut summary = Self::default();
        for op in opportunities {
            summary.total += 1;
            match op {
                Opportunity::Crypto(_) => summary.crypto += 1,
                Opportunity::Product(_) => summary.products += 1,
                Opportunity::Domain(_) => summary.domains += 1,
            }
            summary.total_potential_profit += op.potential_profit();

            let better = summary
                .best
                .as_ref()
                .map(|best| op.score_pct() > best.score_pct())
                .unwrap_or(true);
            if better {
                summary.best = Some(op.clone());
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn crypto(net: Decimal) -> Opportunity {
        Opportunity::Crypto(ArbitrageOpportunity {
            symbol: "BTC/USDT".into(),
            buy_exchange: "a".into(),
            sell_exchange: "b".into(),
            buy_price: dec!(100),
            sell_price: dec!(103),
            gross_profit_pct: net + dec!(0.2),
            net_profit_pct: net,
            observed_at: Utc::now(),
        })
    }

    #[test]
    fn test_summary_counts_and_best() {
        let ops = vec![
            crypto(dec!(2.8)),
            Opportunity::Product(ProductOpportunity {
                product: "LED Ring Light".into(),
                supplier: "dhgate".into(),
                supplier_price: 18.75,
                marketplace: "ebay".into(),
                marketplace_price: 40.0,
                profit_margin_pct: 113.3,
                estimated_profit: 21.25,
                observed_at: Utc::now(),
            }),
        ];
        let summary = OpportunitySummary::summarize(ops.iter());
        assert_eq!(summary.total, 2);
        assert_eq!(summary.crypto, 1);
        assert_eq!(summary.products, 1);
        assert!((summary.total_potential_profit - 21.25).abs() < 1e-9);
        assert!(matches!(summary.best, Some(Opportunity::Product(_))));
    }

    #[test]
    fn test_empty_summary() {
        let summary = OpportunitySummary::summarize(std::iter::empty());
        assert_eq!(summary.total, 0);
        assert!(summary.best.is_none());
    }
}

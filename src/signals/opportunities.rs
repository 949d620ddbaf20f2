use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use crate::models::opportunity::{DomainOpportunity, ProductOpportunity};

#[derive(Debug, Clone, PartialEq)]
pub struct SupplierProduct {
    pub title: String,
    pub supplier: String,
    pub price: f64,
}

impl SupplierProduct {
    fn new(title: &str, supplier: &str, price: f64) -> Self {
        Self {
            title: title.into(),
            supplier: supplier.into(),
            price,
        }
    }
}

/// Marketplace name with the range its price can sit in relative to the base price.
const MARKETPLACES: [(&str, f64, f64); 3] = [
    ("amazon", 0.9, 1.3),
    ("ebay", 0.85, 1.25),
    ("shopify", 0.95, 1.35),
];

/// Supplier catalogue vs. marketplace resale prices.
///
/// Marketplace prices are sampled from the supplied RNG: a base of 30..100
/// scaled by a per-marketplace factor.
pub struct ProductScanner {
    catalogue: Vec<SupplierProduct>,
    min_margin_pct: f64,
}

impl Default for ProductScanner {
    fn default() -> Self {
        Self {
            catalogue: vec![
                SupplierProduct::new("Wireless Earbuds Pro", "aliexpress", 15.99),
                SupplierProduct::new("Smart Watch Fitness Tracker", "alibaba", 25.50),
                SupplierProduct::new("LED Ring Light", "dhgate", 18.75),
                SupplierProduct::new("Phone Camera Lens Kit", "aliexpress", 12.99),
                SupplierProduct::new("Portable Power Bank 20000mAh", "alibaba", 22.00),
            ],
            min_margin_pct: 30.0,
        }
    }
}

impl ProductScanner {
    pub fn new(catalogue: Vec<SupplierProduct>, min_margin_pct: f64) -> Self {
        Self {
            catalogue,
            min_margin_pct,
        }
    }

    pub fn margin_pct(supplier_price: f64, marketplace_price: f64) -> f64 {
        if supplier_price <= 0.0 {
            return 0.0;
        }
        (marketplace_price - supplier_price) / supplier_price * 100.0
    }

    /// An opportunity if reselling at `marketplace_price` clears the minimum margin.
    pub fn evaluate(
        &self,
        product: &SupplierProduct,
        marketplace: &str,
        marketplace_price: f64,
    ) -> Option<ProductOpportunity> {
        let margin = Self::margin_pct(product.price, marketplace_price);
        if margin <= self.min_margin_pct {
            return None;
        }
        Some(ProductOpportunity {
            product: product.title.clone(),
            supplier: product.supplier.clone(),
            supplier_price: product.price,
            marketplace: marketplace.to_string(),
            marketplace_price,
            profit_margin_pct: margin,
            estimated_profit: marketplace_price - product.price,
            observed_at: Utc::now(),
        })
    }

    pub fn scan<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<ProductOpportunity> {
        let mut found = Vec::new();
        for product in &self.catalogue {
            let base = rng.gen_range(30.0..100.0);
            for (marketplace, lo, hi) in MARKETPLACES {
                let price = base * rng.gen_range(lo..hi);
                if let Some(op) = self.evaluate(product, marketplace, price) {
                    info!(
                        "Dropshipping opportunity: {} - buy at ${:.2}, sell at ${:.2} on {} ({:.1}% margin)",
                        op.product, op.supplier_price, op.marketplace_price, op.marketplace, op.profit_margin_pct
                    );
                    found.push(op);
                }
            }
        }
        found
    }
}

const DOMAIN_KEYWORDS: [&str; 8] = ["ai", "crypto", "nft", "meta", "quantum", "bio", "green", "solar"];
const DOMAIN_TLDS: [&str; 5] = [".com", ".io", ".ai", ".app", ".dev"];
const DOMAIN_SUFFIXES: [&str; 4] = ["tech", "pro", "hub", "zone"];
const PREMIUM_KEYWORDS: [&str; 3] = ["ai", "crypto", "nft"];

pub const DOMAIN_REGISTRATION_COST: f64 = 12.99;

/// Generates keyword domains and reports the ones worth more than a threshold.
pub struct DomainScanner {
    availability_rate: f64,
    min_value: f64,
}

impl Default for DomainScanner {
    fn default() -> Self {
        Self {
            availability_rate: 0.2,
            min_value: 100.0,
        }
    }
}

impl DomainScanner {
    pub fn new(availability_rate: f64, min_value: f64) -> Self {
        Self {
            availability_rate,
            min_value,
        }
    }

    /// Base 50, x3 for a premium keyword anywhere in the domain, x1.5 when the
    /// name before the TLD is under 10 chars, x2 for .ai/.io, then the market factor.
    pub fn estimate_value(domain: &str, market_factor: f64) -> f64 {
        let mut value = 50.0;
        if PREMIUM_KEYWORDS.iter().any(|kw| domain.contains(kw)) {
            value *= 3.0;
        }
        let name = domain.split('.').next().unwrap_or(domain);
        if name.chars().count() < 10 {
            value *= 1.5;
        }
        if domain.ends_with(".ai") || domain.ends_with(".io") {
            value *= 2.0;
        }
        value *= market_factor;
        (value * 100.0).round() / 100.0
    }

    pub fn evaluate(&self, domain: &str, estimated_value: f64) -> Option<DomainOpportunity> {
        if estimated_value <= self.min_value {
            return None;
        }
        let profit = estimated_value - DOMAIN_REGISTRATION_COST;
        Some(DomainOpportunity {
            domain: domain.to_string(),
            registration_cost: DOMAIN_REGISTRATION_COST,
            estimated_value,
            profit_potential: profit,
            roi_pct: profit / DOMAIN_REGISTRATION_COST * 100.0,
            observed_at: Utc::now(),
        })
    }

    pub fn scan<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<DomainOpportunity> {
        let mut found = Vec::new();
        for keyword in DOMAIN_KEYWORDS {
            for tld in DOMAIN_TLDS {
                let suffix = DOMAIN_SUFFIXES.choose(rng).copied().unwrap_or("tech");
                let domain = format!("{keyword}-{suffix}{tld}");

                if rng.gen::<f64>() >= self.availability_rate {
                    continue;
                }

                let value = Self::estimate_value(&domain, rng.gen_range(0.5..2.0));
                if let Some(op) = self.evaluate(&domain, value) {
                    info!(
                        "Domain opportunity: {} - estimated ${:.2} (ROI {:.1}%)",
                        op.domain, op.estimated_value, op.roi_pct
                    );
                    found.push(op);
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_product_margin_threshold() {
        let scanner = ProductScanner::default();
        let product = SupplierProduct::new("LED Ring Light", "dhgate", 20.0);
        assert!(scanner.evaluate(&product, "ebay", 26.0).is_none()); // exactly 30%
        let op = scanner.evaluate(&product, "ebay", 30.0).unwrap();
        assert!((op.profit_margin_pct - 50.0).abs() < 0.001);
        assert!((op.estimated_profit - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_product_scan_only_reports_margins_above_minimum() {
        let mut rng = StdRng::seed_from_u64(7);
        let ops = ProductScanner::default().scan(&mut rng);
        assert!(ops.iter().all(|op| op.profit_margin_pct > 30.0));
        // cheapest supplier price is 12.99 and marketplace prices start near 25
        assert!(!ops.is_empty());
    }

    #[test]
    fn test_domain_value_factors() {
        // premium, short, premium tld: 50 * 3 * 1.5 * 2
        assert!((DomainScanner::estimate_value("ai-pro.ai", 1.0) - 450.0).abs() < 0.001);
        // no premium keyword, long name, .com
        assert!((DomainScanner::estimate_value("quantum-zone.com", 1.0) - 50.0).abs() < 0.001);
        // short name only
        assert!((DomainScanner::estimate_value("bio-hub.dev", 2.0) - 150.0).abs() < 0.001);
    }

    #[test]
    fn test_domain_roi() {
        let op = DomainScanner::default().evaluate("nft-hub.io", 200.0).unwrap();
        assert!((op.profit_potential - 187.01).abs() < 0.001);
        assert!(DomainScanner::default().evaluate("x.com", 100.0).is_none());
    }

    #[test]
    fn test_domain_scan_everything_available() {
        let scanner = DomainScanner::new(1.0, 100.0);
        let mut rng = StdRng::seed_from_u64(1);
        let ops = scanner.scan(&mut rng);
        assert!(ops.iter().all(|op| op.estimated_value > 100.0));
        // every .ai domain is worth at least 50 * 3 * 2 * 0.5 = 150
        assert!(ops.iter().filter(|op| op.domain.ends_with(".ai")).count() == DOMAIN_KEYWORDS.len());
    }
}

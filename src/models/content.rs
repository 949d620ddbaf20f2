use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Competition {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Stable,
    Declining,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingTopic {
    pub topic: String,
    pub search_volume: u32,
    pub competition: Competition,
    pub cpc: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Instagram,
    Tiktok,
    Linkedin,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Twitter,
        Platform::Instagram,
        Platform::Tiktok,
        Platform::Linkedin,
    ];
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Twitter => "Twitter",
            Platform::Instagram => "Instagram",
            Platform::Tiktok => "TikTok",
            Platform::Linkedin => "LinkedIn",
        };
        f.write_str(s)
    }
}

/// One LLM deliverable. Replies that are not valid JSON are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "body", rename_all = "snake_case")]
pub enum GeneratedContent {
    Json(serde_json::Value),
    Text(String),
    Failed(String),
}

impl GeneratedContent {
    /// Parse a model reply, tolerating a fenced ```json block around it.
    pub fn from_reply(reply: &str) -> Self {
        let trimmed = reply.trim();
        let body = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|s| s.strip_suffix("```"))
            .map(str::trim)
            .unwrap_or(trimmed);
        match serde_json::from_str(body) {
            Ok(value) => GeneratedContent::Json(value),
            Err(_) => GeneratedContent::Text(reply.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, GeneratedContent::Failed(_))
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Monthly earnings estimate for a written piece.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonetizationEstimate {
    pub estimated_traffic: u32,
    pub conversion_rate: f64,
    pub average_commission: f64,
    pub ad_revenue_per_1000: f64,
    pub monthly_affiliate_revenue: f64,
    pub monthly_ad_revenue: f64,
    pub total_monthly_potential: f64,
}

impl MonetizationEstimate {
    pub fn from_metrics(
        estimated_traffic: u32,
        conversion_rate: f64,
        average_commission: f64,
        ad_revenue_per_1000: f64,
    ) -> Self {
        let traffic = estimated_traffic as f64;
        let affiliate = traffic * conversion_rate * average_commission;
        let ads = traffic / 1000.0 * ad_revenue_per_1000;
        Self {
            estimated_traffic,
            conversion_rate,
            average_commission,
            ad_revenue_per_1000,
            monthly_affiliate_revenue: round2(affiliate),
            monthly_ad_revenue: round2(ads),
            total_monthly_potential: round2(affiliate + ads),
        }
    }
}

pub const VIDEO_AFFILIATE_CONVERSION: f64 = 0.02;
pub const VIDEO_AFFILIATE_COMMISSION: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoRevenue {
    pub estimated_views: u32,
    pub cpm: f64,
    pub ad_revenue: f64,
    pub affiliate_revenue: f64,
    pub total_revenue: f64,
}

impl VideoRevenue {
    pub fn from_views(estimated_views: u32, cpm: f64) -> Self {
        let views = estimated_views as f64;
        let ads = views / 1000.0 * cpm;
        let affiliate = views * VIDEO_AFFILIATE_CONVERSION * VIDEO_AFFILIATE_COMMISSION;
        Self {
            estimated_views,
            cpm,
            ad_revenue: round2(ads),
            affiliate_revenue: round2(affiliate),
            total_revenue: round2(ads + affiliate),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPackage {
    pub id: String,
    pub topic: TrendingTopic,
    pub keywords: Vec<String>,
    pub blog_post: GeneratedContent,
    pub video_script: GeneratedContent,
    pub video_revenue: VideoRevenue,
    pub social_campaign: BTreeMap<Platform, GeneratedContent>,
    pub email_sequence: GeneratedContent,
    pub monetization: MonetizationEstimate,
    pub generated_at: DateTime<Utc>,
}

impl ContentPackage {
    /// Pieces that came back unusable.
    pub fn failed_pieces(&self) -> usize {
        [&self.blog_post, &self.video_script, &self.email_sequence]
            .into_iter()
            .chain(self.social_campaign.values())
            .filter(|c| c.is_failed())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monetization_estimate() {
        let est = MonetizationEstimate::from_metrics(10_000, 0.02, 50.0, 5.0);
        assert!((est.monthly_affiliate_revenue - 10_000.0).abs() < 0.001);
        assert!((est.monthly_ad_revenue - 50.0).abs() < 0.001);
        assert!((est.total_monthly_potential - 10_050.0).abs() < 0.001);
    }

    #[test]
    fn test_video_revenue() {
        let rev = VideoRevenue::from_views(2_000, 3.0);
        assert!((rev.ad_revenue - 6.0).abs() < 0.001);
        assert!((rev.affiliate_revenue - 2_000.0).abs() < 0.001);
        assert!((rev.total_revenue - 2_006.0).abs() < 0.001);
    }

    #[test]
    fn test_reply_parsing() {
        assert!(matches!(
            GeneratedContent::from_reply(r#"{"title": "x"}"#),
            GeneratedContent::Json(_)
        ));
        assert!(matches!(
            GeneratedContent::from_reply("```json\n[\"a\", \"b\"]\n```"),
            GeneratedContent::Json(serde_json::Value::Array(_))
        ));
        assert_eq!(
            GeneratedContent::from_reply("Sure! Here you go"),
            GeneratedContent::Text("Sure! Here you go".into())
        );
    }
}

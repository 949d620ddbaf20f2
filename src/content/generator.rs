use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

use super::llm::{ChatRequest, LlmClient};
use crate::config::ContentConfig;
use crate::models::content::{
    Competition, ContentPackage, GeneratedContent, MonetizationEstimate, Platform, Trend,
    TrendingTopic, VideoRevenue,
};

const VIRAL_KEYWORDS: [&str; 4] = ["ai", "crypto", "money", "passive income"];

/// Researches topics and turns the best ones into multi-platform content packages.
pub struct ContentGenerator {
    llm: Arc<dyn LlmClient>,
    chat_model: String,
    long_form_model: String,
    topics: Vec<String>,
    topics_per_batch: usize,
    rng: Mutex<StdRng>,
}

impl ContentGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, config: &ContentConfig) -> Self {
        Self::with_rng(llm, config, StdRng::from_entropy())
    }

    pub fn with_rng(llm: Arc<dyn LlmClient>, config: &ContentConfig, rng: StdRng) -> Self {
        Self {
            llm,
            chat_model: config.chat_model.clone(),
            long_form_model: config.long_form_model.clone(),
            topics: config.topics.clone(),
            topics_per_batch: config.topics_per_batch,
            rng: Mutex::new(rng),
        }
    }

    fn sample<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }

    /// Topic metrics are simulated; sorted by search volume, highest first.
    pub fn research_trending_topics(&self) -> Vec<TrendingTopic> {
        let mut topics: Vec<TrendingTopic> = self.sample(|rng| {
            self.topics
                .iter()
                .map(|topic| TrendingTopic {
                    topic: topic.clone(),
                    search_volume: rng.gen_range(10_000..100_000),
                    competition: *[Competition::Low, Competition::Medium, Competition::High]
                        .choose(rng)
                        .unwrap_or(&Competition::Medium),
                    cpc: (rng.gen_range(0.5..5.0_f64) * 100.0).round() / 100.0,
                    trend: *[Trend::Rising, Trend::Stable, Trend::Declining]
                        .choose(rng)
                        .unwrap_or(&Trend::Stable),
                })
                .collect()
        });
        topics.sort_by(|a, b| b.search_volume.cmp(&a.search_volume));
        topics
    }

    pub fn estimate_monetization(&self) -> MonetizationEstimate {
        self.sample(|rng| {
            MonetizationEstimate::from_metrics(
                rng.gen_range(1_000..50_000),
                rng.gen_range(0.01..0.05),
                rng.gen_range(10.0..100.0),
                rng.gen_range(1.0..10.0),
            )
        })
    }

    /// Views double for topics that tend to go viral.
    pub fn estimate_video(&self, topic: &str) -> VideoRevenue {
        let lower = topic.to_lowercase();
        let viral = VIRAL_KEYWORDS.iter().any(|kw| lower.contains(kw));
        self.sample(|rng| {
            let mut views: u32 = rng.gen_range(1_000..100_000);
            if viral {
                views *= 2;
            }
            VideoRevenue::from_views(views, rng.gen_range(1.0..5.0))
        })
    }

    async fn ask(
        &self,
        long_form: bool,
        system: &str,
        user: String,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> anyhow::Result<String> {
        let model = if long_form {
            &self.long_form_model
        } else {
            &self.chat_model
        };
        self.llm
            .chat(ChatRequest {
                model: model.clone(),
                system: system.to_string(),
                user,
                temperature,
                max_tokens,
            })
            .await
    }

    async fn piece(
        &self,
        what: &str,
        long_form: bool,
        system: &str,
        user: String,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> GeneratedContent {
        match self.ask(long_form, system, user, temperature, max_tokens).await {
            Ok(reply) => GeneratedContent::from_reply(&reply),
            Err(e) => {
                error!("Error generating {what}: {e}");
                GeneratedContent::Failed(e.to_string())
            }
        }
    }

    /// SEO keywords from the model, or a fixed fallback list on any failure.
    pub async fn generate_seo_keywords(&self, topic: &str) -> Vec<String> {
        let prompt = format!(
            "Generate 20 high-value SEO keywords for the topic: {topic}\n\
             Include long-tail keywords, commercial intent keywords, question-based keywords \
             and location-based variations if applicable.\n\
             Format: Return as a JSON list of keywords."
        );
        let parsed = self
            .ask(false, "You are an SEO expert.", prompt, 0.7, None)
            .await
            .and_then(|reply| match GeneratedContent::from_reply(&reply) {
                GeneratedContent::Json(v) => Ok(serde_json::from_value::<Vec<String>>(v)?),
                _ => anyhow::bail!("keyword reply was not a JSON list"),
            });
        match parsed {
            Ok(keywords) if !keywords.is_empty() => keywords,
            Ok(_) => fallback_keywords(topic),
            Err(e) => {
                error!("Error generating keywords: {e}");
                fallback_keywords(topic)
            }
        }
    }

    pub async fn generate_blog_post(&self, topic: &str, keywords: &[String]) -> GeneratedContent {
        let keyword_list = keywords.iter().take(10).cloned().collect::<Vec<_>>().join(", ");
        let prompt = format!(
            "Create a comprehensive, SEO-optimized blog post about: {topic}\n\n\
             Requirements:\n\
             - Word count: approximately 1500 words\n\
             - Include these keywords naturally: {keyword_list}\n\
             - Structure: Introduction, 5-7 main sections with H2 headers, conclusion\n\
             - Include actionable tips and strategies\n\
             - Add placeholders for affiliate links: [AFFILIATE_LINK_1], [AFFILIATE_LINK_2], etc.\n\
             - Add a compelling meta description and a click-worthy title\n\n\
             Format the response as JSON with: title, meta_description, content, categories, tags"
        );
        self.piece(
            "blog post",
            true,
            "You are an expert content writer focused on creating valuable, monetizable content.",
            prompt,
            0.8,
            Some(3000),
        )
        .await
    }

    pub async fn generate_video_script(&self, topic: &str) -> GeneratedContent {
        let prompt = format!(
            "Create a YouTube video script about: {topic}\n\n\
             Video Duration: 10 minutes\n\
             Structure: hook (0-15s), introduction (15-30s), main content in clear sections, \
             calls to action, conclusion.\n\
             Include timestamps, B-roll suggestions, engagement prompts, natural affiliate \
             mentions, an SEO title and description, 10 tags and thumbnail text.\n\n\
             Format as JSON with all elements."
        );
        self.piece(
            "video script",
            false,
            "You are a YouTube content strategist specializing in profitable content.",
            prompt,
            0.8,
            None,
        )
        .await
    }

    async fn generate_platform_posts(&self, platform: Platform, product: &str) -> GeneratedContent {
        let (system, prompt, temperature) = match platform {
            Platform::Twitter => (
                "You are a social media marketing expert.",
                format!(
                    "Create 10 engaging tweets promoting {product} with affiliate marketing in mind.\n\
                     Each tweet must be under 280 characters, include hashtags and a call-to-action, \
                     and vary in style.\n\
                     Format as JSON list with: text, hashtags, post_time_suggestion, engagement_hook"
                ),
                0.9,
            ),
            Platform::Instagram => (
                "You are an Instagram marketing strategist.",
                format!(
                    "Create 5 Instagram post ideas for promoting {product}.\n\
                     Each post: caption with emojis, 30 hashtags, image concept, story ideas, \
                     reel concept, best posting time.\n\
                     Format as JSON list."
                ),
                0.8,
            ),
            Platform::Tiktok => (
                "You are a TikTok content strategist specializing in viral content.",
                format!(
                    "Create 5 TikTok video ideas for promoting {product} that could go viral.\n\
                     Each idea: hook, script outline, trending sounds, hashtags, effects, \
                     duration (15s, 30s or 60s), call-to-action.\n\
                     Format as JSON list."
                ),
                0.9,
            ),
            Platform::Linkedin => (
                "You are a LinkedIn B2B marketing expert.",
                format!(
                    "Create 3 LinkedIn posts for promoting {product} to professionals and businesses.\n\
                     Each post is 1300-2000 characters with industry insight, subtle product \
                     placement and a clear call-to-action.\n\
                     Format as JSON list with: content, headline, hashtags, best_posting_time"
                ),
                0.7,
            ),
        };
        self.piece(&format!("{platform} posts"), false, system, prompt, temperature, None)
            .await
    }

    pub async fn generate_social_campaign(&self, product: &str) -> BTreeMap<Platform, GeneratedContent> {
        let (twitter, instagram, tiktok, linkedin) = tokio::join!(
            self.generate_platform_posts(Platform::Twitter, product),
            self.generate_platform_posts(Platform::Instagram, product),
            self.generate_platform_posts(Platform::Tiktok, product),
            self.generate_platform_posts(Platform::Linkedin, product),
        );
        BTreeMap::from([
            (Platform::Twitter, twitter),
            (Platform::Instagram, instagram),
            (Platform::Tiktok, tiktok),
            (Platform::Linkedin, linkedin),
        ])
    }

    pub async fn generate_email_sequence(&self, product: &str) -> GeneratedContent {
        let prompt = format!(
            "Create a 7-email marketing sequence for {product}.\n\
             Sequence: welcome, problem identification, solution, social proof, feature \
             deep-dive, limited time offer, final call-to-action.\n\
             Each email: subject line with A/B variant, preview text, HTML-ready body, \
             call-to-action buttons, PS section.\n\
             Format as JSON list."
        );
        self.piece(
            "email sequence",
            true,
            "You are an email marketing expert specializing in conversion optimization.",
            prompt,
            0.7,
            None,
        )
        .await
    }

    pub async fn generate_package(&self, topic: TrendingTopic) -> ContentPackage {
        let keywords = self.generate_seo_keywords(&topic.topic).await;
        let (blog_post, video_script, social_campaign, email_sequence) = tokio::join!(
            self.generate_blog_post(&topic.topic, &keywords),
            self.generate_video_script(&topic.topic),
            self.generate_social_campaign(&topic.topic),
            self.generate_email_sequence(&topic.topic),
        );
        let video_revenue = self.estimate_video(&topic.topic);
        let monetization = self.estimate_monetization();

        let package = ContentPackage {
            id: uuid::Uuid::new_v4().to_string(),
            topic,
            keywords,
            blog_post,
            video_script,
            video_revenue,
            social_campaign,
            email_sequence,
            monetization,
            generated_at: Utc::now(),
        };
        info!(
            "Generated content package for: {} (monetization potential ${:.2}/month)",
            package.topic.topic, package.monetization.total_monthly_potential
        );
        package
    }

    /// One pipeline pass: research, then build packages for the top topics.
    pub async fn generate_batch(&self) -> Vec<ContentPackage> {
        let topics = self.research_trending_topics();
        let mut packages = Vec::with_capacity(self.topics_per_batch);
        for topic in topics.into_iter().take(self.topics_per_batch) {
            packages.push(self.generate_package(topic).await);
        }
        packages
    }
}

fn fallback_keywords(topic: &str) -> Vec<String> {
    vec![
        topic.to_string(),
        format!("best {topic}"),
        format!("how to {topic}"),
        format!("{topic} guide"),
        format!("{topic} tips"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers keyword prompts with a JSON list and everything else with prose.
    struct ScriptedLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat(&self, request: ChatRequest) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.system.contains("SEO") {
                Ok(r#"["ai tools", "best ai tools"]"#.to_string())
            } else if request.system.contains("email") {
                Ok("Here are your emails".to_string())
            } else {
                Ok(r#"{"title": "generated"}"#.to_string())
            }
        }
    }

    struct DownLlm;

    #[async_trait]
    impl LlmClient for DownLlm {
        async fn chat(&self, _request: ChatRequest) -> anyhow::Result<String> {
            anyhow::bail!("service unavailable")
        }
    }

    fn generator(llm: Arc<dyn LlmClient>) -> ContentGenerator {
        ContentGenerator::with_rng(llm, &ContentConfig::default(), StdRng::seed_from_u64(42))
    }

    #[test]
    fn test_topics_sorted_by_volume() {
        let topics = generator(Arc::new(DownLlm)).research_trending_topics();
        assert_eq!(topics.len(), ContentConfig::default().topics.len());
        assert!(topics.windows(2).all(|w| w[0].search_volume >= w[1].search_volume));
        assert!(topics.iter().all(|t| (10_000..100_000).contains(&t.search_volume)));
    }

    #[test]
    fn test_video_estimate_ranges() {
        let gen = generator(Arc::new(DownLlm));
        let plain = gen.estimate_video("online course creation");
        assert!((1_000..100_000).contains(&plain.estimated_views));
        let viral = gen.estimate_video("AI tools for business");
        assert!((2_000..200_000).contains(&viral.estimated_views));
    }

    #[tokio::test]
    async fn test_keyword_fallback_on_failure() {
        let keywords = generator(Arc::new(DownLlm)).generate_seo_keywords("dropshipping").await;
        assert_eq!(keywords[0], "dropshipping");
        assert_eq!(keywords[1], "best dropshipping");
        assert_eq!(keywords.len(), 5);
    }

    #[tokio::test]
    async fn test_batch_builds_top_three_packages() {
        let llm = Arc::new(ScriptedLlm {
            calls: AtomicUsize::new(0),
        });
        let packages = generator(llm.clone()).generate_batch().await;
        assert_eq!(packages.len(), 3);

        let first = &packages[0];
        assert_eq!(first.keywords, vec!["ai tools".to_string(), "best ai tools".to_string()]);
        assert!(matches!(first.blog_post, GeneratedContent::Json(_)));
        // non-JSON replies are kept verbatim
        assert_eq!(
            first.email_sequence,
            GeneratedContent::Text("Here are your emails".into())
        );
        assert_eq!(first.social_campaign.len(), 4);
        assert_eq!(first.failed_pieces(), 0);
        // keywords + blog + video + 4 social + email per package
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3 * 8);
    }

    #[tokio::test]
    async fn test_failed_pieces_are_recorded() {
        let topic = generator(Arc::new(DownLlm)).research_trending_topics().remove(0);
        let package = generator(Arc::new(DownLlm)).generate_package(topic).await;
        assert_eq!(package.failed_pieces(), 7);
        assert!(package.monetization.total_monthly_potential > 0.0);
    }
}

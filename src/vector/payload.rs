//! Versioned point payload
//!
//! The flattened document stored next to each vector. Timestamps are unix
//! seconds so range filters stay numeric.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::models::AnalyticsPost;
use crate::models::Engagement;
use crate::KnowRagError;
use crate::Result;

/// Current payload layout
pub const PAYLOAD_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectPayload {
    pub aspect: String,
    pub aspect_display_name: String,
    pub sentiment: String,
    pub sentiment_score: f64,
    pub keywords: Vec<String>,
    pub impact_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadMetadata {
    pub author: String,
    pub author_display_name: String,
    pub author_followers: i64,
    pub engagement: Engagement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    pub schema_version: u32,
    pub analytics_id: String,
    pub project_id: String,
    pub source_id: String,
    pub content: String,
    pub content_created_at: i64,
    pub ingested_at: i64,
    pub platform: String,
    pub overall_sentiment: String,
    pub overall_sentiment_score: f64,
    pub sentiment_confidence: f64,
    pub keywords: Vec<String>,
    pub risk_level: String,
    pub risk_score: f64,
    pub requires_attention: bool,
    pub engagement_score: f64,
    pub virality_score: f64,
    pub influence_score: f64,
    pub reach_estimate: i64,
    pub content_quality_score: f64,
    pub is_spam: bool,
    pub is_bot: bool,
    pub language: String,
    pub toxicity_score: f64,
    pub aspects: Vec<AspectPayload>,
    pub metadata: PayloadMetadata,
}

impl PointPayload {
    /// Flatten a post, keeping at most `max_content_chars` characters of content
    pub fn from_post(post: &AnalyticsPost, max_content_chars: usize) -> Self {
        Self {
            schema_version: PAYLOAD_SCHEMA_VERSION,
            analytics_id: post.id.clone(),
            project_id: post.project_id.clone(),
            source_id: post.source_id.clone(),
            content: truncate_chars(&post.content, max_content_chars),
            content_created_at: post.content_created_at.timestamp(),
            ingested_at: post.ingested_at.timestamp(),
            platform: post.platform.clone(),
            overall_sentiment: post.overall_sentiment.clone(),
            overall_sentiment_score: post.overall_sentiment_score,
            sentiment_confidence: post.sentiment_confidence,
            keywords: post.keywords.clone(),
            risk_level: post.risk_level.clone(),
            risk_score: post.risk_score,
            requires_attention: post.requires_attention,
            engagement_score: post.engagement_score,
            virality_score: post.virality_score,
            influence_score: post.influence_score,
            reach_estimate: post.reach_estimate,
            content_quality_score: post.content_quality_score,
            is_spam: post.is_spam,
            is_bot: post.is_bot,
            language: post.language.clone(),
            toxicity_score: post.toxicity_score,
            aspects: post
                .aspects
                .iter()
                .map(|a| AspectPayload {
                    aspect: a.aspect.clone(),
                    aspect_display_name: a.aspect_display_name.clone(),
                    sentiment: a.sentiment.clone(),
                    sentiment_score: a.sentiment_score,
                    keywords: a.keywords.clone(),
                    impact_score: a.impact_score,
                })
                .collect(),
            metadata: PayloadMetadata {
                author: post.uap_metadata.author.clone(),
                author_display_name: post.uap_metadata.author_display_name.clone(),
                author_followers: post.uap_metadata.author_followers,
                engagement: post.uap_metadata.engagement.clone(),
                video_url: post.uap_metadata.video_url.clone(),
                hashtags: post.uap_metadata.hashtags.clone(),
                location: post.uap_metadata.location.clone(),
            },
        }
    }

    pub fn encode(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode a stored payload, rejecting layouts newer than this build knows
    pub fn decode(value: Value) -> Result<Self> {
        let version = value
            .get("schema_version")
            .and_then(Value::as_u64)
            .ok_or_else(|| KnowRagError::VectorStore("payload has no schema_version".to_string()))?;
        if version > u64::from(PAYLOAD_SCHEMA_VERSION) {
            return Err(KnowRagError::VectorStore(format!(
                "payload schema version {version} is newer than supported {PAYLOAD_SCHEMA_VERSION}"
            )));
        }
        serde_json::from_value(value)
            .map_err(|e| KnowRagError::VectorStore(format!("undecodable payload: {e}")))
    }
}

fn truncate_chars(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => content[..idx].to_string(),
        None => content.to_string(),
    }
}

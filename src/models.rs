use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::KnowRagError;

/// Engagement counters reported by the source platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    #[serde(default)]
    pub views: i64,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub comments: i64,
    #[serde(default)]
    pub shares: i64,
}

/// Author and platform metadata attached to a post upstream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UapMetadata {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_display_name: String,
    #[serde(default)]
    pub author_followers: i64,
    #[serde(default)]
    pub engagement: Engagement,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub hashtags: Option<Vec<String>>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Aspect-level sentiment extracted from a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aspect {
    pub aspect: String,
    #[serde(default)]
    pub aspect_display_name: String,
    pub sentiment: String,
    #[serde(default)]
    pub sentiment_score: f64,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub mentions: i64,
    #[serde(default)]
    pub impact_score: f64,
}

/// One analyzed social post as produced by the upstream analytics stage.
///
/// Field names follow the batch file format exactly; the core never mutates a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsPost {
    pub id: String,
    pub project_id: String,
    pub source_id: String,
    pub content: String,
    pub content_created_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub platform: String,
    #[serde(default)]
    pub uap_metadata: UapMetadata,

    pub overall_sentiment: String,
    #[serde(default)]
    pub overall_sentiment_score: f64,
    #[serde(default)]
    pub sentiment_confidence: f64,
    #[serde(default)]
    pub aspects: Vec<Aspect>,
    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub risk_level: String,
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default)]
    pub risk_factors: serde_json::Value,
    #[serde(default)]
    pub requires_attention: bool,
    #[serde(default)]
    pub alert_triggered: bool,

    #[serde(default)]
    pub engagement_score: f64,
    #[serde(default)]
    pub virality_score: f64,
    #[serde(default)]
    pub influence_score: f64,
    #[serde(default)]
    pub reach_estimate: i64,

    #[serde(default)]
    pub content_quality_score: f64,
    #[serde(default)]
    pub is_spam: bool,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub toxicity_score: f64,
}

/// Indexing lifecycle of a tracked record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexStatus {
    Pending,
    Indexed,
    Failed,
    ReIndexing,
}

impl IndexStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Indexed => "INDEXED",
            Self::Failed => "FAILED",
            Self::ReIndexing => "RE_INDEXING",
        }
    }

    /// Whether `self -> next` is a legal lifecycle step.
    ///
    /// Nothing ever leaves `INDEXED`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Indexed)
                | (Self::Pending, Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexStatus {
    type Err = KnowRagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "INDEXED" => Ok(Self::Indexed),
            "FAILED" => Ok(Self::Failed),
            "RE_INDEXING" => Ok(Self::ReIndexing),
            other => Err(KnowRagError::TrackingStore(format!(
                "unknown index status: {other}"
            ))),
        }
    }
}

/// Tracking row for one source record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: Uuid,
    pub analytics_id: String,
    pub project_id: String,
    pub point_id: String,
    pub collection_name: String,
    pub content_hash: String,
    pub status: IndexStatus,
    pub error_message: Option<String>,
    pub error_type: Option<String>,
    pub retry_count: i32,
    pub batch_id: Option<String>,
    pub embedding_time_ms: Option<i64>,
    pub upsert_time_ms: Option<i64>,
    pub total_time_ms: Option<i64>,
    pub indexed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IndexedDocument {
    /// Fresh `PENDING` row for a record about to be processed
    pub fn pending(
        post: &AnalyticsPost,
        content_hash: &str,
        collection: &str,
        batch_id: Option<&str>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            analytics_id: post.id.clone(),
            project_id: post.project_id.clone(),
            point_id: post.id.clone(),
            collection_name: collection.to_string(),
            content_hash: content_hash.to_string(),
            status: IndexStatus::Pending,
            error_message: None,
            error_type: None,
            retry_count: 0,
            batch_id: batch_id.map(str::to_string),
            embedding_time_ms: None,
            upsert_time_ms: None,
            total_time_ms: None,
            indexed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Timing measured while indexing one record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexMetrics {
    pub embedding_time_ms: i64,
    pub upsert_time_ms: i64,
    pub total_time_ms: i64,
}

/// Record that could not be indexed, kept for inspection and replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub analytics_id: String,
    pub project_id: String,
    pub batch_id: Option<String>,
    pub error_type: String,
    pub error_message: String,
    pub raw_payload: serde_json::Value,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Per-partition indexing counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub project_id: Option<String>,
    pub total_indexed: i64,
    pub total_failed: i64,
    pub total_pending: i64,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub avg_index_time_ms: f64,
}

/// Campaign as answered by the project service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_ids: Vec<String>,
}

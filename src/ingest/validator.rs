//! Structural validation and quality gating

use crate::config::IngestionConfig;
use crate::models::AnalyticsPost;
use crate::KnowRagError;
use crate::Result;

/// Why a structurally valid post is silently dropped
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityRejection {
    Spam,
    Bot,
    LowQuality(f64),
}

impl QualityRejection {
    pub fn describe(&self) -> String {
        match self {
            Self::Spam => "flagged as spam".to_string(),
            Self::Bot => "flagged as bot".to_string(),
            Self::LowQuality(score) => format!("quality score {score:.2} below threshold"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordValidator {
    min_content_length: usize,
    min_quality_score: f64,
}

impl RecordValidator {
    pub const fn new(min_content_length: usize, min_quality_score: f64) -> Self {
        Self {
            min_content_length,
            min_quality_score,
        }
    }

    pub fn from_config(config: &IngestionConfig) -> Self {
        Self::new(config.min_content_length, config.min_quality_score)
    }

    /// Required IDs present, content long enough, record belongs to `partition`
    pub fn validate(&self, post: &AnalyticsPost, partition: &str) -> Result<()> {
        for (field, value) in [
            ("id", &post.id),
            ("project_id", &post.project_id),
            ("source_id", &post.source_id),
        ] {
            if value.trim().is_empty() {
                return Err(KnowRagError::Validation(format!("missing {field}")));
            }
        }

        if post.project_id != partition {
            return Err(KnowRagError::Validation(format!(
                "record belongs to project {} but batch targets {}",
                post.project_id, partition
            )));
        }

        let length = post.content.trim().chars().count();
        if length < self.min_content_length {
            return Err(KnowRagError::Validation(format!(
                "content length {length} below minimum {}",
                self.min_content_length
            )));
        }

        Ok(())
    }

    pub fn quality_gate(&self, post: &AnalyticsPost) -> Option<QualityRejection> {
        if post.is_spam {
            Some(QualityRejection::Spam)
        } else if post.is_bot {
            Some(QualityRejection::Bot)
        } else if post.content_quality_score < self.min_quality_score {
            Some(QualityRejection::LowQuality(post.content_quality_score))
        } else {
            None
        }
    }
}

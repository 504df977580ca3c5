//! Domain search filters and their translation into vector-store filters

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::vector::Condition;
use crate::vector::Filter;
use crate::KnowRagError;
use crate::Result;

/// User-facing filters; empty fields add no clause
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub sentiments: Vec<String>,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub risk_levels: Vec<String>,
    #[serde(default)]
    pub min_engagement: Option<f64>,
    /// Every listed aspect must appear on the document
    #[serde(default)]
    pub aspects: Vec<String>,
}

impl SearchFilters {
    /// Shape checks that do not depend on the partitions
    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(KnowRagError::InvalidFilters(format!(
                    "date_from {from} is after date_to {to}"
                )));
            }
        }
        if let Some(min) = self.min_engagement {
            if !min.is_finite() {
                return Err(KnowRagError::InvalidFilters(format!(
                    "min_engagement must be a finite number, got {min}"
                )));
            }
        }
        Ok(())
    }
}

/// Build the store filter for `filters` scoped to `partitions`.
///
/// Partition membership is always required. All clauses are combined with AND,
/// including one nested clause per requested aspect.
pub fn build_filter(partitions: &[String], filters: &SearchFilters) -> Result<Filter> {
    if partitions.is_empty() {
        return Err(KnowRagError::InvalidFilters(
            "at least one partition is required".to_string(),
        ));
    }

    filters.validate()?;

    let mut filter = Filter::new().must(Condition::match_any("project_id", partitions.iter().cloned()));

    if !filters.platforms.is_empty() {
        filter = filter.must(Condition::match_any("platform", filters.platforms.iter().cloned()));
    }

    if !filters.sentiments.is_empty() {
        filter = filter.must(Condition::match_any(
            "overall_sentiment",
            filters.sentiments.iter().cloned(),
        ));
    }

    if filters.date_from.is_some() || filters.date_to.is_some() {
        filter = filter.must(Condition::range(
            "content_created_at",
            filters.date_from.map(|d| d.timestamp() as f64),
            filters.date_to.map(|d| d.timestamp() as f64),
        ));
    }

    if !filters.risk_levels.is_empty() {
        filter = filter.must(Condition::match_any("risk_level", filters.risk_levels.iter().cloned()));
    }

    if let Some(min) = filters.min_engagement {
        filter = filter.must(Condition::range("engagement_score", Some(min), None));
    }

    for aspect in filters.aspects.iter().filter(|a| !a.trim().is_empty()) {
        filter = filter.must(Condition::nested(
            "aspects",
            Filter::new().must(Condition::match_any("aspect", [aspect.clone()])),
        ));
    }

    Ok(filter)
}

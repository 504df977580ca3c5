//! Histograms over a page of search results

use std::collections::BTreeSet;
use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use super::search::SearchHit;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub label: String,
    pub count: usize,
    /// Share of the result page, 0..=100
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectStat {
    pub aspect: String,
    /// Results mentioning the aspect
    pub count: usize,
    /// Mean aspect sentiment over those results
    pub avg_sentiment_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregations {
    pub sentiments: Vec<Bucket>,
    pub platforms: Vec<Bucket>,
    pub aspects: Vec<AspectStat>,
}

/// Summarize the returned results.
///
/// Buckets are sorted by count, largest first, ties by label.
pub fn aggregate(results: &[SearchHit]) -> Aggregations {
    if results.is_empty() {
        return Aggregations::default();
    }

    let total = results.len();
    let sentiments = histogram(results.iter().map(|r| r.overall_sentiment.as_str()), total);
    let platforms = histogram(results.iter().map(|r| r.platform.as_str()), total);

    let mut per_aspect: HashMap<&str, (usize, f64)> = HashMap::new();
    for result in results {
        let mut seen = BTreeSet::new();
        for aspect in &result.aspects {
            // A result counts once per aspect; its first mention carries the score
            if seen.insert(aspect.aspect.as_str()) {
                let entry = per_aspect.entry(aspect.aspect.as_str()).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += aspect.sentiment_score;
            }
        }
    }

    let mut aspects: Vec<AspectStat> = per_aspect
        .into_iter()
        .map(|(aspect, (count, sum))| AspectStat {
            aspect: aspect.to_string(),
            count,
            avg_sentiment_score: sum / count as f64,
        })
        .collect();
    aspects.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.aspect.cmp(&b.aspect)));

    Aggregations {
        sentiments,
        platforms,
        aspects,
    }
}

fn histogram<'a>(labels: impl Iterator<Item = &'a str>, total: usize) -> Vec<Bucket> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in labels {
        *counts.entry(label).or_default() += 1;
    }

    let mut buckets: Vec<Bucket> = counts
        .into_iter()
        .map(|(label, count)| Bucket {
            label: label.to_string(),
            count,
            percentage: count as f64 * 100.0 / total as f64,
        })
        .collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    buckets
}

//! CLI output formatting utilities
//!
//! This module provides consistent output formatting for the knowrag CLI

use crate::ingest::BatchSummary;
use crate::ingest::ReconcileReport;
use crate::ingest::RetryReport;
use crate::models::DeadLetterEntry;
use crate::models::IndexStatistics;
use crate::retrieval::CampaignAggregate;
use crate::retrieval::SearchOutput;
use crate::vector::FacetHit;
use crate::AppConfig;

/// Safely truncate a string at character boundary (not byte boundary)
///
/// Truncated strings get a "..." suffix.
#[must_use]
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}

/// Print a batch summary
pub fn print_batch_summary(summary: &BatchSummary) {
    println!("📦 Batch {} (project {})", summary.batch_id, summary.project_id);
    println!("  Total: {}", summary.total);
    println!("  ✅ Indexed: {}", summary.indexed);
    println!("  ⏭️  Skipped: {}", summary.skipped);
    println!("  ❌ Failed: {}", summary.failed);
    println!("  Success rate: {:.1}%", summary.success_rate());
    println!("  Elapsed: {}ms", summary.elapsed_ms);

    if !summary.failed_records.is_empty() {
        println!();
        println!("Failed records:");
        for record in &summary.failed_records {
            println!(
                "  - {} [{}] {}",
                record.record_id,
                record.error_type,
                truncate_str(&record.message, 120)
            );
        }
    }
    if !summary.skipped_records.is_empty() {
        println!();
        println!("Skipped records:");
        for record in &summary.skipped_records {
            println!("  - {} [{}]", record.record_id, record.error_type);
        }
    }
}

/// Print search results
pub fn print_search_output(query: &str, output: &SearchOutput) {
    println!("🔍 \"{query}\": {} results in {}ms", output.total, output.elapsed_ms);
    if output.cache_hit {
        println!("   (served from cache)");
    }
    if output.no_relevant_context {
        print_warning("No sufficiently relevant documents found");
        return;
    }

    for (i, hit) in output.results.iter().enumerate() {
        println!();
        println!(
            "  {}. [{:.3}] {} | {} | {} | @{}",
            i + 1,
            hit.score,
            hit.platform,
            hit.overall_sentiment,
            hit.risk_level,
            hit.author
        );
        println!("     {}", truncate_str(&hit.content, 160));
        if !hit.aspects.is_empty() {
            let aspects: Vec<String> = hit
                .aspects
                .iter()
                .map(|a| format!("{}:{}", a.aspect, a.sentiment))
                .collect();
            println!("     aspects: {}", aspects.join(", "));
        }
    }

    let aggs = &output.aggregations;
    println!();
    println!("📊 Sentiment:");
    for bucket in &aggs.sentiments {
        println!("  {}: {} ({:.1}%)", bucket.label, bucket.count, bucket.percentage);
    }
    println!("📱 Platforms:");
    for bucket in &aggs.platforms {
        println!("  {}: {} ({:.1}%)", bucket.label, bucket.count, bucket.percentage);
    }
    if !aggs.aspects.is_empty() {
        println!("🏷️  Aspects:");
        for stat in &aggs.aspects {
            println!(
                "  {}: {} (avg sentiment {:.2})",
                stat.aspect, stat.count, stat.avg_sentiment_score
            );
        }
    }
}

fn print_facets(title: &str, hits: &[FacetHit]) {
    println!("{title}");
    if hits.is_empty() {
        println!("  (none)");
    }
    for hit in hits {
        println!("  {}: {}", hit.value, hit.count);
    }
}

/// Print a campaign aggregate
pub fn print_campaign_aggregate(aggregate: &CampaignAggregate) {
    println!(
        "📊 Campaign {}: {} documents across {} projects ({}ms)",
        aggregate.campaign_id,
        aggregate.total_count,
        aggregate.partitions.len(),
        aggregate.elapsed_ms
    );
    println!();
    print_facets("Sentiment:", &aggregate.sentiments);
    print_facets("Platforms:", &aggregate.platforms);
    print_facets("Top negative aspects:", &aggregate.top_negative_aspects);
}

/// Print indexing statistics
pub fn print_statistics(stats: &IndexStatistics) {
    println!(
        "📊 Indexing statistics ({})",
        stats.project_id.as_deref().unwrap_or("all projects")
    );
    println!("===================");
    println!("  Indexed: {}", stats.total_indexed);
    println!("  Pending: {}", stats.total_pending);
    println!("  Failed: {}", stats.total_failed);
    println!("  Avg index time: {:.1}ms", stats.avg_index_time_ms);
    match stats.last_indexed_at {
        Some(at) => println!("  Last indexed: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("  Last indexed: never"),
    }
}

pub fn print_retry_report(report: &RetryReport) {
    println!(
        "🔁 Retry: {} candidates, {} requeued, {} failed",
        report.total, report.retried, report.failed
    );
}

pub fn print_reconcile_report(report: &ReconcileReport) {
    println!(
        "🧹 Reconcile: {} stale, {} requeued, {} failed",
        report.total, report.requeued, report.failed
    );
}

pub fn print_dead_letters(entries: &[DeadLetterEntry]) {
    println!("Found {} dead letters:", entries.len());
    for entry in entries {
        println!(
            "  - {} | {} | batch {} | [{}] {} | {}",
            entry.analytics_id,
            entry.project_id,
            entry.batch_id.as_deref().unwrap_or("N/A"),
            entry.error_type,
            truncate_str(&entry.error_message, 80),
            entry.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
}

/// Print configuration
pub fn print_config(config: &AppConfig) {
    println!("📋 knowrag Configuration:");
    println!();

    println!("🗄️  Database:");
    println!("  URL: {}", mask_url(config.database_url()));
    println!("  Max connections: {}", config.max_connections());
    println!("  Min connections: {}", config.min_connections());
    println!("  Connection timeout: {}s", config.connection_timeout());
    println!();

    println!("📝 Logging:");
    println!("  Level: {}", config.logging.level);
    println!("  Backtrace: {}", config.logging.backtrace);
    println!();

    println!("🧠 Embeddings:");
    println!("  Provider: {}", config.embeddings.provider);
    println!("  Model: {}", config.embedding_model());
    println!("  Dimension: {}", config.embedding_dimension());
    println!("  Cache TTL: {}s", config.embeddings.cache_ttl_secs);
    println!();

    println!("🧭 Vector store:");
    println!("  Collection: {}", config.collection());
    println!("  Max content chars: {}", config.vector_store.max_content_chars);
    println!();

    println!("📥 Ingestion:");
    println!("  Max concurrency: {}", config.ingestion.max_concurrency);
    println!("  Min content length: {}", config.ingestion.min_content_length);
    println!("  Min quality score: {}", config.ingestion.min_quality_score);
    println!();

    println!("🔍 Retrieval:");
    println!(
        "  Limit: {} (max {})",
        config.retrieval.default_limit, config.retrieval.max_limit
    );
    println!("  Default min score: {}", config.retrieval.default_min_score);
    println!("  Search cache TTL: {}s", config.retrieval.search_cache_ttl_secs);
    println!("  Campaign cache TTL: {}s", config.retrieval.campaign_cache_ttl_secs);
    println!();

    println!("⚡ Cache:");
    match &config.redis {
        Some(redis) => println!("  Redis: {}", mask_url(&redis.url)),
        None => println!("  In-process memory"),
    }
    println!();

    println!("🏢 Project service:");
    println!("  Endpoint: {}", config.project_service.endpoint);
}

/// Mask a connection URL for display (hide password)
fn mask_url(raw: &str) -> String {
    if let Ok(parsed) = url::Url::parse(raw) {
        if let Some(host) = parsed.host_str() {
            let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();
            format!("{}://{}@{}{}", parsed.scheme(), parsed.username(), host, port)
        } else {
            "***masked***".to_string()
        }
    } else {
        "***invalid***".to_string()
    }
}

/// Print colored output functions
pub fn print_info(msg: &str) {
    println!("ℹ️  {msg}");
}

pub fn print_success(msg: &str) {
    println!("✅ {msg}");
}

pub fn print_warning(msg: &str) {
    println!("⚠️  {msg}");
}

pub fn print_error(msg: &str) {
    eprintln!("❌ {msg}");
}

use std::sync::Arc;

use async_trait::async_trait;
use knowrag::cache::MemoryCache;
use knowrag::database::Database;
use knowrag::embeddings::EmbeddingProvider;
use knowrag::fingerprint::content_fingerprint;
use knowrag::ingest::BatchRequest;
use knowrag::models::Campaign;
use knowrag::retrieval::ProjectService;
use knowrag::retrieval::SearchRequest;
use knowrag::storage::LocalContentStore;
use knowrag::tracking::MemoryTrackingStore;
use knowrag::tracking::TrackingStore;
use knowrag::vector::MemoryVectorStore;
use knowrag::vector::PgVectorStore;
use knowrag::AppConfig;
use knowrag::Backends;
use knowrag::KnowRag;
use knowrag::Result;
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Maps text onto a few keyword axes so related texts score close together
struct KeywordEmbedder;

const AXES: [&str; 4] = ["battery", "screen", "camera", "price"];

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let mut vector: Vec<f32> = AXES
                    .iter()
                    .map(|axis| if lower.contains(axis) { 1.0 } else { 0.0 })
                    .collect();
                // Keeps texts without any keyword off the zero vector
                vector.push(0.05);
                vector
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "keyword-axes"
    }
}

struct StaticProjects;

#[async_trait]
impl ProjectService for StaticProjects {
    async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        Ok((campaign_id == "launch").then(|| Campaign {
            id: "launch".to_string(),
            name: "Phone launch".to_string(),
            project_ids: vec!["brand-a".to_string(), "brand-b".to_string()],
        }))
    }
}

fn record(id: &str, project: &str, content: &str, sentiment: &str) -> String {
    json!({
        "id": id,
        "project_id": project,
        "source_id": format!("src-{id}"),
        "content": content,
        "content_created_at": "2024-05-01T10:00:00Z",
        "ingested_at": "2024-05-01T10:05:00Z",
        "platform": "TIKTOK",
        "uap_metadata": {
            "author": "reviewer",
            "engagement": {"views": 120, "likes": 4, "comments": 1, "shares": 0}
        },
        "overall_sentiment": sentiment,
        "overall_sentiment_score": if sentiment == "NEGATIVE" { -0.6 } else { 0.6 },
        "aspects": [{
            "aspect": "BATTERY",
            "sentiment": sentiment,
            "sentiment_score": if sentiment == "NEGATIVE" { -0.6 } else { 0.6 }
        }],
        "risk_level": "LOW",
        "engagement_score": 3.0,
        "content_quality_score": 0.9,
        "language": "en"
    })
    .to_string()
}

#[tokio::test]
async fn test_ingest_then_search_end_to_end() -> Result<()> {
    let root = tempfile::tempdir()?;
    let bucket = root.path().join("analytics");
    std::fs::create_dir_all(&bucket)?;
    std::fs::write(
        bucket.join("brand-a.jsonl"),
        [
            record("a1", "brand-a", "The battery barely lasts half a day", "NEGATIVE"),
            record("a2", "brand-a", "Camera quality is stunning at night", "POSITIVE"),
            "{broken".to_string(),
        ]
        .join("\n"),
    )?;
    std::fs::write(
        bucket.join("brand-b.jsonl"),
        record("b1", "brand-b", "Battery charging is very quick", "POSITIVE"),
    )?;

    let tracking = Arc::new(MemoryTrackingStore::new());
    let backends = Backends {
        tracking: tracking.clone(),
        vectors: Arc::new(MemoryVectorStore::new()),
        cache: Arc::new(MemoryCache::new()),
        embedder: Arc::new(KeywordEmbedder),
        projects: Arc::new(StaticProjects),
        content: Arc::new(LocalContentStore::new(root.path())),
    };
    let knowrag = KnowRag::with_backends(AppConfig::default(), backends);
    let cancel = CancellationToken::new();

    let summary = knowrag
        .ingest(
            &BatchRequest {
                batch_id: "batch-a".to_string(),
                project_id: "brand-a".to_string(),
                location: "s3://analytics/brand-a.jsonl".to_string(),
            },
            &cancel,
        )
        .await?;
    assert_eq!((summary.total, summary.indexed, summary.failed), (3, 2, 1));

    let summary = knowrag
        .ingest(
            &BatchRequest {
                batch_id: "batch-b".to_string(),
                project_id: "brand-b".to_string(),
                location: "s3://analytics/brand-b.jsonl".to_string(),
            },
            &cancel,
        )
        .await?;
    assert_eq!(summary.indexed, 1);

    let output = knowrag
        .search(
            &SearchRequest {
                campaign_id: "launch".to_string(),
                query: "how is the battery".to_string(),
                ..SearchRequest::default()
            },
            &cancel,
        )
        .await?;

    let mut ids: Vec<_> = output.results.iter().map(|r| r.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["a1", "b1"]);
    assert!(output.results.iter().all(|r| r.score >= 0.65));

    let aggregate = knowrag
        .aggregate("launch", &Default::default(), &cancel)
        .await?;
    assert_eq!(aggregate.total_count, 3);
    assert_eq!(aggregate.top_negative_aspects.len(), 1);

    let stats = tracking.statistics(None).await?;
    assert_eq!(stats.total_indexed, 3);
    assert_eq!(tracking.list_dead_letters(None, 10).await?.len(), 1);

    let err = knowrag
        .search(
            &SearchRequest {
                campaign_id: "unknown".to_string(),
                query: "battery".to_string(),
                ..SearchRequest::default()
            },
            &cancel,
        )
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 404);

    Ok(())
}

#[tokio::test]
#[ignore = "requires PostgreSQL with pgvector, configured in config.toml"]
async fn test_postgres_tracking_and_vectors() -> Result<()> {
    use knowrag::models::IndexMetrics;
    use knowrag::models::IndexStatus;
    use knowrag::models::IndexedDocument;
    use knowrag::vector::Condition;
    use knowrag::vector::Filter;
    use knowrag::vector::PointPayload;
    use knowrag::vector::SearchQuery;
    use knowrag::vector::VectorPoint;
    use knowrag::vector::VectorStore;

    let config = AppConfig::load()?;
    let database = Database::from_config(&config).await?;
    database.init_schema(config.embedding_dimension()).await?;

    let run = uuid::Uuid::new_v4().to_string();
    let project = format!("it-{run}");
    let post: knowrag::models::AnalyticsPost =
        serde_json::from_str(&record(&format!("{run}-1"), &project, "Battery review text", "POSITIVE"))?;

    let doc = IndexedDocument::pending(&post, &content_fingerprint(&post.content), "it", Some("b1"));
    let stored = database.begin_indexing(&doc).await?;
    database.mark_indexed(stored.id, IndexMetrics::default()).await?;
    let row = database.find_by_analytics_id(&post.id).await?.expect("row exists");
    assert_eq!(row.status, IndexStatus::Indexed);

    let store = PgVectorStore::new(database.pool().clone());
    let mut vector = vec![0.0; config.embedding_dimension()];
    vector[0] = 1.0;
    store
        .upsert_points(
            "it",
            &[VectorPoint {
                id: post.id.clone(),
                vector: vector.clone(),
                payload: PointPayload::from_post(&post, 1000),
            }],
        )
        .await?;

    let filter = Filter::new().must(Condition::match_any("project_id", [project.clone()]));
    let hits = store
        .search(
            "it",
            &SearchQuery {
                vector,
                filter: filter.clone(),
                limit: 5,
            },
        )
        .await?;
    assert_eq!(hits.len(), 1);
    assert!(hits[0].score > 0.99);
    assert_eq!(store.count("it", &filter).await?, 1);

    Ok(())
}

//! Batch ingestion scenarios over in-memory backends

#[cfg(test)]
mod ingestion_tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::ingest::BatchRequest;
    use crate::ingest::BatchSummary;
    use crate::models::IndexStatus;
    use crate::tests::line;
    use crate::tests::post;
    use crate::tests::FakeEmbeddingProvider;
    use crate::tests::Harness;
    use crate::tests::VectorOp;
    use crate::tracking::TrackingStore;
    use crate::AppConfig;

    fn request(batch_id: &str, location: &str) -> BatchRequest {
        BatchRequest {
            batch_id: batch_id.to_string(),
            project_id: "p1".to_string(),
            location: location.to_string(),
        }
    }

    fn assert_conserved(summary: &BatchSummary) {
        assert_eq!(
            summary.indexed + summary.failed + summary.skipped,
            summary.total,
            "summary does not add up: {summary:?}"
        );
    }

    #[tokio::test]
    async fn test_valid_duplicate_and_short_records() {
        let harness = Harness::new(FakeEmbeddingProvider::new(8));
        let cancel = CancellationToken::new();

        let first = harness.write_batch(
            "b0.jsonl",
            &[line(&post("x1", "p1", "Battery drains way too fast on this phone"))],
        );
        let summary = harness.knowrag.ingest(&request("b0", &first), &cancel).await.unwrap();
        assert_eq!(summary.indexed, 1);

        let location = harness.write_batch(
            "b1.jsonl",
            &[
                line(&post("u1", "p1", "The camera is sharp even at night")),
                line(&post("d1", "p1", "Battery drains way too fast on this phone")),
                line(&post("s1", "p1", "short")),
            ],
        );
        let summary = harness
            .knowrag
            .ingest(&request("b1", &location), &cancel)
            .await
            .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.indexed, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed, 0);
        assert_conserved(&summary);

        let mut kinds: Vec<_> = summary
            .skipped_records
            .iter()
            .map(|r| (r.record_id.as_str(), r.error_type.as_str()))
            .collect();
        kinds.sort_unstable();
        assert_eq!(kinds, [("d1", "DUPLICATE_CONTENT"), ("s1", "VALIDATION_ERROR")]);
        assert_eq!(harness.vectors.len(&harness.collection()).await, 2);
    }

    #[tokio::test]
    async fn test_malformed_lines_fail_and_are_dead_lettered() {
        let harness = Harness::new(FakeEmbeddingProvider::new(8));
        let location = harness.write_batch(
            "mixed.jsonl",
            &[
                line(&post("a1", "p1", "Screen is bright and colourful")),
                "{not json".to_string(),
                String::new(),
                r#"{"id": "a3", "content": 42}"#.to_string(),
            ],
        );

        let summary = harness
            .knowrag
            .ingest(&request("b1", &location), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.indexed, 1);
        assert_eq!(summary.failed, 2);
        assert_conserved(&summary);
        assert!(summary
            .failed_records
            .iter()
            .all(|r| r.error_type == "PARSE_ERROR"));
        assert!(summary.failed_records.iter().any(|r| r.record_id == "a3"));
        assert!(summary.failed_records.iter().any(|r| r.record_id == "line:2"));

        let letters = harness.tracking.list_dead_letters(Some("p1"), 10).await.unwrap();
        assert_eq!(letters.len(), 2);
    }

    #[tokio::test]
    async fn test_bad_location_is_a_batch_error() {
        let harness = Harness::new(FakeEmbeddingProvider::new(8));
        let cancel = CancellationToken::new();

        let err = harness
            .knowrag
            .ingest(&request("b1", "https://batches/x.jsonl"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "VALIDATION_ERROR");

        let err = harness
            .knowrag
            .ingest(&request("b1", "s3://batches/missing.jsonl"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "STORAGE_ERROR");
    }

    #[tokio::test]
    async fn test_reingest_same_record_reuses_row_and_point() {
        let harness = Harness::new(FakeEmbeddingProvider::new(8));
        let cancel = CancellationToken::new();
        let orchestrator = harness.knowrag.orchestrator();
        let req = request("b1", "s3://batches/unused.jsonl");

        let summary = orchestrator
            .process_posts(&req, vec![post("a1", "p1", "Original review of the battery")], &cancel)
            .await;
        assert_eq!(summary.indexed, 1);
        let row = harness.tracking.find_by_analytics_id("a1").await.unwrap().unwrap();

        let summary = orchestrator
            .process_posts(&req, vec![post("a1", "p1", "Edited review of the battery life")], &cancel)
            .await;
        assert_eq!(summary.indexed, 1);

        let again = harness.tracking.find_by_analytics_id("a1").await.unwrap().unwrap();
        assert_eq!(again.id, row.id);
        assert_eq!(again.point_id, row.point_id);
        assert_ne!(again.content_hash, row.content_hash);
        assert_eq!(again.status, IndexStatus::Indexed);
        assert_eq!(harness.tracking.len().await, 1);

        let collection = harness.collection();
        assert_eq!(harness.vectors.len(&collection).await, 1);
        let payload = harness.vectors.payload(&collection, "a1").await.unwrap();
        assert_eq!(payload.content, "Edited review of the battery life");
    }

    #[tokio::test]
    async fn test_duplicates_within_one_batch_index_once() {
        let harness = Harness::new(FakeEmbeddingProvider::new(8));
        let posts = (0..6)
            .map(|i| post(&format!("dup{i}"), "p1", "Same exact content in every record"))
            .collect();

        let summary = harness
            .knowrag
            .orchestrator()
            .process_posts(
                &request("b1", "s3://batches/unused.jsonl"),
                posts,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.indexed, 1);
        assert_eq!(summary.skipped, 5);
        assert_conserved(&summary);
        assert!(summary
            .skipped_records
            .iter()
            .all(|r| r.error_type == "DUPLICATE_CONTENT"));
    }

    #[tokio::test]
    async fn test_in_flight_embeddings_never_exceed_ceiling() {
        let mut config = AppConfig::default();
        config.ingestion.max_concurrency = 3;
        let harness = Harness::with_config(
            config,
            FakeEmbeddingProvider::new(8).with_delay(Duration::from_millis(20)),
        );
        let posts = (0..12)
            .map(|i| post(&format!("c{i}"), "p1", &format!("Distinct review number {i} here")))
            .collect();

        let summary = harness
            .knowrag
            .orchestrator()
            .process_posts(
                &request("b1", "s3://batches/unused.jsonl"),
                posts,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.indexed, 12);
        assert!(harness.embedder.max_in_flight() <= 3);
        assert!(harness.embedder.max_in_flight() > 1);
    }

    #[tokio::test]
    async fn test_panicking_record_is_contained() {
        let harness = Harness::new(FakeEmbeddingProvider::new(8).panicking_on("BOOM"));
        let posts = vec![
            post("ok1", "p1", "Perfectly ordinary review text"),
            post("bad", "p1", "This one goes BOOM in the provider"),
            post("ok2", "p1", "Another perfectly ordinary review"),
        ];

        let summary = harness
            .knowrag
            .orchestrator()
            .process_posts(
                &request("b1", "s3://batches/unused.jsonl"),
                posts,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.indexed, 2);
        assert_eq!(summary.failed, 1);
        assert_conserved(&summary);
        assert_eq!(summary.failed_records[0].record_id, "bad");
        assert_eq!(summary.failed_records[0].error_type, "INTERNAL_ERROR");

        let letters = harness.tracking.list_dead_letters(None, 10).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].analytics_id, "bad");
    }

    #[tokio::test]
    async fn test_embedding_failures_mark_rows_failed() {
        let harness = Harness::new(FakeEmbeddingProvider::new(8).failing());
        let posts = vec![
            post("a1", "p1", "Review that will fail to embed"),
            post("a2", "p1", "Second review that will fail too"),
        ];

        let summary = harness
            .knowrag
            .orchestrator()
            .process_posts(
                &request("b1", "s3://batches/unused.jsonl"),
                posts,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.failed, 2);
        assert!(summary
            .failed_records
            .iter()
            .all(|r| r.error_type == "EMBEDDING_ERROR"));

        let row = harness.tracking.find_by_analytics_id("a1").await.unwrap().unwrap();
        assert_eq!(row.status, IndexStatus::Failed);
        assert_eq!(row.error_type.as_deref(), Some("EMBEDDING_ERROR"));
        assert_eq!(harness.tracking.list_dead_letters(None, 10).await.unwrap().len(), 2);
        assert_eq!(harness.vectors.len(&harness.collection()).await, 0);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_abort_batch() {
        let harness = Harness::new(FakeEmbeddingProvider::new(8));
        let mut bytes = line(&post("a1", "p1", "Screen is bright and colourful")).into_bytes();
        bytes.extend_from_slice(b"\n{\"id\": \"bad\xff\xfe\"}\n");
        let location = harness.write_batch_bytes("binary.jsonl", &bytes);

        let summary = harness
            .knowrag
            .ingest(&request("b1", &location), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!((summary.total, summary.indexed, summary.failed), (2, 1, 1));
        assert_conserved(&summary);
        assert_eq!(summary.failed_records[0].record_id, "line:2");
        assert_eq!(summary.failed_records[0].error_type, "PARSE_ERROR");

        let letters = harness.tracking.list_dead_letters(Some("p1"), 10).await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(harness.vectors.len(&harness.collection()).await, 1);
    }

    #[tokio::test]
    async fn test_upsert_failure_marks_row_failed() {
        let harness = Harness::new(FakeEmbeddingProvider::new(8));
        harness.vector_faults.fail_on(VectorOp::Upsert);

        let summary = harness
            .knowrag
            .orchestrator()
            .process_posts(
                &request("b1", "s3://batches/unused.jsonl"),
                vec![post("a1", "p1", "Speaker crackles at full volume")],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.indexed, 0);
        assert_eq!(summary.failed_records[0].record_id, "a1");
        assert_eq!(summary.failed_records[0].error_type, "VECTOR_STORE_ERROR");

        let row = harness.tracking.find_by_analytics_id("a1").await.unwrap().unwrap();
        assert_eq!(row.status, IndexStatus::Failed);
        assert_eq!(row.error_type.as_deref(), Some("VECTOR_STORE_ERROR"));
        assert_eq!(harness.tracking.list_dead_letters(None, 10).await.unwrap().len(), 1);
        assert_eq!(harness.vectors.len(&harness.collection()).await, 0);
    }

    #[tokio::test]
    async fn test_quality_and_partition_gates() {
        let harness = Harness::new(FakeEmbeddingProvider::new(8));
        let mut spam = post("spam", "p1", "Buy followers now at a discount");
        spam.is_spam = true;
        let mut low = post("low", "p1", "Barely coherent but long enough");
        low.content_quality_score = 0.1;
        let foreign = post("foreign", "p2", "Belongs to a different project");

        let summary = harness
            .knowrag
            .orchestrator()
            .process_posts(
                &request("b1", "s3://batches/unused.jsonl"),
                vec![spam, low, foreign],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.indexed, 0);
        // Quality drops are silent; only the partition mismatch is classified
        assert_eq!(summary.skipped_records.len(), 1);
        assert_eq!(summary.skipped_records[0].record_id, "foreign");
        assert_eq!(summary.skipped_records[0].error_type, "VALIDATION_ERROR");
        assert!(harness.tracking.is_empty().await);
        assert_eq!(harness.embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_batch_still_adds_up() {
        let harness = Harness::new(FakeEmbeddingProvider::new(8));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let posts = (0..4)
            .map(|i| post(&format!("c{i}"), "p1", &format!("Review number {i} never runs")))
            .collect();

        let summary = harness
            .knowrag
            .orchestrator()
            .process_posts(&request("b1", "s3://batches/unused.jsonl"), posts, &cancel)
            .await;

        assert_eq!(summary.failed, 4);
        assert_conserved(&summary);
        assert!(summary
            .failed_records
            .iter()
            .all(|r| r.error_type == "CANCELLED"));
        assert!(harness
            .tracking
            .list_dead_letters(None, 10)
            .await
            .unwrap()
            .is_empty());
    }
}

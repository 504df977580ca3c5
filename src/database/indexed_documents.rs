use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::FromRow;
use sqlx::Row;
use uuid::Uuid;

use super::Database;
use crate::models::DeadLetterEntry;
use crate::models::IndexMetrics;
use crate::models::IndexStatistics;
use crate::models::IndexStatus;
use crate::models::IndexedDocument;
use crate::tracking::TrackingStore;
use crate::tracking::STALE_ERROR_TYPE;
use crate::KnowRagError;
use crate::Result;

impl<'r> FromRow<'r, PgRow> for IndexedDocument {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<IndexStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Self {
            id: row.try_get("id")?,
            analytics_id: row.try_get("analytics_id")?,
            project_id: row.try_get("project_id")?,
            point_id: row.try_get("point_id")?,
            collection_name: row.try_get("collection_name")?,
            content_hash: row.try_get("content_hash")?,
            status,
            error_message: row.try_get("error_message")?,
            error_type: row.try_get("error_type")?,
            retry_count: row.try_get("retry_count")?,
            batch_id: row.try_get("batch_id")?,
            embedding_time_ms: row.try_get("embedding_time_ms")?,
            upsert_time_ms: row.try_get("upsert_time_ms")?,
            total_time_ms: row.try_get("total_time_ms")?,
            indexed_at: row.try_get("indexed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn missing_row(id: Uuid) -> KnowRagError {
    KnowRagError::TrackingStore(format!("tracking row {id} not found"))
}

#[async_trait]
impl TrackingStore for Database {
    async fn find_by_analytics_id(&self, analytics_id: &str) -> Result<Option<IndexedDocument>> {
        let doc = sqlx::query_as::<_, IndexedDocument>(
            "SELECT * FROM indexed_documents WHERE analytics_id = $1",
        )
        .bind(analytics_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(doc)
    }

    async fn find_by_content_hash(
        &self,
        project_id: &str,
        content_hash: &str,
    ) -> Result<Option<IndexedDocument>> {
        let doc = sqlx::query_as::<_, IndexedDocument>(
            "SELECT * FROM indexed_documents WHERE project_id = $1 AND content_hash = $2 ORDER BY created_at LIMIT 1",
        )
        .bind(project_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(doc)
    }

    async fn begin_indexing(&self, doc: &IndexedDocument) -> Result<IndexedDocument> {
        let mut tx = self.pool.begin().await?;

        // Serialize writers of the same (partition, fingerprint) until commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("{}:{}", doc.project_id, doc.content_hash))
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM indexed_documents WHERE analytics_id = $1 FOR UPDATE",
        )
        .bind(&doc.analytics_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = if let Some(id) = existing {
            sqlx::query_as::<_, IndexedDocument>(
                r"
                UPDATE indexed_documents
                SET project_id = $2,
                    content_hash = $3,
                    collection_name = $4,
                    batch_id = $5,
                    status = CASE WHEN status = 'INDEXED' THEN status ELSE 'PENDING' END,
                    error_message = NULL,
                    error_type = NULL,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
                ",
            )
            .bind(id)
            .bind(&doc.project_id)
            .bind(&doc.content_hash)
            .bind(&doc.collection_name)
            .bind(&doc.batch_id)
            .fetch_one(&mut *tx)
            .await?
        } else {
            let owner = sqlx::query_scalar::<_, String>(
                "SELECT analytics_id FROM indexed_documents WHERE project_id = $1 AND content_hash = $2 LIMIT 1",
            )
            .bind(&doc.project_id)
            .bind(&doc.content_hash)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(existing_id) = owner {
                return Err(KnowRagError::DuplicateContent {
                    fingerprint: doc.content_hash.clone(),
                    existing_id,
                });
            }

            sqlx::query_as::<_, IndexedDocument>(
                r"
                INSERT INTO indexed_documents (
                    id, analytics_id, project_id, point_id, collection_name,
                    content_hash, status, retry_count, batch_id, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', $7, $8, $9, NOW())
                RETURNING *
                ",
            )
            .bind(doc.id)
            .bind(&doc.analytics_id)
            .bind(&doc.project_id)
            .bind(&doc.point_id)
            .bind(&doc.collection_name)
            .bind(&doc.content_hash)
            .bind(doc.retry_count)
            .bind(&doc.batch_id)
            .bind(doc.created_at)
            .fetch_one(&mut *tx)
            .await?
        };

        tx.commit().await?;
        Ok(row)
    }

    async fn mark_indexed(&self, id: Uuid, metrics: IndexMetrics) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE indexed_documents
            SET status = 'INDEXED',
                error_message = NULL,
                error_type = NULL,
                embedding_time_ms = $2,
                upsert_time_ms = $3,
                total_time_ms = $4,
                indexed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('PENDING', 'INDEXED')
            ",
        )
        .bind(id)
        .bind(metrics.embedding_time_ms)
        .bind(metrics.upsert_time_ms)
        .bind(metrics.total_time_ms)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(KnowRagError::TrackingStore(format!(
                "tracking row {id} missing or not PENDING"
            )));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error_type: &str, message: &str) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE indexed_documents
            SET status = CASE WHEN status = 'INDEXED' THEN status ELSE 'FAILED' END,
                error_type = $2,
                error_message = $3,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(error_type)
        .bind(message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(missing_row(id));
        }
        Ok(())
    }

    async fn list_failed_for_retry(
        &self,
        max_retries: i32,
        limit: i64,
    ) -> Result<Vec<IndexedDocument>> {
        let docs = sqlx::query_as::<_, IndexedDocument>(
            "SELECT * FROM indexed_documents WHERE status = 'FAILED' AND retry_count < $1 ORDER BY created_at ASC LIMIT $2",
        )
        .bind(max_retries)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(docs)
    }

    async fn requeue(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE indexed_documents
            SET status = 'PENDING', retry_count = retry_count + 1, updated_at = NOW()
            WHERE id = $1 AND status = 'FAILED'
            ",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<IndexedDocument>> {
        let docs = sqlx::query_as::<_, IndexedDocument>(
            "SELECT * FROM indexed_documents WHERE status = 'PENDING' AND updated_at < $1 ORDER BY updated_at ASC LIMIT $2",
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(docs)
    }

    async fn mark_stale(&self, id: Uuid, message: &str) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE indexed_documents
            SET status = 'FAILED', error_type = $2, error_message = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            ",
        )
        .bind(id)
        .bind(STALE_ERROR_TYPE)
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn statistics(&self, project_id: Option<&str>) -> Result<IndexStatistics> {
        let row = sqlx::query(
            r"
            SELECT
                COUNT(*) FILTER (WHERE status = 'INDEXED') AS total_indexed,
                COUNT(*) FILTER (WHERE status = 'FAILED') AS total_failed,
                COUNT(*) FILTER (WHERE status IN ('PENDING', 'RE_INDEXING')) AS total_pending,
                MAX(indexed_at) AS last_indexed_at,
                CAST(AVG(total_time_ms) FILTER (WHERE status = 'INDEXED') AS DOUBLE PRECISION) AS avg_index_time_ms
            FROM indexed_documents
            WHERE $1::VARCHAR IS NULL OR project_id = $1
            ",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(IndexStatistics {
            project_id: project_id.map(str::to_string),
            total_indexed: row.try_get("total_indexed")?,
            total_failed: row.try_get("total_failed")?,
            total_pending: row.try_get("total_pending")?,
            last_indexed_at: row.try_get("last_indexed_at")?,
            avg_index_time_ms: row
                .try_get::<Option<f64>, _>("avg_index_time_ms")?
                .unwrap_or(0.0),
        })
    }

    async fn record_dead_letter(&self, entry: &DeadLetterEntry) -> Result<()> {
        self.insert_dead_letter(entry).await
    }

    async fn list_dead_letters(
        &self,
        project_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<DeadLetterEntry>> {
        self.fetch_dead_letters(project_id, limit).await
    }
}

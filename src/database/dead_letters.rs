use sqlx::Row;

use super::Database;
use crate::models::DeadLetterEntry;
use crate::Result;

impl Database {
    /// Insert a dead-letter entry for a record that could not be indexed
    pub async fn insert_dead_letter(&self, entry: &DeadLetterEntry) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO dead_letter_documents (
                id, analytics_id, project_id, batch_id, error_type,
                error_message, raw_payload, retry_count, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(entry.id)
        .bind(&entry.analytics_id)
        .bind(&entry.project_id)
        .bind(&entry.batch_id)
        .bind(&entry.error_type)
        .bind(&entry.error_message)
        .bind(&entry.raw_payload)
        .bind(entry.retry_count)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent dead letters, optionally for one partition
    pub async fn fetch_dead_letters(
        &self,
        project_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<DeadLetterEntry>> {
        let rows = sqlx::query(
            r"
            SELECT id, analytics_id, project_id, batch_id, error_type,
                   error_message, raw_payload, retry_count, created_at
            FROM dead_letter_documents
            WHERE $1::VARCHAR IS NULL OR project_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            ",
        )
        .bind(project_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<DeadLetterEntry> {
                Ok(DeadLetterEntry {
                    id: row.try_get("id")?,
                    analytics_id: row.try_get("analytics_id")?,
                    project_id: row.try_get("project_id")?,
                    batch_id: row.try_get("batch_id")?,
                    error_type: row.try_get("error_type")?,
                    error_message: row.try_get("error_message")?,
                    raw_payload: row.try_get("raw_payload")?,
                    retry_count: row.try_get("retry_count")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

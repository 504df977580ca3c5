use super::Database;
use crate::KnowRagError;
use crate::Result;

const REQUIRED_TABLES: [&str; 3] = ["indexed_documents", "dead_letter_documents", "vector_points"];

impl Database {
    /// Check if database schema is initialized
    /// Returns true if all required tables exist
    pub async fn is_schema_initialized(&self) -> Result<bool> {
        for table_name in REQUIRED_TABLES {
            let exists = sqlx::query_scalar::<_, bool>(
                r"
                SELECT EXISTS (
                    SELECT FROM information_schema.tables
                    WHERE table_schema = 'public'
                    AND table_name = $1
                )
                ",
            )
            .bind(table_name)
            .fetch_one(&self.pool)
            .await?;

            if !exists {
                tracing::debug!("Missing required table: {}", table_name);
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Verify database schema or return helpful error
    pub async fn verify_schema_or_error(&self) -> Result<()> {
        if !self.is_schema_initialized().await? {
            return Err(KnowRagError::Custom(
                "Database schema not initialized!\n\n\
                 Please run the following command to initialize the database:\n\n\
                 \x1b[1;32mknowrag init\x1b[0m"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Initialize database schema.
    ///
    /// Idempotent. `dimension` fixes the width of the `vector_points.embedding` column.
    pub async fn init_schema(&self, dimension: usize) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;

        // Tracking rows, one per source record
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS indexed_documents (
                id UUID PRIMARY KEY,
                analytics_id VARCHAR(255) UNIQUE NOT NULL,
                project_id VARCHAR(255) NOT NULL,
                point_id VARCHAR(255) NOT NULL,
                collection_name VARCHAR(255) NOT NULL,
                content_hash VARCHAR(64) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'PENDING',
                error_message TEXT,
                error_type VARCHAR(64),
                retry_count INTEGER NOT NULL DEFAULT 0,
                batch_id VARCHAR(255),
                embedding_time_ms BIGINT,
                upsert_time_ms BIGINT,
                total_time_ms BIGINT,
                indexed_at TIMESTAMP WITH TIME ZONE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                CONSTRAINT indexed_documents_status_check
                    CHECK (status IN ('PENDING', 'INDEXED', 'FAILED', 'RE_INDEXING'))
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_indexed_documents_project_hash ON indexed_documents(project_id, content_hash)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_indexed_documents_status_updated ON indexed_documents(status, updated_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS dead_letter_documents (
                id UUID PRIMARY KEY,
                analytics_id VARCHAR(255) NOT NULL,
                project_id VARCHAR(255) NOT NULL,
                batch_id VARCHAR(255),
                error_type VARCHAR(64) NOT NULL,
                error_message TEXT NOT NULL,
                raw_payload JSONB NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_dead_letter_documents_project ON dead_letter_documents(project_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        // Vector points; payload is the encoded PointPayload
        sqlx::query(&format!(
            r"
            CREATE TABLE IF NOT EXISTS vector_points (
                collection VARCHAR(255) NOT NULL,
                point_id VARCHAR(255) NOT NULL,
                embedding VECTOR({dimension}) NOT NULL,
                payload JSONB NOT NULL,
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                PRIMARY KEY (collection, point_id)
            )
            "
        ))
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vector_points_project ON vector_points(collection, (payload->>'project_id'))",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vector_points_embedding ON vector_points USING hnsw (embedding vector_cosine_ops)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Database schema initialized (embedding dimension {})", dimension);
        Ok(())
    }
}

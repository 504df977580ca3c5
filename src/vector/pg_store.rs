//! [`VectorStore`] on Postgres with the pgvector extension.
//!
//! Points are rows of `vector_points`; payloads are JSONB, so filters compile
//! to JSON operators with every key and value bound as a parameter.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::PgPool;
use sqlx::Postgres;
use sqlx::QueryBuilder;
use sqlx::Row;
use tracing::debug;

use super::Condition;
use super::FacetField;
use super::FacetHit;
use super::Filter;
use super::PointPayload;
use super::ScoredPoint;
use super::SearchQuery;
use super::VectorPoint;
use super::VectorStore;
use crate::KnowRagError;
use crate::Result;

#[derive(Debug, Clone)]
pub struct PgVectorStore {
    pool: PgPool,
}

impl PgVectorStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Append ` AND <condition>` for every clause; `column` is the JSONB
/// expression the keys are looked up in
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, column: &str, filter: &Filter, depth: usize) {
    for condition in &filter.must {
        qb.push(" AND ");
        push_condition(qb, column, condition, depth);
    }
}

fn push_condition(
    qb: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    condition: &Condition,
    depth: usize,
) {
    match condition {
        Condition::MatchAny { key, values } => {
            // Scalar equality, or overlap when the field is an array of strings
            qb.push("(CASE WHEN jsonb_typeof(");
            qb.push(column);
            qb.push("->");
            qb.push_bind(key.clone());
            qb.push(") = 'array' THEN EXISTS (SELECT 1 FROM jsonb_array_elements_text(");
            qb.push(column);
            qb.push("->");
            qb.push_bind(key.clone());
            qb.push(") AS v WHERE v = ANY(");
            qb.push_bind(values.clone());
            qb.push(")) ELSE ");
            qb.push(column);
            qb.push("->>");
            qb.push_bind(key.clone());
            qb.push(" = ANY(");
            qb.push_bind(values.clone());
            qb.push(") END)");
        }
        Condition::Range { key, gte, lte } => {
            qb.push("(jsonb_typeof(");
            qb.push(column);
            qb.push("->");
            qb.push_bind(key.clone());
            qb.push(") = 'number'");
            if let Some(gte) = gte {
                qb.push(" AND (");
                qb.push(column);
                qb.push("->>");
                qb.push_bind(key.clone());
                qb.push(")::DOUBLE PRECISION >= ");
                qb.push_bind(*gte);
            }
            if let Some(lte) = lte {
                qb.push(" AND (");
                qb.push(column);
                qb.push("->>");
                qb.push_bind(key.clone());
                qb.push(")::DOUBLE PRECISION <= ");
                qb.push_bind(*lte);
            }
            qb.push(")");
        }
        Condition::Nested { key, filter } => {
            let alias = format!("elem{depth}");
            qb.push("EXISTS (SELECT 1 FROM jsonb_array_elements(CASE WHEN jsonb_typeof(");
            qb.push(column);
            qb.push("->");
            qb.push_bind(key.clone());
            qb.push(") = 'array' THEN ");
            qb.push(column);
            qb.push("->");
            qb.push_bind(key.clone());
            qb.push(" ELSE '[]'::jsonb END) AS ");
            qb.push(&alias);
            qb.push(" WHERE TRUE");
            push_filter(qb, &alias, filter, depth + 1);
            qb.push(")");
        }
    }
}

fn store_error(context: &str, e: sqlx::Error) -> KnowRagError {
    KnowRagError::VectorStore(format!("{context}: {e}"))
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn upsert_points(&self, collection: &str, points: &[VectorPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let mut rows = Vec::with_capacity(points.len());
        for point in points {
            rows.push((
                point.id.clone(),
                Vector::from(point.vector.clone()),
                point.payload.encode()?,
            ));
        }

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO vector_points (collection, point_id, embedding, payload) ",
        );
        qb.push_values(rows, |mut b, (id, vector, payload)| {
            b.push_bind(collection.to_string())
                .push_bind(id)
                .push_bind(vector)
                .push_bind(payload);
        });
        qb.push(
            " ON CONFLICT (collection, point_id) DO UPDATE SET embedding = EXCLUDED.embedding, payload = EXCLUDED.payload, updated_at = NOW()",
        );

        qb.build()
            .execute(&self.pool)
            .await
            .map_err(|e| KnowRagError::VectorStoreUpsert(e.to_string()))?;

        debug!("Upserted {} points into {}", points.len(), collection);
        Ok(())
    }

    async fn search(&self, collection: &str, query: &SearchQuery) -> Result<Vec<ScoredPoint>> {
        let vector = Vector::from(query.vector.clone());
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);

        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT point_id, payload, (1 - (embedding <=> ",
        );
        qb.push_bind(vector.clone());
        qb.push("))::REAL AS score FROM vector_points WHERE collection = ");
        qb.push_bind(collection.to_string());
        push_filter(&mut qb, "payload", &query.filter, 0);
        qb.push(" ORDER BY embedding <=> ");
        qb.push_bind(vector);
        qb.push(" LIMIT ");
        qb.push_bind(limit);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("search failed", e))?;

        rows.iter()
            .map(|row| -> Result<ScoredPoint> {
                let payload: serde_json::Value = row
                    .try_get("payload")
                    .map_err(|e| store_error("bad payload column", e))?;
                Ok(ScoredPoint {
                    id: row
                        .try_get("point_id")
                        .map_err(|e| store_error("bad point_id column", e))?,
                    score: row
                        .try_get("score")
                        .map_err(|e| store_error("bad score column", e))?,
                    payload: PointPayload::decode(payload)?,
                })
            })
            .collect()
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM vector_points WHERE collection = ");
        qb.push_bind(collection.to_string());
        push_filter(&mut qb, "payload", filter, 0);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("count failed", e))?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn facet(
        &self,
        collection: &str,
        field: &FacetField,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<FacetHit>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        match field {
            FacetField::Field(key) => {
                qb.push("payload->>");
                qb.push_bind(key.clone());
                qb.push(" AS value, COUNT(*) AS count FROM vector_points WHERE collection = ");
            }
            FacetField::Nested { array, field } => {
                qb.push("facet_elem->>");
                qb.push_bind(field.clone());
                qb.push(" AS value, COUNT(DISTINCT point_id) AS count FROM vector_points, jsonb_array_elements(CASE WHEN jsonb_typeof(payload->");
                qb.push_bind(array.clone());
                qb.push(") = 'array' THEN payload->");
                qb.push_bind(array.clone());
                qb.push(" ELSE '[]'::jsonb END) AS facet_elem WHERE collection = ");
            }
        }
        qb.push_bind(collection.to_string());
        push_filter(&mut qb, "payload", filter, 0);
        qb.push(" GROUP BY 1 ORDER BY count DESC, value ASC LIMIT ");
        qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("facet failed", e))?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let value: Option<String> = row
                .try_get("value")
                .map_err(|e| store_error("bad facet value", e))?;
            let count: i64 = row
                .try_get("count")
                .map_err(|e| store_error("bad facet count", e))?;
            if let Some(value) = value {
                hits.push(FacetHit {
                    value,
                    count: u64::try_from(count).unwrap_or(0),
                });
            }
        }
        Ok(hits)
    }
}

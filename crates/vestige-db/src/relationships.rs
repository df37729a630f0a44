//! Relationship store implementation.
//!
//! Edges live in `image_relationship` with a unique constraint on
//! `(owner_id, endpoint_a, endpoint_b)` and a check that the pair is stored
//! in canonical order, so concurrent creators of the same pair converge on
//! one row.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use vestige_core::{canonical_pair, Error, RelationshipEdge, RelationshipStore, Result};

const EDGE_COLUMNS: &str = "relationship_id, owner_id, endpoint_a, endpoint_b, source_type, \
     source_analysis_id, weight, metadata, created_at, created_by";

/// PostgreSQL implementation of RelationshipStore.
#[derive(Clone)]
pub struct PgRelationshipStore {
    pool: Pool<Postgres>,
}

impl PgRelationshipStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_edge_row(row: sqlx::postgres::PgRow) -> Result<RelationshipEdge> {
        let source_type: String = row.try_get("source_type").map_err(Error::Database)?;
        Ok(RelationshipEdge {
            relationship_id: row.try_get("relationship_id").map_err(Error::Database)?,
            owner_id: row.try_get("owner_id").map_err(Error::Database)?,
            endpoint_a: row.try_get("endpoint_a").map_err(Error::Database)?,
            endpoint_b: row.try_get("endpoint_b").map_err(Error::Database)?,
            source_type: source_type.parse().map_err(|_| {
                Error::Storage(format!("unknown source type in row: {}", source_type))
            })?,
            source_analysis_id: row.try_get("source_analysis_id").map_err(Error::Database)?,
            weight: row.try_get("weight").map_err(Error::Database)?,
            metadata: row.try_get("metadata").map_err(Error::Database)?,
            created_at: row.try_get("created_at").map_err(Error::Database)?,
            created_by: row.try_get("created_by").map_err(Error::Database)?,
        })
    }
}

#[async_trait]
impl RelationshipStore for PgRelationshipStore {
    async fn find_by_pair(
        &self,
        owner_id: &str,
        a: &str,
        b: &str,
    ) -> Result<Option<RelationshipEdge>> {
        let (low, high) = canonical_pair(a, b);
        let row = sqlx::query(&format!(
            "SELECT {EDGE_COLUMNS} FROM image_relationship
             WHERE owner_id = $1 AND endpoint_a = $2 AND endpoint_b = $3"
        ))
        .bind(owner_id)
        .bind(low)
        .bind(high)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_edge_row).transpose()
    }

    async fn find_by_id(&self, owner_id: &str, id: Uuid) -> Result<Option<RelationshipEdge>> {
        let row = sqlx::query(&format!(
            "SELECT {EDGE_COLUMNS} FROM image_relationship
             WHERE relationship_id = $1 AND owner_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_edge_row).transpose()
    }

    async fn insert(&self, edge: RelationshipEdge) -> Result<RelationshipEdge> {
        if edge.endpoint_a >= edge.endpoint_b {
            return Err(Error::Validation(format!(
                "relationship endpoints not in canonical order: {} / {}",
                edge.endpoint_a, edge.endpoint_b
            )));
        }

        let row = sqlx::query(&format!(
            "INSERT INTO image_relationship ({EDGE_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (owner_id, endpoint_a, endpoint_b) DO NOTHING
             RETURNING {EDGE_COLUMNS}"
        ))
        .bind(edge.relationship_id)
        .bind(&edge.owner_id)
        .bind(&edge.endpoint_a)
        .bind(&edge.endpoint_b)
        .bind(edge.source_type.as_str())
        .bind(&edge.source_analysis_id)
        .bind(edge.weight)
        .bind(&edge.metadata)
        .bind(edge.created_at)
        .bind(&edge.created_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if let Some(row) = row {
            return Self::parse_edge_row(row);
        }

        // Lost the race to a concurrent creator of the same pair.
        self.find_by_pair(&edge.owner_id, &edge.endpoint_a, &edge.endpoint_b)
            .await?
            .ok_or_else(|| {
                Error::Storage(format!(
                    "relationship {} / {} conflicted but could not be re-read",
                    edge.endpoint_a, edge.endpoint_b
                ))
            })
    }

    async fn update_weight(
        &self,
        owner_id: &str,
        id: Uuid,
        weight: f64,
        metadata: Option<JsonValue>,
    ) -> Result<Option<RelationshipEdge>> {
        let row = sqlx::query(&format!(
            "UPDATE image_relationship
             SET weight = $3, metadata = COALESCE($4, metadata)
             WHERE relationship_id = $1 AND owner_id = $2 AND weight < $3
             RETURNING {EDGE_COLUMNS}"
        ))
        .bind(id)
        .bind(owner_id)
        .bind(weight)
        .bind(&metadata)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_edge_row).transpose()
    }

    async fn delete(&self, owner_id: &str, id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM image_relationship WHERE relationship_id = $1 AND owner_id = $2")
                .bind(id)
                .bind(owner_id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_for_endpoint(&self, owner_id: &str, endpoint_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM image_relationship
             WHERE owner_id = $1 AND (endpoint_a = $2 OR endpoint_b = $2)",
        )
        .bind(owner_id)
        .bind(endpoint_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn find_all_for_endpoint(
        &self,
        owner_id: &str,
        endpoint_id: &str,
    ) -> Result<Vec<RelationshipEdge>> {
        let rows = sqlx::query(&format!(
            "SELECT {EDGE_COLUMNS} FROM image_relationship
             WHERE owner_id = $1 AND (endpoint_a = $2 OR endpoint_b = $2)
             ORDER BY created_at, relationship_id"
        ))
        .bind(owner_id)
        .bind(endpoint_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_edge_row).collect()
    }
}

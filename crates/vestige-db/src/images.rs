//! Image collaborator backed by the upload service's `image` table.
//!
//! Every failure here is reported as `CollaboratorUnavailable` so callers can
//! tell a missing image (`Ok(None)`) from an unreachable one.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use vestige_core::{Error, ImageDirectory, ImageSummary, Result};

#[derive(Clone)]
pub struct PgImageDirectory {
    pool: Pool<Postgres>,
}

impl PgImageDirectory {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn unavailable(e: sqlx::Error) -> Error {
        Error::CollaboratorUnavailable(format!("image lookup failed: {}", e))
    }
}

#[async_trait]
impl ImageDirectory for PgImageDirectory {
    async fn lookup(&self, owner_id: &str, image_id: &str) -> Result<Option<ImageSummary>> {
        let row = sqlx::query(
            "SELECT image_id, filename, file_size, is_flagged FROM image
             WHERE owner_id = $1 AND image_id = $2",
        )
        .bind(owner_id)
        .bind(image_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::unavailable)?;

        row.map(|row| -> Result<ImageSummary> {
            Ok(ImageSummary {
                id: row.try_get("image_id").map_err(Self::unavailable)?,
                label: row.try_get("filename").map_err(Self::unavailable)?,
                is_flagged: row.try_get("is_flagged").map_err(Self::unavailable)?,
                size: row.try_get("file_size").map_err(Self::unavailable)?,
            })
        })
        .transpose()
    }

    async fn set_flagged(&self, owner_id: &str, image_ids: &[String]) -> Result<u64> {
        if image_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE image SET is_flagged = TRUE
             WHERE owner_id = $1 AND image_id = ANY($2) AND NOT is_flagged",
        )
        .bind(owner_id)
        .bind(image_ids)
        .execute(&self.pool)
        .await
        .map_err(Self::unavailable)?;
        Ok(result.rows_affected())
    }
}

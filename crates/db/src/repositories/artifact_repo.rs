//! Repository for the `artifacts` table.

use sqlx::PgPool;

use genflow_core::types::DbId;

use crate::models::artifact::{Artifact, CreateArtifact};

/// Column list for `artifacts` queries.
const COLUMNS: &str = "\
    id, media_type, origin_provider_id, remote_url, local_path, \
    provider_uploads, created_at";

/// Provides CRUD operations for artifacts.
pub struct ArtifactRepo;

impl ArtifactRepo {
    /// Insert a new artifact with an empty provider-upload cache.
    pub async fn create(pool: &PgPool, input: &CreateArtifact) -> Result<Artifact, sqlx::Error> {
        let query = format!(
            "INSERT INTO artifacts (media_type, origin_provider_id, remote_url, local_path) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Artifact>(&query)
            .bind(&input.media_type)
            .bind(&input.origin_provider_id)
            .bind(&input.remote_url)
            .bind(&input.local_path)
            .fetch_one(pool)
            .await
    }

    /// Find an artifact by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Artifact>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM artifacts WHERE id = $1");
        sqlx::query_as::<_, Artifact>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Record a provider-side asset id in the upload cache so the same
    /// bytes are never uploaded to that provider again.
    pub async fn cache_provider_upload(
        pool: &PgPool,
        id: DbId,
        provider_id: &str,
        provider_asset_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE artifacts \
             SET provider_uploads = jsonb_set(provider_uploads, ARRAY[$2], to_jsonb($3::TEXT)) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(provider_id)
        .bind(provider_asset_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

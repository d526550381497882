use crate::{
    assets::AssetRole,
    error::ApiResult,
    models::{Map, NewMap, ProfileChanges, UpdateMapRequest, UserRecord},
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use std::sync::Arc;

/// Upper bound on `limit` for paginated listings.
pub const MAX_PAGE_SIZE: i64 = 100;

/// MapFilter
///
/// Visibility scope of a listing. The public scope is fixed to published maps;
/// callers cannot widen it through query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapFilter {
    Published,
    Owner(i64),
    All,
}

/// Page
///
/// Normalized pagination window (1-based page).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(10).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Repository Trait
///
/// Persistence contract. The asset registry relies on two properties only:
/// unique constraints on `maps.slug` and `users.email`, and atomic single-row
/// updates (`set_asset_key` touches exactly one column, `merge_layer` one JSON key).
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i64) -> ApiResult<Option<UserRecord>>;
    async fn get_user_by_email(&self, email: &str) -> ApiResult<Option<UserRecord>>;
    async fn update_user(&self, id: i64, changes: ProfileChanges) -> ApiResult<Option<UserRecord>>;

    // --- Maps ---
    async fn create_map(&self, new_map: NewMap, owner_id: i64) -> ApiResult<Map>;
    async fn get_map(&self, id: i64) -> ApiResult<Option<Map>>;
    async fn get_map_by_slug(&self, slug: &str) -> ApiResult<Option<Map>>;
    /// Returns the requested page and the total row count of the scope.
    async fn list_maps(&self, filter: MapFilter, page: Page) -> ApiResult<(Vec<Map>, i64)>;
    /// Metadata-only partial update (COALESCE semantics). Never touches asset columns.
    async fn update_map(&self, id: i64, changes: UpdateMapRequest) -> ApiResult<Option<Map>>;
    async fn set_published(&self, id: i64, is_published: bool) -> ApiResult<Option<Map>>;
    /// Deletes the row only; stored objects are left in the bucket.
    async fn delete_map(&self, id: i64) -> ApiResult<bool>;

    // --- Asset registry primitives ---
    /// Targeted update of the single column owned by `role`.
    async fn set_asset_key(&self, id: i64, role: AssetRole, key: &str) -> ApiResult<Option<Map>>;
    /// Merges `name -> payload` into `geojson_layers`; last write wins per name.
    async fn merge_layer(
        &self,
        id: i64,
        name: &str,
        payload: serde_json::Value,
    ) -> ApiResult<Option<Map>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Queries are checked at runtime (`query_as`)
/// so the crate builds without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: MapFilter) {
    match filter {
        MapFilter::Published => {
            builder.push(" WHERE is_published = true");
        }
        MapFilter::Owner(user_id) => {
            builder.push(" WHERE user_id = ");
            builder.push_bind(user_id);
        }
        MapFilter::All => {}
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: i64) -> ApiResult<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> ApiResult<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_user(&self, id: i64, changes: ProfileChanges) -> ApiResult<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.username)
        .bind(changes.email)
        .bind(changes.password_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// create_map
    ///
    /// A duplicate slug surfaces as `ApiError::Conflict` through the unique constraint.
    async fn create_map(&self, new_map: NewMap, owner_id: i64) -> ApiResult<Map> {
        let map = sqlx::query_as::<_, Map>(
            r#"
            INSERT INTO maps (title, description, location, slug, user_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(new_map.title)
        .bind(new_map.description)
        .bind(new_map.location)
        .bind(new_map.slug)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(map)
    }

    async fn get_map(&self, id: i64) -> ApiResult<Option<Map>> {
        let map = sqlx::query_as::<_, Map>("SELECT * FROM maps WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(map)
    }

    async fn get_map_by_slug(&self, slug: &str) -> ApiResult<Option<Map>> {
        let map = sqlx::query_as::<_, Map>("SELECT * FROM maps WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(map)
    }

    /// list_maps
    ///
    /// Builds the scope filter with QueryBuilder so every value stays a bound parameter.
    async fn list_maps(&self, filter: MapFilter, page: Page) -> ApiResult<(Vec<Map>, i64)> {
        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM maps");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM maps");
        push_filter(&mut select, filter);
        select.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        select.push_bind(page.limit);
        select.push(" OFFSET ");
        select.push_bind(page.offset());

        let maps = select.build_query_as::<Map>().fetch_all(&self.pool).await?;
        Ok((maps, total))
    }

    async fn update_map(&self, id: i64, changes: UpdateMapRequest) -> ApiResult<Option<Map>> {
        let map = sqlx::query_as::<_, Map>(
            r#"
            UPDATE maps
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                location = COALESCE($4, location),
                slug = COALESCE($5, slug),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.location)
        .bind(changes.slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(map)
    }

    async fn set_published(&self, id: i64, is_published: bool) -> ApiResult<Option<Map>> {
        let map = sqlx::query_as::<_, Map>(
            "UPDATE maps SET is_published = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(is_published)
        .fetch_optional(&self.pool)
        .await?;
        Ok(map)
    }

    async fn delete_map(&self, id: i64) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM maps WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// set_asset_key
    ///
    /// The column name comes from the closed `AssetRole` enum, never from input.
    async fn set_asset_key(&self, id: i64, role: AssetRole, key: &str) -> ApiResult<Option<Map>> {
        let sql = format!(
            "UPDATE maps SET {} = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
            role.column()
        );
        let map = sqlx::query_as::<_, Map>(&sql)
            .bind(id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(map)
    }

    /// merge_layer
    ///
    /// JSONB concatenation merges a single key in one statement.
    async fn merge_layer(
        &self,
        id: i64,
        name: &str,
        payload: serde_json::Value,
    ) -> ApiResult<Option<Map>> {
        let map = sqlx::query_as::<_, Map>(
            r#"
            UPDATE maps
            SET geojson_layers = COALESCE(geojson_layers, '{}'::jsonb) || jsonb_build_object($2::text, $3::jsonb),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(payload)
        .fetch_optional(&self.pool)
        .await?;
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_defaults_and_bounds() {
        assert_eq!(Page::default(), Page { page: 1, limit: 10 });
        assert_eq!(Page::new(Some(0), Some(1000)), Page { page: 1, limit: MAX_PAGE_SIZE });
        assert_eq!(Page::new(Some(3), Some(20)).offset(), 40);
    }

    #[test]
    fn far_page_offset_saturates() {
        let page = Page::new(Some(i64::MAX), Some(10));
        assert_eq!(page.offset(), i64::MAX);
    }
}

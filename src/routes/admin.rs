use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// Nested under `/admin`. Authentication comes from the extractor; every handler
/// rejects non-admin callers with 403 before touching the repository.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/maps
        // All maps, unpublished ones included.
        .route("/maps", get(handlers::get_admin_maps))
        // PUT /admin/maps/{id}/publish
        // Publish or hide a map.
        .route("/maps/{id}/publish", put(handlers::set_map_published))
}

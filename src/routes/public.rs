use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable by anonymous clients. A caller who does present credentials
/// is still resolved (`Option<AuthUser>`), so owners can read their own unpublished
/// maps through the same URLs.
///
/// Every single-map read goes through the guard: a private map answers 404 exactly
/// like a missing one.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/login
        // Administrator login. Returns a signed session token.
        .route("/auth/login", post(handlers::login))
        // GET /maps?page=&limit=
        // Published maps only, paginated.
        .route("/maps", get(handlers::list_maps))
        // GET /maps/{id}
        .route("/maps/{id}", get(handlers::get_map))
        // GET /maps/slug/{slug}
        .route("/maps/slug/{slug}", get(handlers::get_map_by_slug))
        // GET /maps/slug/{slug}/file/{role}
        // Signed download URL for one asset, addressed by slug.
        .route(
            "/maps/slug/{slug}/file/{role}",
            get(handlers::get_file_by_slug),
        )
        // GET /maps/{id}/assets/{role}
        // Signed download URL for one asset.
        .route("/maps/{id}/assets/{role}", get(handlers::get_asset_url))
        // GET /maps/{id}/assets/{role}/objects
        // Signed download URLs for every object of a folder role.
        .route(
            "/maps/{id}/assets/{role}/objects",
            get(handlers::list_folder_objects),
        )
}

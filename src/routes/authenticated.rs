use crate::{AppState, handlers, registry};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Routes for any logged-in user. The auth middleware layered on this router
/// rejects anonymous requests with 401 before a handler runs; handlers then pass
/// the resolved `AuthUser` to the guard for the owner-only checks.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PUT /auth/me
        // Read or update the caller's own profile.
        .route("/auth/me", get(handlers::get_me).put(handlers::update_me))
        // GET /me/maps
        // Every map the caller owns, including unpublished ones.
        .route("/me/maps", get(handlers::get_my_maps))
        // --- Map Lifecycle ---
        // POST /maps
        .route("/maps", post(handlers::create_map))
        // PUT/DELETE /maps/{id}
        // Metadata update and deletion, owner (or admin) only.
        .route(
            "/maps/{id}",
            put(handlers::update_map).delete(handlers::delete_map),
        )
        // --- Asset Registry ---
        // POST /maps/{id}/assets/upload-url
        // Signed PUT URL for direct client-to-storage upload of one role.
        .route(
            "/maps/{id}/assets/upload-url",
            post(handlers::request_upload_url),
        )
        // PUT /maps/{id}/assets
        // Registers an uploaded key against a role.
        .route("/maps/{id}/assets", put(handlers::record_asset))
        // POST /maps/{id}/assets/batch
        // Server-side multipart upload; per-file outcomes.
        .route(
            "/maps/{id}/assets/batch",
            post(handlers::batch_upload).layer(DefaultBodyLimit::max(
                registry::MAX_BATCH_FILES * registry::MAX_BATCH_FILE_BYTES,
            )),
        )
        // PUT /maps/{id}/layers/{name}
        .route("/maps/{id}/layers/{name}", put(handlers::record_layer))
}

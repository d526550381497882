use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Asset registry core: key namespace, storage gateway, guard, registry.
pub mod assets;
pub mod guard;
pub mod registry;
pub mod storage;

// Persistence, identity and shared types.
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod password;
pub mod repository;
pub mod slug;

// HTTP surface.
pub mod handlers;
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use registry::MapAssetRegistry;
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document served at `/api-docs/openapi.json` and rendered by Swagger UI.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::get_me, handlers::update_me,
        handlers::list_maps, handlers::get_my_maps, handlers::get_map, handlers::get_map_by_slug,
        handlers::create_map, handlers::update_map, handlers::delete_map,
        handlers::request_upload_url, handlers::record_asset, handlers::record_layer,
        handlers::batch_upload, handlers::get_asset_url, handlers::get_file_by_slug,
        handlers::list_folder_objects, handlers::get_admin_maps, handlers::set_map_published
    ),
    components(
        schemas(
            models::Map, models::User, models::CreateMapRequest, models::UpdateMapRequest,
            models::UploadUrlRequest, models::UploadUrlResponse, models::RecordAssetRequest,
            models::DownloadUrlResponse, models::FolderObject, models::BatchItemOutcome,
            models::BatchUploadForm, models::BatchUploadResponse, models::LoginRequest,
            models::LoginResponse, models::UpdateProfileRequest, models::PublishRequest,
            models::PageMeta, models::MapPage, assets::AssetRole, assets::BatchClass,
            error::ErrorBody,
        )
    ),
    tags(
        (name = "cartonord", description = "Map publishing API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Unified state shared by every request: persistence, object storage and the
/// immutable configuration.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub storage: StorageState,
    pub config: AppConfig,
}

impl AppState {
    /// The asset registry bound to this state's repository, storage and TTLs.
    pub fn registry(&self) -> MapAssetRegistry {
        MapAssetRegistry::new(self.repo.clone(), self.storage.clone(), &self.config)
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Runs the `AuthUser` extractor ahead of the authenticated routes. A missing or
/// invalid credential is rejected with 401 before the handler executes.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routers, the auth layer and the observability stack.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Admin checks happen inside the handlers.
        .nest("/admin", admin::admin_routes())
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, correlated by the `x-request-id` header.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}

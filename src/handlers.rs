use crate::{
    AppState,
    assets::{AssetRole, BatchClass},
    auth::{AuthUser, issue_token},
    error::{ApiError, ApiResult, ErrorBody},
    guard,
    models::{
        BatchUploadForm, BatchUploadResponse, CreateMapRequest, DownloadUrlResponse,
        FolderObject, LoginRequest, LoginResponse, Map, MapPage, NewMap, PageMeta,
        ProfileChanges, PublishRequest, RecordAssetRequest, UpdateMapRequest,
        UpdateProfileRequest, UploadUrlRequest, UploadUrlResponse, User,
    },
    password::{hash_password, verify_password},
    registry::BatchFile,
    repository::{MapFilter, Page},
    slug::{is_url_safe, slugify},
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

// --- Query Structs ---

/// PageQuery
///
/// Pagination parameters shared by every map listing.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct PageQuery {
    /// 1-based page number (default 1).
    pub page: Option<i64>,
    /// Page size (default 10, capped at 100).
    pub limit: Option<i64>,
}

impl From<PageQuery> for Page {
    fn from(query: PageQuery) -> Self {
        Page::new(query.page, query.limit)
    }
}

// --- Helpers ---

fn require_admin(user: &AuthUser) -> ApiResult<()> {
    if user.is_admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

fn non_empty(value: &str, field: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// An explicit slug must already be URL-safe; otherwise it is derived from the title.
fn resolve_slug(explicit: Option<&str>, title: &str) -> ApiResult<String> {
    match explicit {
        Some(slug) if is_url_safe(slug) => Ok(slug.to_string()),
        Some(slug) => Err(ApiError::validation(format!(
            "Slug '{slug}' is not URL-safe (expected e.g. '{}')",
            slugify(slug)
        ))),
        None => {
            let derived = slugify(title);
            if derived.is_empty() {
                return Err(ApiError::validation(
                    "Title must contain at least one letter or digit",
                ));
            }
            Ok(derived)
        }
    }
}

async fn listing(state: &AppState, filter: MapFilter, query: PageQuery) -> ApiResult<Json<MapPage>> {
    let page = Page::from(query);
    let (maps, total) = state.repo.list_maps(filter, page).await?;
    Ok(Json(MapPage {
        maps,
        meta: PageMeta::new(total, page.page, page.limit),
    }))
}

async fn load_map(state: &AppState, id: i64) -> ApiResult<Map> {
    state.repo.get_map(id).await?.ok_or(ApiError::NotFound)
}

// --- Auth Handlers ---

/// login
///
/// [Public Route] Exchanges admin credentials for a session token.
/// Unknown email and wrong password are reported identically.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Not an administrator", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let user = state
        .repo
        .get_user_by_email(payload.email.trim())
        .await?
        .filter(|user| verify_password(&payload.password, &user.password_hash))
        .ok_or(ApiError::AuthenticationRequired)?;

    if !user.is_admin {
        tracing::warn!(user_id = user.id, "Login refused: account is not an administrator");
        return Err(ApiError::Forbidden);
    }

    let token = issue_token(user.id, &state.config.jwt_secret, state.config.jwt_ttl_hours)?;
    tracing::info!(user_id = user.id, "User logged in");

    Ok(Json(LoginResponse {
        token,
        user: User::from(user),
    }))
}

/// get_me
///
/// [Authenticated Route] Profile of the caller.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses((status = 200, description = "Profile", body = User))
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<User>> {
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or(ApiError::AuthenticationRequired)?;
    Ok(Json(User::from(user)))
}

/// update_me
///
/// [Authenticated Route] Partial update of the caller's username, email or password.
/// A new password is hashed before it reaches the repository.
#[utoipa::path(
    put,
    path = "/auth/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 409, description = "Email already in use", body = ErrorBody)
    )
)]
pub async fn update_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let username = payload
        .username
        .as_deref()
        .map(|name| non_empty(name, "Username"))
        .transpose()?;

    let email = match payload.email.as_deref().map(str::trim) {
        Some(email) if !email.contains('@') => {
            return Err(ApiError::validation("Email address is invalid"));
        }
        other => other.map(str::to_string),
    };

    let password_hash = match payload.password.as_deref() {
        Some(password) if password.is_empty() => {
            return Err(ApiError::validation("Password must not be empty"));
        }
        Some(password) => Some(hash_password(password)?),
        None => None,
    };

    let user = state
        .repo
        .update_user(
            id,
            ProfileChanges {
                username,
                email,
                password_hash,
            },
        )
        .await?
        .ok_or(ApiError::AuthenticationRequired)?;

    Ok(Json(User::from(user)))
}

// --- Map Handlers ---

/// list_maps
///
/// [Public Route] Published maps, newest first. The scope is fixed: no query
/// parameter can widen it to unpublished maps.
#[utoipa::path(
    get,
    path = "/maps",
    params(PageQuery),
    responses((status = 200, description = "Published maps", body = MapPage))
)]
pub async fn list_maps(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<MapPage>> {
    listing(&state, MapFilter::Published, query).await
}

/// get_my_maps
///
/// [Authenticated Route] Every map owned by the caller, published or not.
#[utoipa::path(
    get,
    path = "/me/maps",
    params(PageQuery),
    responses((status = 200, description = "My maps", body = MapPage))
)]
pub async fn get_my_maps(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<MapPage>> {
    listing(&state, MapFilter::Owner(id), query).await
}

/// get_map
///
/// [Public Route] A single map. Unpublished maps answer 404 to everyone but
/// their owner and administrators.
#[utoipa::path(
    get,
    path = "/maps/{id}",
    params(("id" = i64, Path, description = "Map ID")),
    responses(
        (status = 200, description = "Found", body = Map),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_map(
    caller: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Map>> {
    let map = load_map(&state, id).await?;
    guard::require_read(caller.as_ref(), &map)?;
    Ok(Json(map))
}

/// get_map_by_slug
#[utoipa::path(
    get,
    path = "/maps/slug/{slug}",
    params(("slug" = String, Path, description = "Map slug")),
    responses(
        (status = 200, description = "Found", body = Map),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_map_by_slug(
    caller: Option<AuthUser>,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Map>> {
    let map = state
        .repo
        .get_map_by_slug(&slug)
        .await?
        .ok_or(ApiError::NotFound)?;
    guard::require_read(caller.as_ref(), &map)?;
    Ok(Json(map))
}

/// create_map
///
/// [Authenticated Route] Creates a map owned by the caller. The slug is taken
/// from the payload or derived from the title; a taken slug is a 409.
#[utoipa::path(
    post,
    path = "/maps",
    request_body = CreateMapRequest,
    responses(
        (status = 201, description = "Created", body = Map),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 409, description = "Slug already taken", body = ErrorBody)
    )
)]
pub async fn create_map(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateMapRequest>,
) -> ApiResult<(StatusCode, Json<Map>)> {
    let title = non_empty(&payload.title, "Title")?;
    let slug = resolve_slug(payload.slug.as_deref(), &title)?;

    let map = state
        .repo
        .create_map(
            NewMap {
                title,
                description: payload.description,
                location: payload.location,
                slug,
            },
            id,
        )
        .await?;

    tracing::info!(map_id = map.id, slug = %map.slug, owner = id, "Map created");
    Ok((StatusCode::CREATED, Json(map)))
}

/// update_map
///
/// [Authenticated Route] Metadata-only update. Asset references are never
/// touched here; they go through the asset endpoints.
#[utoipa::path(
    put,
    path = "/maps/{id}",
    params(("id" = i64, Path, description = "Map ID")),
    request_body = UpdateMapRequest,
    responses(
        (status = 200, description = "Updated", body = Map),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Slug already taken", body = ErrorBody)
    )
)]
pub async fn update_map(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(mut payload): Json<UpdateMapRequest>,
) -> ApiResult<Json<Map>> {
    let map = load_map(&state, id).await?;
    guard::require_write(&user, &map)?;

    if let Some(title) = payload.title.as_deref() {
        payload.title = Some(non_empty(title, "Title")?);
    }
    if let Some(slug) = payload.slug.as_deref() {
        payload.slug = Some(resolve_slug(Some(slug), &map.title)?);
    }

    let updated = state
        .repo
        .update_map(id, payload)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(updated))
}

/// delete_map
///
/// [Authenticated Route] Removes the map row. Stored objects stay in the bucket.
#[utoipa::path(
    delete,
    path = "/maps/{id}",
    params(("id" = i64, Path, description = "Map ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn delete_map(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let map = load_map(&state, id).await?;
    guard::require_write(&user, &map)?;

    if state.repo.delete_map(id).await? {
        tracing::info!(map_id = id, "Map deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// --- Asset Handlers ---

/// request_upload_url
///
/// [Authenticated Route] Returns a short-lived signed PUT URL for one asset role,
/// together with the key the client must register once the upload succeeds.
#[utoipa::path(
    post,
    path = "/maps/{id}/assets/upload-url",
    params(("id" = i64, Path, description = "Map ID")),
    request_body = UploadUrlRequest,
    responses(
        (status = 200, description = "Signed URL", body = UploadUrlResponse),
        (status = 400, description = "Unknown role or bad extension", body = ErrorBody),
        (status = 502, description = "Storage unavailable", body = ErrorBody)
    )
)]
pub async fn request_upload_url(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UploadUrlRequest>,
) -> ApiResult<Json<UploadUrlResponse>> {
    let role: AssetRole = payload.role.parse()?;
    let response = state
        .registry()
        .issue_upload_url(id, role, &payload.filename, &user)
        .await?;
    Ok(Json(response))
}

/// record_asset
///
/// [Authenticated Route] Binds an uploaded key to a role. Only the column of that
/// role changes.
#[utoipa::path(
    put,
    path = "/maps/{id}/assets",
    params(("id" = i64, Path, description = "Map ID")),
    request_body = RecordAssetRequest,
    responses(
        (status = 200, description = "Recorded", body = Map),
        (status = 400, description = "Unknown role or foreign key", body = ErrorBody),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn record_asset(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<RecordAssetRequest>,
) -> ApiResult<Json<Map>> {
    // Parsed before anything is loaded or written.
    let role: AssetRole = payload.role.parse()?;
    let map = state
        .registry()
        .record_asset_key(id, role, &payload.key, &user)
        .await?;
    Ok(Json(map))
}

/// record_layer
///
/// [Authenticated Route] Stores the request body under `name` in the map's layer
/// mapping. The body may be inline GeoJSON or a storage key string.
#[utoipa::path(
    put,
    path = "/maps/{id}/layers/{name}",
    params(
        ("id" = i64, Path, description = "Map ID"),
        ("name" = String, Path, description = "Layer name")
    ),
    request_body = Object,
    responses(
        (status = 200, description = "Recorded", body = Map),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn record_layer(
    user: AuthUser,
    State(state): State<AppState>,
    Path((id, name)): Path<(i64, String)>,
    Json(payload): Json<serde_json::Value>,
) -> ApiResult<Json<Map>> {
    let map = state
        .registry()
        .record_layer(id, &name, payload, &user)
        .await?;
    Ok(Json(map))
}

/// batch_upload
///
/// [Authenticated Route] Multipart upload of many files of one class. Expects a
/// `class` text field (geojson, pictos or logos) and one `files` part per file.
/// Each file succeeds or fails on its own; the response lists one outcome per
/// file in the order received.
#[utoipa::path(
    post,
    path = "/maps/{id}/assets/batch",
    params(("id" = i64, Path, description = "Map ID")),
    request_body(content = BatchUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Per-file outcomes", body = BatchUploadResponse),
        (status = 400, description = "Missing class or too many files", body = ErrorBody),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn batch_upload(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> ApiResult<Json<BatchUploadResponse>> {
    let mut class: Option<BatchClass> = None;
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "class" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("Read error: {e}")))?;
                class = Some(text.trim().parse()?);
            }
            "files" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(format!("Read error: {e}")))?;
                files.push(BatchFile { filename, data });
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    let class = class.ok_or_else(|| ApiError::validation("class is required"))?;
    let (results, map) = state
        .registry()
        .batch_upload(id, class, files, &user)
        .await?;

    Ok(Json(BatchUploadResponse { class, results, map }))
}

/// get_asset_url
///
/// [Public Route] Signed GET URL for one asset of a readable map. A role with no
/// stored key and a map the caller cannot see both answer 404.
#[utoipa::path(
    get,
    path = "/maps/{id}/assets/{role}",
    params(
        ("id" = i64, Path, description = "Map ID"),
        ("role" = String, Path, description = "Asset role")
    ),
    responses(
        (status = 200, description = "Signed URL", body = DownloadUrlResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_asset_url(
    caller: Option<AuthUser>,
    State(state): State<AppState>,
    Path((id, role)): Path<(i64, String)>,
) -> ApiResult<Json<DownloadUrlResponse>> {
    let role: AssetRole = role.parse()?;
    let map = load_map(&state, id).await?;
    let response = state
        .registry()
        .issue_download_url(&map, role, caller.as_ref())
        .await?;
    Ok(Json(response))
}

/// get_file_by_slug
///
/// [Public Route] Same as `get_asset_url`, addressed by the map's public slug.
#[utoipa::path(
    get,
    path = "/maps/slug/{slug}/file/{role}",
    params(
        ("slug" = String, Path, description = "Map slug"),
        ("role" = String, Path, description = "Asset role")
    ),
    responses(
        (status = 200, description = "Signed URL", body = DownloadUrlResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_file_by_slug(
    caller: Option<AuthUser>,
    State(state): State<AppState>,
    Path((slug, role)): Path<(String, String)>,
) -> ApiResult<Json<DownloadUrlResponse>> {
    let role: AssetRole = role.parse()?;
    let map = state
        .repo
        .get_map_by_slug(&slug)
        .await?
        .ok_or(ApiError::NotFound)?;
    let response = state
        .registry()
        .issue_download_url(&map, role, caller.as_ref())
        .await?;
    Ok(Json(response))
}

/// list_folder_objects
///
/// [Public Route] Signed GET URLs for every pictogram or logo of a readable map.
#[utoipa::path(
    get,
    path = "/maps/{id}/assets/{role}/objects",
    params(
        ("id" = i64, Path, description = "Map ID"),
        ("role" = String, Path, description = "Folder role (pictos or logos)")
    ),
    responses(
        (status = 200, description = "Objects", body = [FolderObject]),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn list_folder_objects(
    caller: Option<AuthUser>,
    State(state): State<AppState>,
    Path((id, role)): Path<(i64, String)>,
) -> ApiResult<Json<Vec<FolderObject>>> {
    let role: AssetRole = role.parse()?;
    let map = load_map(&state, id).await?;
    let objects = state
        .registry()
        .list_folder(&map, role, caller.as_ref())
        .await?;
    Ok(Json(objects))
}

// --- Admin Handlers ---

/// get_admin_maps
///
/// [Admin Route] Every map in the system, unpublished ones included.
#[utoipa::path(
    get,
    path = "/admin/maps",
    params(PageQuery),
    responses(
        (status = 200, description = "All maps", body = MapPage),
        (status = 403, description = "Not an administrator", body = ErrorBody)
    )
)]
pub async fn get_admin_maps(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<MapPage>> {
    require_admin(&user)?;
    listing(&state, MapFilter::All, query).await
}

/// set_map_published
///
/// [Admin Route] Publishes or hides a map.
#[utoipa::path(
    put,
    path = "/admin/maps/{id}/publish",
    params(("id" = i64, Path, description = "Map ID")),
    request_body = PublishRequest,
    responses(
        (status = 200, description = "Updated", body = Map),
        (status = 403, description = "Not an administrator", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn set_map_published(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<PublishRequest>,
) -> ApiResult<Json<Map>> {
    require_admin(&user)?;
    let map = state
        .repo
        .set_published(id, payload.is_published)
        .await?
        .ok_or(ApiError::NotFound)?;

    tracing::info!(map_id = id, is_published = map.is_published, "Publication changed");
    Ok(Json(map))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_derived_from_title_when_absent() {
        assert_eq!(
            resolve_slug(None, "Downtown Tour — 2024!").unwrap(),
            "downtown-tour-2024"
        );
    }

    #[test]
    fn explicit_slug_must_be_url_safe() {
        assert_eq!(resolve_slug(Some("my-map"), "ignored").unwrap(), "my-map");
        assert!(matches!(
            resolve_slug(Some("My Map"), "ignored"),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn title_without_alphanumerics_cannot_produce_a_slug() {
        assert!(matches!(resolve_slug(None, "—!?"), Err(ApiError::Validation(_))));
    }
}

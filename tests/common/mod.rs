#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
};
use cartonord::{
    ApiError, ApiResult, AppConfig, AppState, MapAssetRegistry, create_router,
    assets::AssetRole,
    auth::{AuthUser, DEV_USER_HEADER},
    models::{Map, NewMap, ProfileChanges, UpdateMapRequest, UserRecord},
    password::hash_password,
    repository::{MapFilter, Page, Repository, RepositoryState},
    storage::{MockStorageService, StorageState},
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;

pub const OWNER_ID: i64 = 1;
pub const OTHER_ID: i64 = 2;
pub const ADMIN_ID: i64 = 3;
pub const ADMIN_EMAIL: &str = "admin@cartonord.test";
pub const ADMIN_PASSWORD: &str = "correct horse battery staple";
pub const MEMBER_EMAIL: &str = "owner@cartonord.test";
pub const MEMBER_PASSWORD: &str = "owner-password";

// --- In-memory Repository ---

#[derive(Default)]
struct Tables {
    users: Vec<UserRecord>,
    maps: Vec<Map>,
    next_map_id: i64,
    fail_asset_keys: bool,
}

/// Repository backed by vectors. Mirrors the Postgres constraints the registry
/// relies on: unique slug, single-column asset updates, per-key layer merge.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryRepository {
    /// Owner, another member and an admin, with Argon2 hashes.
    pub fn seeded() -> Self {
        let repo = Self::default();
        {
            let mut tables = repo.tables.lock().unwrap();
            tables.next_map_id = 1;
            tables.users = vec![
                user(OWNER_ID, "owner", MEMBER_EMAIL, MEMBER_PASSWORD, false),
                user(OTHER_ID, "other", "other@cartonord.test", "other-password", false),
                user(ADMIN_ID, "admin", ADMIN_EMAIL, ADMIN_PASSWORD, true),
            ];
        }
        repo
    }

    /// Inserts a map directly, bypassing the HTTP layer.
    pub fn insert_map(&self, owner_id: i64, slug: &str, is_published: bool) -> Map {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_map_id.max(1);
        tables.next_map_id = id + 1;
        let now = Utc::now();
        let map = Map {
            id,
            title: slug.replace('-', " "),
            slug: slug.to_string(),
            user_id: owner_id,
            is_published,
            created_at: now,
            updated_at: now,
            ..Map::default()
        };
        tables.maps.push(map.clone());
        map
    }

    /// Makes every later `set_asset_key` call fail like a lost connection.
    pub fn fail_asset_key_writes(&self) {
        self.tables.lock().unwrap().fail_asset_keys = true;
    }

    pub fn map(&self, id: i64) -> Option<Map> {
        let tables = self.tables.lock().unwrap();
        tables.maps.iter().find(|m| m.id == id).cloned()
    }
}

fn user(id: i64, username: &str, email: &str, password: &str, is_admin: bool) -> UserRecord {
    UserRecord {
        id,
        username: username.to_string(),
        email: email.to_string(),
        password_hash: hash_password(password).unwrap(),
        is_admin,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn slug_taken(maps: &[Map], slug: &str, except: Option<i64>) -> bool {
    maps.iter().any(|m| m.slug == slug && Some(m.id) != except)
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: i64) -> ApiResult<Option<UserRecord>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> ApiResult<Option<UserRecord>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, id: i64, changes: ProfileChanges) -> ApiResult<Option<UserRecord>> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(email) = &changes.email {
            if tables.users.iter().any(|u| &u.email == email && u.id != id) {
                return Err(ApiError::conflict("This email is already in use"));
            }
        }
        let Some(user) = tables.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn create_map(&self, new_map: NewMap, owner_id: i64) -> ApiResult<Map> {
        let mut tables = self.tables.lock().unwrap();
        if slug_taken(&tables.maps, &new_map.slug, None) {
            return Err(ApiError::conflict("A map with this slug already exists"));
        }
        let id = tables.next_map_id.max(1);
        tables.next_map_id = id + 1;
        let now = Utc::now();
        let map = Map {
            id,
            title: new_map.title,
            description: new_map.description,
            location: new_map.location,
            slug: new_map.slug,
            user_id: owner_id,
            is_published: false,
            created_at: now,
            updated_at: now,
            ..Map::default()
        };
        tables.maps.push(map.clone());
        Ok(map)
    }

    async fn get_map(&self, id: i64) -> ApiResult<Option<Map>> {
        Ok(self.map(id))
    }

    async fn get_map_by_slug(&self, slug: &str) -> ApiResult<Option<Map>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.maps.iter().find(|m| m.slug == slug).cloned())
    }

    async fn list_maps(&self, filter: MapFilter, page: Page) -> ApiResult<(Vec<Map>, i64)> {
        let tables = self.tables.lock().unwrap();
        let mut scoped: Vec<Map> = tables
            .maps
            .iter()
            .filter(|m| match filter {
                MapFilter::Published => m.is_published,
                MapFilter::Owner(user_id) => m.user_id == user_id,
                MapFilter::All => true,
            })
            .cloned()
            .collect();
        scoped.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let total = scoped.len() as i64;
        let maps = scoped
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        Ok((maps, total))
    }

    async fn update_map(&self, id: i64, changes: UpdateMapRequest) -> ApiResult<Option<Map>> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(slug) = &changes.slug {
            if slug_taken(&tables.maps, slug, Some(id)) {
                return Err(ApiError::conflict("A map with this slug already exists"));
            }
        }
        let Some(map) = tables.maps.iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };
        if let Some(title) = changes.title {
            map.title = title;
        }
        if let Some(description) = changes.description {
            map.description = Some(description);
        }
        if let Some(location) = changes.location {
            map.location = Some(location);
        }
        if let Some(slug) = changes.slug {
            map.slug = slug;
        }
        map.updated_at = Utc::now();
        Ok(Some(map.clone()))
    }

    async fn set_published(&self, id: i64, is_published: bool) -> ApiResult<Option<Map>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables.maps.iter_mut().find(|m| m.id == id).map(|map| {
            map.is_published = is_published;
            map.clone()
        }))
    }

    async fn delete_map(&self, id: i64) -> ApiResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.maps.len();
        tables.maps.retain(|m| m.id != id);
        Ok(tables.maps.len() < before)
    }

    async fn set_asset_key(&self, id: i64, role: AssetRole, key: &str) -> ApiResult<Option<Map>> {
        let mut tables = self.tables.lock().unwrap();
        if tables.fail_asset_keys {
            return Err(ApiError::Internal("connection reset".to_string()));
        }
        Ok(tables.maps.iter_mut().find(|m| m.id == id).map(|map| {
            *map.asset_slot_mut(role) = Some(key.to_string());
            map.clone()
        }))
    }

    async fn merge_layer(
        &self,
        id: i64,
        name: &str,
        payload: serde_json::Value,
    ) -> ApiResult<Option<Map>> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables.maps.iter_mut().find(|m| m.id == id).map(|map| {
            let mut layers = match map.geojson_layers.take() {
                Some(serde_json::Value::Object(layers)) => layers,
                _ => serde_json::Map::new(),
            };
            layers.insert(name.to_string(), payload);
            map.geojson_layers = Some(serde_json::Value::Object(layers));
            map.clone()
        }))
    }
}

// --- Application Harness ---

pub struct TestApp {
    pub repo: InMemoryRepository,
    pub storage: MockStorageService,
    pub config: AppConfig,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_storage(MockStorageService::new())
    }

    pub fn with_storage(storage: MockStorageService) -> Self {
        Self {
            repo: InMemoryRepository::seeded(),
            storage,
            config: AppConfig::default(),
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            repo: Arc::new(self.repo.clone()) as RepositoryState,
            storage: Arc::new(self.storage.clone()) as StorageState,
            config: self.config.clone(),
        }
    }

    pub fn registry(&self) -> MapAssetRegistry {
        self.state().registry()
    }

    /// Sends one request through a freshly built router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        create_router(self.state()).oneshot(request).await.unwrap()
    }
}

pub fn owner() -> AuthUser {
    AuthUser {
        id: OWNER_ID,
        is_admin: false,
    }
}

pub fn other() -> AuthUser {
    AuthUser {
        id: OTHER_ID,
        is_admin: false,
    }
}

// --- Request Helpers ---

/// Builds a request; `as_user` sets the local-mode user header.
pub fn request(
    method: &str,
    uri: &str,
    as_user: Option<i64>,
    json: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = as_user {
        builder = builder.header(DEV_USER_HEADER, user_id.to_string());
    }
    match json {
        Some(value) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&value).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn multipart_request(
    uri: &str,
    as_user: i64,
    class: &str,
    files: &[(&str, &[u8])],
) -> Request<Body> {
    const BOUNDARY: &str = "cartonord-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"class\"\r\n\r\n{class}\r\n"
        )
        .as_bytes(),
    );
    for (filename, data) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(DEV_USER_HEADER, as_user.to_string())
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn json_body<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn expect_status(response: Response<Body>, status: StatusCode) -> serde_json::Value {
    let actual = response.status();
    let body: serde_json::Value = json_body(response).await;
    assert_eq!(actual, status, "unexpected status, body: {body}");
    body
}

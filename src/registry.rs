//! Map asset registry.
//!
//! The only writer of a map's asset columns and layer mapping. Every operation runs
//! the authorization guard first, then talks to the repository and, when needed,
//! the storage gateway.

use std::{collections::HashSet, time::Duration};

use axum::body::Bytes;

use crate::{
    assets::{self, AssetRole, BatchClass},
    auth::AuthUser,
    config::AppConfig,
    error::{ApiError, ApiResult},
    guard,
    models::{BatchItemOutcome, DownloadUrlResponse, FolderObject, Map, UploadUrlResponse},
    repository::RepositoryState,
    slug::slugify,
    storage::StorageState,
};

/// Maximum number of files accepted by one batch upload.
pub const MAX_BATCH_FILES: usize = 50;
/// Maximum size of a single batch file.
pub const MAX_BATCH_FILE_BYTES: usize = 10 * 1024 * 1024;

/// One file of a batch upload, already read from the request.
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub filename: String,
    pub data: Bytes,
}

/// MapAssetRegistry
///
/// Cheap to build per request from `AppState` (three `Arc`/`Clone` handles).
#[derive(Clone)]
pub struct MapAssetRegistry {
    repo: RepositoryState,
    storage: StorageState,
    upload_ttl: Duration,
    download_ttl: Duration,
}

impl MapAssetRegistry {
    pub fn new(repo: RepositoryState, storage: StorageState, config: &AppConfig) -> Self {
        Self {
            repo,
            storage,
            upload_ttl: Duration::from_secs(config.upload_url_ttl_secs),
            download_ttl: Duration::from_secs(config.download_url_ttl_secs),
        }
    }

    async fn load(&self, map_id: i64) -> ApiResult<Map> {
        self.repo.get_map(map_id).await?.ok_or(ApiError::NotFound)
    }

    async fn load_writable(&self, map_id: i64, caller: &AuthUser) -> ApiResult<Map> {
        let map = self.load(map_id).await?;
        guard::require_write(caller, &map)?;
        Ok(map)
    }

    /// issue_upload_url
    ///
    /// Derives the key for (map, role, filename) and signs a PUT for it.
    pub async fn issue_upload_url(
        &self,
        map_id: i64,
        role: AssetRole,
        filename: &str,
        caller: &AuthUser,
    ) -> ApiResult<UploadUrlResponse> {
        let map = self.load_writable(map_id, caller).await?;
        let derived = assets::derive_key(map.id, role, filename)?;

        let url = self
            .storage
            .presign_upload(&derived.key, derived.content_type, self.upload_ttl)
            .await?;

        tracing::info!(map_id, role = %role, key = %derived.key, "Issued upload URL");
        Ok(UploadUrlResponse {
            url,
            key: derived.key,
            content_type: derived.content_type.to_string(),
            expires_in: self.upload_ttl.as_secs(),
        })
    }

    /// record_asset_key
    ///
    /// Binds `key` to `role` with a single-column update. The key must lie in the
    /// map's namespace; folder roles record the folder prefix.
    pub async fn record_asset_key(
        &self,
        map_id: i64,
        role: AssetRole,
        key: &str,
        caller: &AuthUser,
    ) -> ApiResult<Map> {
        let map = self.load_writable(map_id, caller).await?;

        if !assets::is_in_namespace(map.id, key) {
            return Err(ApiError::validation(format!(
                "Key must be located under '{}'",
                assets::namespace(map.id)
            )));
        }

        let stored = if role.is_folder() {
            let prefix = assets::folder_prefix(map.id, role);
            if !key.starts_with(&prefix) {
                return Err(ApiError::validation(format!(
                    "Key for role '{role}' must be located under '{prefix}'"
                )));
            }
            prefix
        } else {
            key.to_string()
        };

        let updated = self
            .repo
            .set_asset_key(map.id, role, &stored)
            .await?
            .ok_or(ApiError::NotFound)?;

        tracing::info!(map_id, role = %role, key = %stored, "Recorded asset key");
        Ok(updated)
    }

    /// record_layer
    ///
    /// Merges one entry into the layer mapping. The payload is stored as given.
    pub async fn record_layer(
        &self,
        map_id: i64,
        layer_name: &str,
        payload: serde_json::Value,
        caller: &AuthUser,
    ) -> ApiResult<Map> {
        let layer_name = layer_name.trim();
        if layer_name.is_empty() {
            return Err(ApiError::validation("Layer name must not be empty"));
        }

        let map = self.load_writable(map_id, caller).await?;
        let updated = self
            .repo
            .merge_layer(map.id, layer_name, payload)
            .await?
            .ok_or(ApiError::NotFound)?;

        tracing::info!(map_id, layer = layer_name, "Recorded layer");
        Ok(updated)
    }

    /// resolve_readable_key
    ///
    /// The stored key of `role` if the caller may read the map. A missing role and
    /// a denied read produce the same `NotFound`.
    pub fn resolve_readable_key(
        map: &Map,
        role: AssetRole,
        caller: Option<&AuthUser>,
    ) -> ApiResult<String> {
        guard::require_read(caller, map)?;
        map.asset_key(role)
            .map(str::to_string)
            .ok_or(ApiError::NotFound)
    }

    /// issue_download_url
    ///
    /// Signs a GET for a single-object role. Folder roles are listed instead.
    pub async fn issue_download_url(
        &self,
        map: &Map,
        role: AssetRole,
        caller: Option<&AuthUser>,
    ) -> ApiResult<DownloadUrlResponse> {
        let key = Self::resolve_readable_key(map, role, caller)?;
        if role.is_folder() {
            return Err(ApiError::validation(format!(
                "Role '{role}' is a folder; list its objects instead"
            )));
        }

        let url = self.storage.presign_download(&key, self.download_ttl).await?;
        Ok(DownloadUrlResponse {
            url,
            expires_in: self.download_ttl.as_secs(),
        })
    }

    /// list_folder
    ///
    /// Signed GET URLs for every object of a folder role.
    pub async fn list_folder(
        &self,
        map: &Map,
        role: AssetRole,
        caller: Option<&AuthUser>,
    ) -> ApiResult<Vec<FolderObject>> {
        if !role.is_folder() {
            return Err(ApiError::validation(format!("Role '{role}' is not a folder")));
        }
        let prefix = Self::resolve_readable_key(map, role, caller)?;

        let mut objects = Vec::new();
        for key in self.storage.list_keys(&prefix).await? {
            let url = self.storage.presign_download(&key, self.download_ttl).await?;
            objects.push(FolderObject { key, url });
        }
        Ok(objects)
    }

    /// batch_upload
    ///
    /// Processes each file independently and returns one outcome per file, in
    /// input order. There is no transaction across the batch: keys recorded for
    /// successful files stay recorded whatever happens to the others.
    pub async fn batch_upload(
        &self,
        map_id: i64,
        class: BatchClass,
        files: Vec<BatchFile>,
        caller: &AuthUser,
    ) -> ApiResult<(Vec<BatchItemOutcome>, Map)> {
        if files.is_empty() {
            return Err(ApiError::validation("No files provided"));
        }
        if files.len() > MAX_BATCH_FILES {
            return Err(ApiError::validation(format!(
                "At most {MAX_BATCH_FILES} files can be uploaded at once"
            )));
        }

        let map = self.load_writable(map_id, caller).await?;
        let mut outcomes = Vec::with_capacity(files.len());
        let mut written = HashSet::new();

        for file in files {
            let filename = file.filename.clone();
            let outcome = match self.upload_one(map.id, class, file, &mut written).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(map_id, filename = %filename, error = %err, "Batch item failed");
                    BatchItemOutcome::Failed {
                        filename,
                        reason: err.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        if let Some(folder_role) = folder_role_of(class) {
            if outcomes.iter().any(BatchItemOutcome::is_success) {
                let prefix = assets::folder_prefix(map.id, folder_role);
                let recorded = match self.repo.set_asset_key(map.id, folder_role, &prefix).await {
                    Ok(Some(_)) => Ok(()),
                    Ok(None) => Err(ApiError::NotFound),
                    Err(err) => Err(err),
                };
                if let Err(err) = recorded {
                    tracing::error!(map_id, role = %folder_role, error = %err, "Folder prefix not recorded");
                    outcomes = outcomes
                        .into_iter()
                        .map(|outcome| outcome.into_unrecorded(&err))
                        .collect();
                }
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        tracing::info!(map_id, total = outcomes.len(), succeeded, "Batch upload finished");

        let map = self.load(map.id).await?;
        Ok((outcomes, map))
    }

    /// Stores one file and records where it landed. `written` holds the keys
    /// already stored by this batch; a second file resolving to one of them fails
    /// instead of overwriting the first.
    async fn upload_one(
        &self,
        map_id: i64,
        class: BatchClass,
        file: BatchFile,
        written: &mut HashSet<String>,
    ) -> ApiResult<BatchItemOutcome> {
        if file.data.len() > MAX_BATCH_FILE_BYTES {
            return Err(ApiError::validation(format!(
                "File exceeds the {} MiB limit",
                MAX_BATCH_FILE_BYTES / (1024 * 1024)
            )));
        }

        let planned = plan_upload(map_id, class, &file.filename)?;
        if written.contains(&planned.key) {
            return Err(ApiError::conflict(format!(
                "Another file of this batch was already stored at '{}'",
                planned.key
            )));
        }

        self.storage
            .put_object(&planned.key, file.data, planned.content_type)
            .await?;
        written.insert(planned.key.clone());

        let (role, layer) = match planned.target {
            BatchTarget::Role(role) => {
                self.repo
                    .set_asset_key(map_id, role, &planned.key)
                    .await?
                    .ok_or(ApiError::NotFound)?;
                (Some(role), None)
            }
            BatchTarget::Folder(role) => (Some(role), None),
            BatchTarget::Layer(name) => {
                self.repo
                    .merge_layer(map_id, &name, serde_json::Value::String(planned.key.clone()))
                    .await?
                    .ok_or(ApiError::NotFound)?;
                (None, Some(name))
            }
        };

        Ok(BatchItemOutcome::Uploaded {
            filename: file.filename,
            key: planned.key,
            role,
            layer,
        })
    }
}

/// Where a batch file is recorded once stored.
enum BatchTarget {
    Role(AssetRole),
    Folder(AssetRole),
    Layer(String),
}

struct PlannedUpload {
    key: String,
    content_type: &'static str,
    target: BatchTarget,
}

/// A GeoJSON file named after a base layer fills that role; any other GeoJSON
/// file becomes an ad hoc layer named by the slug of its stem, so a layer name
/// and its key always correspond one to one.
fn plan_upload(map_id: i64, class: BatchClass, filename: &str) -> ApiResult<PlannedUpload> {
    if let Some(role) = folder_role_of(class) {
        let derived = assets::derive_key(map_id, role, filename)?;
        return Ok(PlannedUpload {
            key: derived.key,
            content_type: derived.content_type,
            target: BatchTarget::Folder(role),
        });
    }

    let sanitized =
        assets::sanitize_filename(filename).ok_or_else(|| ApiError::validation("Invalid filename format"))?;
    let stem = assets::stem_of(&sanitized);

    let base_role = AssetRole::BASE_LAYERS
        .into_iter()
        .find(|role| role.as_str() == stem.to_ascii_lowercase());
    if let Some(role) = base_role {
        let derived = assets::derive_key(map_id, role, &sanitized)?;
        return Ok(PlannedUpload {
            key: derived.key,
            content_type: derived.content_type,
            target: BatchTarget::Role(role),
        });
    }

    let extension = assets::extension_of(&sanitized)
        .ok_or_else(|| ApiError::validation("Filename must carry an extension"))?;
    if !assets::ExtensionClass::GeoJson.accepts(&extension) {
        return Err(ApiError::validation(format!(
            "Unsupported file type '.{extension}' for a GeoJSON batch"
        )));
    }
    let layer_slug = slugify(stem);
    if layer_slug.is_empty() {
        return Err(ApiError::validation("Layer name must not be empty"));
    }

    Ok(PlannedUpload {
        key: assets::layer_key(map_id, &layer_slug),
        content_type: assets::content_type_for(&extension),
        target: BatchTarget::Layer(layer_slug),
    })
}

fn folder_role_of(class: BatchClass) -> Option<AssetRole> {
    match class {
        BatchClass::Geojson => None,
        BatchClass::Pictos => Some(AssetRole::Pictos),
        BatchClass::Logos => Some(AssetRole::Logos),
    }
}

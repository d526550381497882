use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::assets::{AssetRole, BatchClass};

// --- Core Application Schemas (Mapped to Database) ---

/// UserRecord
///
/// Row of the `users` table, password hash included. Never serialized.
#[derive(Debug, Clone, FromRow, Default)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User
///
/// Public view of an account, as returned by the auth endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            username: record.username,
            email: record.email,
            is_admin: record.is_admin,
            created_at: record.created_at,
        }
    }
}

/// Map
///
/// Row of the `maps` table: metadata, one nullable storage key per `AssetRole`, and
/// an open-ended layer mapping (layer name -> inline GeoJSON or storage key).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Map {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub slug: String,
    pub location: Option<String>,
    pub user_id: i64,
    pub is_published: bool,

    // Base GeoJSON layers.
    pub urban_geojson_url: Option<String>,
    pub roads_geojson_url: Option<String>,
    pub water_geojson_url: Option<String>,
    pub buildings_geojson_url: Option<String>,
    pub green_areas_geojson_url: Option<String>,
    pub pois_geojson_url: Option<String>,

    // Exports.
    pub rendered_image_url: Option<String>,
    pub pdf_export_url: Option<String>,

    // Folder prefixes.
    pub pictos_folder_url: Option<String>,
    pub logos_folder_url: Option<String>,

    // Legacy slots.
    pub data_file_url: Option<String>,
    pub style_file_url: Option<String>,
    pub legend_file_url: Option<String>,
    pub image_file_url: Option<String>,

    #[ts(type = "Record<string, unknown> | null")]
    #[schema(value_type = Option<Object>)]
    pub geojson_layers: Option<serde_json::Value>,

    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Map {
    /// Stored key for a role, if one was recorded.
    pub fn asset_key(&self, role: AssetRole) -> Option<&str> {
        let field = match role {
            AssetRole::Data => &self.data_file_url,
            AssetRole::Style => &self.style_file_url,
            AssetRole::Legend => &self.legend_file_url,
            AssetRole::Image => &self.image_file_url,
            AssetRole::Urban => &self.urban_geojson_url,
            AssetRole::Roads => &self.roads_geojson_url,
            AssetRole::Water => &self.water_geojson_url,
            AssetRole::Buildings => &self.buildings_geojson_url,
            AssetRole::Green => &self.green_areas_geojson_url,
            AssetRole::Pois => &self.pois_geojson_url,
            AssetRole::Rendered => &self.rendered_image_url,
            AssetRole::Pdf => &self.pdf_export_url,
            AssetRole::Pictos => &self.pictos_folder_url,
            AssetRole::Logos => &self.logos_folder_url,
        };
        field.as_deref().filter(|key| !key.is_empty())
    }

    /// Mutable slot for a role. Used by in-memory repositories.
    pub fn asset_slot_mut(&mut self, role: AssetRole) -> &mut Option<String> {
        match role {
            AssetRole::Data => &mut self.data_file_url,
            AssetRole::Style => &mut self.style_file_url,
            AssetRole::Legend => &mut self.legend_file_url,
            AssetRole::Image => &mut self.image_file_url,
            AssetRole::Urban => &mut self.urban_geojson_url,
            AssetRole::Roads => &mut self.roads_geojson_url,
            AssetRole::Water => &mut self.water_geojson_url,
            AssetRole::Buildings => &mut self.buildings_geojson_url,
            AssetRole::Green => &mut self.green_areas_geojson_url,
            AssetRole::Pois => &mut self.pois_geojson_url,
            AssetRole::Rendered => &mut self.rendered_image_url,
            AssetRole::Pdf => &mut self.pdf_export_url,
            AssetRole::Pictos => &mut self.pictos_folder_url,
            AssetRole::Logos => &mut self.logos_folder_url,
        }
    }
}

/// --- Request Payloads (Input Schemas) ---

/// CreateMapRequest
///
/// Input payload for POST /maps. Asset keys are not accepted here: they are bound
/// later, one role at a time or in batch, through the asset endpoints. Maps start
/// unpublished; only PUT /admin/maps/{id}/publish changes that.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateMapRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Derived from the title when absent. Must already be URL-safe when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

/// NewMap
///
/// Validated insert payload handed to the repository.
#[derive(Debug, Clone)]
pub struct NewMap {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub slug: String,
}

/// UpdateMapRequest
///
/// Partial metadata update for PUT /maps/{id}. `None` fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateMapRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

/// UploadUrlRequest
///
/// Input payload for POST /maps/{id}/assets/upload-url.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS)]
#[ts(export)]
pub struct UploadUrlRequest {
    #[schema(example = "roads")]
    pub role: String,
    /// Original filename; its extension selects the content type.
    #[schema(example = "roads.geojson")]
    pub filename: String,
}

/// UploadUrlResponse
///
/// Signed PUT URL plus the key to register once the upload completes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UploadUrlResponse {
    pub url: String,
    pub key: String,
    /// The upload must be sent with exactly this Content-Type header.
    pub content_type: String,
    pub expires_in: u64,
}

/// RecordAssetRequest
///
/// Input payload for PUT /maps/{id}/assets: binds an uploaded key to a role.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RecordAssetRequest {
    #[serde(alias = "fileType")]
    pub role: String,
    #[serde(alias = "s3Key")]
    pub key: String,
}

/// DownloadUrlResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DownloadUrlResponse {
    pub url: String,
    pub expires_in: u64,
}

/// FolderObject
///
/// One object of a folder role (pictogram or logo) with a signed GET URL.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct FolderObject {
    pub key: String,
    pub url: String,
}

/// BatchItemOutcome
///
/// Result for one file of a batch upload. A failed item never aborts the others.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
#[ts(export)]
pub enum BatchItemOutcome {
    Uploaded {
        filename: String,
        key: String,
        /// Role slot the key was recorded in, absent for ad hoc layers.
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<AssetRole>,
        /// Layer name the key was recorded under, for ad hoc layers.
        #[serde(skip_serializing_if = "Option::is_none")]
        layer: Option<String>,
    },
    Failed {
        filename: String,
        reason: String,
    },
}

impl BatchItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Uploaded { .. })
    }

    /// Turns a stored-but-unrecorded upload into a failure carrying `cause`.
    pub fn into_unrecorded(self, cause: &impl std::fmt::Display) -> Self {
        match self {
            Self::Uploaded { filename, key, .. } => Self::Failed {
                filename,
                reason: format!("stored at '{key}' but not recorded on the map: {cause}"),
            },
            failed => failed,
        }
    }
}

/// BatchUploadResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct BatchUploadResponse {
    pub class: BatchClass,
    pub results: Vec<BatchItemOutcome>,
    pub map: Map,
}

/// BatchUploadForm
///
/// OpenAPI description of the multipart body of POST /maps/{id}/assets/batch.
/// The handler reads the parts directly.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct BatchUploadForm {
    pub class: BatchClass,
    /// One part per file, each carrying its own filename.
    #[schema(value_type = Vec<String>)]
    pub files: Vec<Vec<u8>>,
}

/// PublishRequest
///
/// Input payload for PUT /admin/maps/{id}/publish.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PublishRequest {
    pub is_published: bool,
}

/// LoginRequest
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// LoginResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// UpdateProfileRequest
///
/// Partial update of the caller's own account. A new password is re-hashed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// ProfileChanges
///
/// Repository-level profile update, with the password already hashed.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

/// --- Listing Schemas (Output) ---

/// PageMeta
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default, PartialEq)]
#[ts(export)]
pub struct PageMeta {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

impl PageMeta {
    pub fn new(total: i64, page: i64, limit: i64) -> Self {
        let pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self {
            total,
            page,
            limit,
            pages,
        }
    }
}

/// MapPage
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct MapPage {
    pub maps: Vec<Map>,
    pub meta: PageMeta,
}

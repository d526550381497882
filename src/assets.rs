//! Asset key namespace.
//!
//! Maps a (map, role, filename) triple to the object-storage key the asset lives at,
//! without consulting storage. Every key of a map sits under `maps/<map id>/`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::ApiError;

/// Fallback MIME type for extensions missing from the table.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// AssetRole
///
/// The closed set of asset slots a map exposes. Each variant owns exactly one
/// nullable column of the `maps` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum AssetRole {
    // Legacy slots.
    Data,
    Style,
    Legend,
    Image,
    // Base GeoJSON layers.
    Urban,
    Roads,
    Water,
    Buildings,
    Green,
    Pois,
    // Exports.
    Rendered,
    Pdf,
    // Folders.
    Pictos,
    Logos,
}

/// Which family of file extensions a role accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionClass {
    GeoJson,
    Image,
    Pdf,
}

impl ExtensionClass {
    pub fn accepts(self, extension: &str) -> bool {
        match self {
            Self::GeoJson => matches!(extension, "geojson" | "json"),
            Self::Image => matches!(extension, "jpg" | "jpeg" | "png" | "webp" | "svg"),
            Self::Pdf => extension == "pdf",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::GeoJson => ".geojson or .json",
            Self::Image => ".jpg, .jpeg, .png, .webp or .svg",
            Self::Pdf => ".pdf",
        }
    }
}

impl AssetRole {
    pub const ALL: [AssetRole; 14] = [
        Self::Data,
        Self::Style,
        Self::Legend,
        Self::Image,
        Self::Urban,
        Self::Roads,
        Self::Water,
        Self::Buildings,
        Self::Green,
        Self::Pois,
        Self::Rendered,
        Self::Pdf,
        Self::Pictos,
        Self::Logos,
    ];

    /// Base layers a batch GeoJSON upload can target by file stem.
    pub const BASE_LAYERS: [AssetRole; 6] = [
        Self::Urban,
        Self::Roads,
        Self::Water,
        Self::Buildings,
        Self::Green,
        Self::Pois,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Style => "style",
            Self::Legend => "legend",
            Self::Image => "image",
            Self::Urban => "urban",
            Self::Roads => "roads",
            Self::Water => "water",
            Self::Buildings => "buildings",
            Self::Green => "green",
            Self::Pois => "pois",
            Self::Rendered => "rendered",
            Self::Pdf => "pdf",
            Self::Pictos => "pictos",
            Self::Logos => "logos",
        }
    }

    /// Column of the `maps` table holding this role's key.
    pub fn column(self) -> &'static str {
        match self {
            Self::Data => "data_file_url",
            Self::Style => "style_file_url",
            Self::Legend => "legend_file_url",
            Self::Image => "image_file_url",
            Self::Urban => "urban_geojson_url",
            Self::Roads => "roads_geojson_url",
            Self::Water => "water_geojson_url",
            Self::Buildings => "buildings_geojson_url",
            Self::Green => "green_areas_geojson_url",
            Self::Pois => "pois_geojson_url",
            Self::Rendered => "rendered_image_url",
            Self::Pdf => "pdf_export_url",
            Self::Pictos => "pictos_folder_url",
            Self::Logos => "logos_folder_url",
        }
    }

    pub fn extension_class(self) -> ExtensionClass {
        match self {
            Self::Data
            | Self::Style
            | Self::Legend
            | Self::Urban
            | Self::Roads
            | Self::Water
            | Self::Buildings
            | Self::Green
            | Self::Pois => ExtensionClass::GeoJson,
            Self::Image | Self::Rendered | Self::Pictos | Self::Logos => ExtensionClass::Image,
            Self::Pdf => ExtensionClass::Pdf,
        }
    }

    /// Folder roles hold many objects under a prefix instead of a single object.
    pub fn is_folder(self) -> bool {
        matches!(self, Self::Pictos | Self::Logos)
    }

    /// Path of this role relative to the map namespace.
    ///
    /// Single-object roles canonicalize the name and ignore the client filename;
    /// folder roles keep the sanitized filename.
    fn relative_path(self, filename: &str, extension: &str) -> String {
        match self {
            Self::Data => "data.geojson".to_string(),
            Self::Style => "style.json".to_string(),
            Self::Legend => "legend.json".to_string(),
            Self::Image => format!("image.{}", image_extension(extension)),
            Self::Urban | Self::Roads | Self::Water | Self::Buildings | Self::Green | Self::Pois => {
                format!("layers/{}.geojson", self.as_str())
            }
            Self::Rendered => format!("rendered.{}", normalized_extension(extension)),
            Self::Pdf => "export.pdf".to_string(),
            Self::Pictos | Self::Logos => format!("{}/{}", self.as_str(), filename),
        }
    }
}

impl fmt::Display for AssetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetRole {
    type Err = ApiError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == raw)
            .ok_or_else(|| ApiError::validation(format!("Unknown asset role '{raw}'")))
    }
}

/// BatchClass
///
/// Tag shared by every file of one batch upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum BatchClass {
    Geojson,
    Pictos,
    Logos,
}

impl FromStr for BatchClass {
    type Err = ApiError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "geojson" => Ok(Self::Geojson),
            "pictos" => Ok(Self::Pictos),
            "logos" => Ok(Self::Logos),
            other => Err(ApiError::validation(format!("Unknown batch class '{other}'"))),
        }
    }
}

/// DerivedKey
///
/// A storage key together with the content type storage must be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    pub key: String,
    pub content_type: &'static str,
}

/// Root prefix of every object belonging to a map.
pub fn namespace(map_id: i64) -> String {
    format!("maps/{map_id}/")
}

/// Prefix under which a folder role stores its objects.
pub fn folder_prefix(map_id: i64, role: AssetRole) -> String {
    format!("{}{}/", namespace(map_id), role.as_str())
}

/// Whether `key` lies strictly inside the map's namespace and contains no traversal.
pub fn is_in_namespace(map_id: i64, key: &str) -> bool {
    let prefix = namespace(map_id);
    key.len() > prefix.len()
        && key.starts_with(&prefix)
        && key
            .split('/')
            .all(|segment| segment != ".." && segment != ".")
}

/// content_type_for
///
/// MIME type presented to storage for a file extension (case-insensitive).
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "geojson" | "json" => "application/json",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// derive_key
///
/// Computes the storage key of an asset. Fails with a validation error when the
/// filename has no extension or one the role does not accept.
pub fn derive_key(map_id: i64, role: AssetRole, filename: &str) -> Result<DerivedKey, ApiError> {
    let filename = sanitize_filename(filename)
        .ok_or_else(|| ApiError::validation("Invalid filename format"))?;
    let extension = extension_of(&filename)
        .ok_or_else(|| ApiError::validation("Filename must carry an extension"))?;

    let class = role.extension_class();
    if !class.accepts(&extension) {
        return Err(ApiError::validation(format!(
            "Role '{role}' expects a {} file, got '.{extension}'",
            class.describe()
        )));
    }

    let relative = role.relative_path(&filename, &extension);
    let content_type = content_type_for(&extension);

    Ok(DerivedKey {
        key: format!("{}{relative}", namespace(map_id)),
        content_type,
    })
}

/// Key of an ad hoc GeoJSON layer uploaded through a batch.
pub fn layer_key(map_id: i64, layer_slug: &str) -> String {
    format!("{}layers/custom/{layer_slug}.geojson", namespace(map_id))
}

/// Lowercased extension of a filename, if it has a non-empty one.
pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// File stem (name without its last extension).
pub fn stem_of(filename: &str) -> &str {
    filename.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(filename)
}

/// sanitize_filename
///
/// Keeps only the last path segment of a client-supplied name and rejects
/// navigation components, so a filename can never escape its folder.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next()?.trim();
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    let cleaned: String = last
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();
    Some(cleaned)
}

fn image_extension(extension: &str) -> &'static str {
    match extension {
        "png" => "png",
        "jpg" | "jpeg" => "jpg",
        "svg" => "svg",
        _ => "png",
    }
}

fn normalized_extension(extension: &str) -> &str {
    match extension {
        "jpeg" => "jpg",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn data_role_is_canonicalized() {
        let derived = derive_key(7, AssetRole::Data, "export-final (2).json").unwrap();
        assert_eq!(derived.key, "maps/7/data.geojson");
        assert_eq!(derived.content_type, "application/json");
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_key(3, AssetRole::Roads, "roads.geojson").unwrap();
        let b = derive_key(3, AssetRole::Roads, "roads.geojson").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn roles_of_one_map_get_disjoint_keys() {
        let samples = [
            (AssetRole::Data, "a.geojson"),
            (AssetRole::Style, "a.json"),
            (AssetRole::Legend, "a.json"),
            (AssetRole::Image, "a.png"),
            (AssetRole::Urban, "a.geojson"),
            (AssetRole::Roads, "a.geojson"),
            (AssetRole::Water, "a.geojson"),
            (AssetRole::Buildings, "a.geojson"),
            (AssetRole::Green, "a.geojson"),
            (AssetRole::Pois, "a.geojson"),
            (AssetRole::Rendered, "a.png"),
            (AssetRole::Pdf, "a.pdf"),
            (AssetRole::Pictos, "a.png"),
            (AssetRole::Logos, "a.png"),
        ];
        let keys: HashSet<String> = samples
            .iter()
            .map(|(role, file)| derive_key(1, *role, file).unwrap().key)
            .collect();
        assert_eq!(keys.len(), samples.len());
        assert!(keys.iter().all(|k| k.starts_with("maps/1/")));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = "satellite".parse::<AssetRole>().unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!("green".parse::<AssetRole>().unwrap(), AssetRole::Green);
    }

    #[test]
    fn missing_or_wrong_extension_is_rejected() {
        assert!(matches!(
            derive_key(1, AssetRole::Roads, "roads"),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            derive_key(1, AssetRole::Pdf, "export.png"),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            derive_key(1, AssetRole::Pictos, "notes.txt"),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn folder_roles_keep_sanitized_filename() {
        let derived = derive_key(9, AssetRole::Pictos, "../../etc/bus-stop.SVG").unwrap();
        assert_eq!(derived.key, "maps/9/pictos/bus-stop.SVG");
        assert_eq!(derived.content_type, "image/svg+xml");
    }

    #[test]
    fn image_role_follows_content_type() {
        assert_eq!(derive_key(2, AssetRole::Image, "x.jpeg").unwrap().key, "maps/2/image.jpg");
        assert_eq!(derive_key(2, AssetRole::Image, "x.webp").unwrap().key, "maps/2/image.png");
        assert_eq!(
            derive_key(2, AssetRole::Rendered, "x.webp").unwrap().content_type,
            "image/webp"
        );
    }

    #[test]
    fn canonical_image_key_keeps_upload_content_type() {
        let derived = derive_key(2, AssetRole::Image, "photo.webp").unwrap();
        assert_eq!(derived.key, "maps/2/image.png");
        assert_eq!(derived.content_type, "image/webp");

        let derived = derive_key(2, AssetRole::Image, "scan.JPEG").unwrap();
        assert_eq!(derived.key, "maps/2/image.jpg");
        assert_eq!(derived.content_type, "image/jpeg");
    }

    #[test]
    fn content_type_table() {
        assert_eq!(content_type_for("JPG"), "image/jpeg");
        assert_eq!(content_type_for("jpeg"), "image/jpeg");
        assert_eq!(content_type_for("png"), "image/png");
        assert_eq!(content_type_for("webp"), "image/webp");
        assert_eq!(content_type_for("svg"), "image/svg+xml");
        assert_eq!(content_type_for("pdf"), "application/pdf");
        assert_eq!(content_type_for("geojson"), "application/json");
        assert_eq!(content_type_for("json"), "application/json");
        assert_eq!(content_type_for("kml"), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn namespace_membership() {
        assert!(is_in_namespace(4, "maps/4/data.geojson"));
        assert!(!is_in_namespace(4, "maps/40/data.geojson"));
        assert!(!is_in_namespace(4, "maps/4/"));
        assert!(!is_in_namespace(4, "maps/4/../5/data.geojson"));
    }
}

use crate::core::exif::TagGroups;
use crate::core::gps::{DecodedLocation, GpsFields};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// Picture models
#[derive(Debug, Clone, PartialEq)]
pub struct PictureRecord {
    pub id: Option<i64>,
    pub capture_date: Option<NaiveDateTime>,
    pub content_signature: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub gps: GpsFields,
    pub thumbnail: Vec<u8>,
    pub exif: TagGroups,
    /// Clockwise degrees, one of 0/90/180/270.
    pub rotation: i32,
    pub rotation_reviewed: bool,
}

/// Editable descriptive attributes of a picture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PictureAttributes {
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub capture_date: Option<NaiveDateTime>,
    pub gps: GpsFields,
}

impl PictureRecord {
    pub fn with_id(self, id: i64) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    /// New thumbnail and rotation; the content signature is kept.
    pub fn rotated(&self, thumbnail: Vec<u8>, rotation: i32) -> Self {
        Self {
            thumbnail,
            rotation,
            ..self.clone()
        }
    }

    /// New thumbnail, rotation and signature.
    pub fn with_refreshed_signature(&self, thumbnail: Vec<u8>, signature: String, rotation: i32) -> Self {
        Self {
            thumbnail,
            rotation,
            content_signature: Some(signature),
            ..self.clone()
        }
    }

    pub fn with_attributes(&self, attributes: PictureAttributes) -> Self {
        Self {
            camera_make: attributes.camera_make,
            camera_model: attributes.camera_model,
            capture_date: attributes.capture_date,
            gps: attributes.gps,
            ..self.clone()
        }
    }

    pub fn with_rotation_reviewed(&self, reviewed: bool) -> Self {
        Self {
            rotation_reviewed: reviewed,
            ..self.clone()
        }
    }

    /// Decimal location decoded from the raw GPS fields.
    pub fn location(&self) -> Option<DecodedLocation> {
        self.gps.decode()
    }
}

// File models
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub id: Option<i64>,
    pub picture_id: Option<i64>,
    /// Parent directory.
    pub path: String,
    pub name: String,
    pub modified: NaiveDateTime,
    pub created: NaiveDateTime,
    pub size: i64,
    pub checked: bool,
}

impl FileRecord {
    pub fn full_path(&self) -> PathBuf {
        PathBuf::from(&self.path).join(&self.name)
    }
}

// Location models
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    pub id: Option<i64>,
    pub picture_id: i64,
    pub capture_date: Option<NaiveDateTime>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub place_info: Option<GeocodedPlace>,
}

impl LocationRecord {
    /// EWKT point, longitude first.
    pub fn geometry(&self) -> String {
        point_ewkt(self.latitude, self.longitude)
    }
}

pub const SRID_WGS84: i32 = 4326;

pub fn point_ewkt(latitude: f64, longitude: f64) -> String {
    format!("SRID={};POINT({} {})", SRID_WGS84, longitude, latitude)
}

/// Reverse geocoding result as returned by the geocoder, synonyms intact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodedPlace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub address: BTreeMap<String, String>,
}

/// Place name with synonym fields merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaceInfo {
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub suburb: Option<String>,
    pub road: Option<String>,
}

const STATE_KEYS: &[&str] = &["state", "province", "region"];
const CITY_KEYS: &[&str] = &["city", "municipality", "town", "village"];

impl GeocodedPlace {
    fn first_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|key| self.address.get(*key))
            .cloned()
    }

    pub fn normalized(&self) -> PlaceInfo {
        PlaceInfo {
            country: self.first_of(&["country"]),
            state: self.first_of(STATE_KEYS),
            city: self.first_of(CITY_KEYS),
            suburb: self.first_of(&["suburb"]),
            road: self.first_of(&["road"]),
        }
    }
}

impl std::fmt::Display for PlaceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = [&self.road, &self.suburb, &self.city, &self.state, &self.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

// Review models
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRecord {
    pub id: i64,
    pub picture_id: i64,
    pub reviewer_name: String,
    pub review_time: NaiveDateTime,
}

/// Column a duplicate group is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKey {
    Signature,
    CaptureDate,
}

impl IdentityKey {
    pub fn column(&self) -> &'static str {
        match self {
            IdentityKey::Signature => "content_signature",
            IdentityKey::CaptureDate => "capture_date",
        }
    }
}

impl std::str::FromStr for IdentityKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "signature" | "md5" | "sha256" => Ok(IdentityKey::Signature),
            "capture_date" | "capture-date" | "date" => Ok(IdentityKey::CaptureDate),
            other => Err(format!("unknown identity key: {}", other)),
        }
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityKey::Signature => write!(f, "signature"),
            IdentityKey::CaptureDate => write!(f, "capture_date"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub key: String,
    /// Ascending.
    pub picture_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FolderFilter {
    #[default]
    All,
    WithoutGps,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogStats {
    pub pictures: i64,
    pub files: i64,
    pub unchecked_files: i64,
    pub locations: i64,
    pub pending_locations: i64,
    pub reviews: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gps::to_dms;

    fn picture() -> PictureRecord {
        PictureRecord {
            id: Some(7),
            capture_date: None,
            content_signature: Some("abc".to_string()),
            camera_make: Some("Canon".to_string()),
            camera_model: None,
            gps: GpsFields::default(),
            thumbnail: vec![1, 2, 3],
            exif: TagGroups::new(),
            rotation: 0,
            rotation_reviewed: false,
        }
    }

    #[test]
    fn test_rotated_keeps_signature() {
        let original = picture();
        let rotated = original.rotated(vec![9, 9], 90);
        assert_eq!(rotated.content_signature, original.content_signature);
        assert_eq!(rotated.rotation, 90);
        assert_eq!(rotated.thumbnail, vec![9, 9]);
        assert_eq!(original.thumbnail, vec![1, 2, 3]);
    }

    #[test]
    fn test_refresh_replaces_signature() {
        let refreshed = picture().with_refreshed_signature(vec![4], "def".to_string(), 0);
        assert_eq!(refreshed.content_signature.as_deref(), Some("def"));
    }

    #[test]
    fn test_with_attributes_replaces_gps() {
        let attributes = PictureAttributes {
            camera_make: Some("Nikon".to_string()),
            gps: to_dms(Some(52.0), Some(4.0), None),
            ..Default::default()
        };
        let updated = picture().with_attributes(attributes);
        assert_eq!(updated.camera_make.as_deref(), Some("Nikon"));
        assert!(updated.location().is_some());
        assert_eq!(updated.content_signature.as_deref(), Some("abc"));
    }

    #[test]
    fn test_place_synonyms_merge_at_read() {
        let mut address = BTreeMap::new();
        address.insert("country".to_string(), "Netherlands".to_string());
        address.insert("province".to_string(), "North Holland".to_string());
        address.insert("village".to_string(), "Broek".to_string());
        address.insert("road".to_string(), "Dorpsstraat".to_string());
        let place = GeocodedPlace {
            display_name: None,
            address,
        };

        let info = place.normalized();
        assert_eq!(info.state.as_deref(), Some("North Holland"));
        assert_eq!(info.city.as_deref(), Some("Broek"));
        assert_eq!(info.suburb, None);
        assert_eq!(info.to_string(), "Dorpsstraat, Broek, North Holland, Netherlands");
    }

    #[test]
    fn test_city_takes_precedence_over_town() {
        let mut address = BTreeMap::new();
        address.insert("town".to_string(), "Zaandam".to_string());
        address.insert("city".to_string(), "Zaanstad".to_string());
        let place = GeocodedPlace {
            display_name: None,
            address,
        };
        assert_eq!(place.normalized().city.as_deref(), Some("Zaanstad"));
    }

    #[test]
    fn test_identity_key_parsing() {
        assert_eq!("signature".parse::<IdentityKey>(), Ok(IdentityKey::Signature));
        assert_eq!("date".parse::<IdentityKey>(), Ok(IdentityKey::CaptureDate));
        assert!("size".parse::<IdentityKey>().is_err());
    }

    #[test]
    fn test_point_geometry_is_lon_lat() {
        assert_eq!(point_ewkt(52.5, 4.25), "SRID=4326;POINT(4.25 52.5)");
    }
}

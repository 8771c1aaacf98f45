//! Single picture edits driven by typed commands.
//!
//! A presentation layer shows [`PictureView`] and sends [`PictureCommand`]s
//! back; each command is written through the store and yields the updated
//! record.

use crate::core::gps::{to_dms, GpsFields};
use crate::core::hash::HashService;
use crate::core::thumbnail::{normalize_rotation, ThumbnailError, ThumbnailService};
use crate::database::models::{FileRecord, LocationRecord, PictureAttributes, PictureRecord};
use crate::database::{CatalogStore, StoreError};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt::Write as _;
use thiserror::Error;

/// Accepted capture date texts, tried in order.
pub const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
pub const DAY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum EditError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Thumbnail error: {0}")]
    Thumbnail(#[from] ThumbnailError),

    #[error("Picture {id} not found")]
    NotFound { id: i64 },

    #[error("Picture {id} has no file on disk")]
    MissingFile { id: i64 },

    #[error("Unrecognised date: {text:?}")]
    InvalidDate { text: String },

    #[error("Expected \"lat, lon[, alt]\", got {text:?}")]
    InvalidLocation { text: String },

    #[error("Invalid id list: {0}")]
    InvalidIdList(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PictureCommand {
    RotateClockwise,
    RotateAnticlockwise,
    SetAttributes {
        camera_make: Option<String>,
        camera_model: Option<String>,
        /// Empty clears the date.
        capture_date: String,
        /// Decimal "lat, lon[, alt]"; empty clears the GPS fields.
        location: String,
    },
    Confirm,
    Reset,
    RegenerateThumbnail,
    RefreshSignature,
}

#[derive(Debug, Clone)]
pub struct PictureView {
    pub picture: PictureRecord,
    pub file: Option<FileRecord>,
    pub location: Option<LocationRecord>,
    pub text: String,
}

pub struct PictureEditor<'a> {
    store: &'a CatalogStore,
    thumbnails: ThumbnailService,
    hasher: HashService,
}

impl<'a> PictureEditor<'a> {
    pub fn new(store: &'a CatalogStore) -> Self {
        Self {
            store,
            thumbnails: ThumbnailService::new(),
            hasher: HashService::new(),
        }
    }

    pub fn view(&self, id: i64) -> Result<PictureView, EditError> {
        let picture = self.picture(id)?;
        let file = self.store.load_file(id)?;
        let location = self.store.load_location(id)?;
        let text = describe(&picture, file.as_ref(), location.as_ref());
        Ok(PictureView {
            picture,
            file,
            location,
            text,
        })
    }

    pub fn dispatch(&self, id: i64, command: PictureCommand) -> Result<PictureRecord, EditError> {
        log::debug!("Picture {}: {:?}", id, command);
        let picture = self.picture(id)?;

        match command {
            PictureCommand::RotateClockwise => self.rotate(id, &picture, 90),
            PictureCommand::RotateAnticlockwise => self.rotate(id, &picture, -90),
            PictureCommand::SetAttributes {
                camera_make,
                camera_model,
                capture_date,
                location,
            } => {
                let attributes = PictureAttributes {
                    camera_make: non_empty(camera_make),
                    camera_model: non_empty(camera_model),
                    capture_date: parse_date_text(&capture_date)?,
                    gps: parse_location_text(&location)?,
                };
                let updated = picture.with_attributes(attributes);
                self.store.upsert_picture(&updated)?;
                Ok(updated)
            }
            PictureCommand::Confirm => {
                self.store.confirm_picture(id)?;
                Ok(picture.with_rotation_reviewed(true))
            }
            PictureCommand::Reset => {
                self.store.reset_picture(id)?;
                Ok(picture.with_rotation_reviewed(false))
            }
            PictureCommand::RegenerateThumbnail => {
                let file = self.file(id)?;
                let thumbnail = self.thumbnails.from_path(&file.full_path(), 0)?;
                self.store.update_thumbnail(id, &thumbnail, 0)?;
                Ok(picture.rotated(thumbnail, 0))
            }
            PictureCommand::RefreshSignature => {
                let file = self.file(id)?;
                let thumbnail = self.thumbnails.from_path(&file.full_path(), 0)?;
                let signature = self.hasher.compute_signature(&thumbnail);
                self.store.refresh_signature(id, &thumbnail, &signature, 0)?;
                Ok(picture.with_refreshed_signature(thumbnail, signature, 0))
            }
        }
    }

    /// Flag every listed picture as reviewed. `ids_json` is a JSON array.
    pub fn mark_reviewed(&self, ids_json: &str) -> Result<usize, EditError> {
        let ids: Vec<i64> = serde_json::from_str(ids_json)?;
        Ok(self.store.set_rotation_reviewed(&ids, true)?)
    }

    fn rotate(&self, id: i64, picture: &PictureRecord, degrees: i32) -> Result<PictureRecord, EditError> {
        let thumbnail = self.thumbnails.rotate_bytes(&picture.thumbnail, degrees)?;
        let rotation = normalize_rotation(picture.rotation + degrees);
        self.store.update_thumbnail(id, &thumbnail, rotation)?;
        Ok(picture.rotated(thumbnail, rotation))
    }

    fn picture(&self, id: i64) -> Result<PictureRecord, EditError> {
        self.store.load_picture(id)?.ok_or(EditError::NotFound { id })
    }

    fn file(&self, id: i64) -> Result<FileRecord, EditError> {
        self.store.load_file(id)?.ok_or(EditError::MissingFile { id })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Capture date from edit text; blank means no date.
pub fn parse_date_text(text: &str) -> Result<Option<NaiveDateTime>, EditError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Some(date));
        }
    }
    NaiveDate::parse_from_str(text, DAY_FORMAT)
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(Some)
        .ok_or_else(|| EditError::InvalidDate {
            text: text.to_string(),
        })
}

/// GPS fields from decimal "lat, lon[, alt]" text; blank clears them.
pub fn parse_location_text(text: &str) -> Result<GpsFields, EditError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Default::default());
    }
    let invalid = || EditError::InvalidLocation {
        text: text.to_string(),
    };

    let values = text
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;

    let gps = match values.as_slice() {
        [lat, lon] => to_dms(Some(*lat), Some(*lon), None),
        [lat, lon, alt] => to_dms(Some(*lat), Some(*lon), Some(*alt)),
        _ => return Err(invalid()),
    };
    if gps.is_empty() {
        log::warn!("Location {:?} out of range, GPS cleared", text);
    }
    Ok(gps)
}

fn describe(picture: &PictureRecord, file: Option<&FileRecord>, location: Option<&LocationRecord>) -> String {
    let dash = || "-".to_string();
    let mut text = String::new();

    let _ = writeln!(text, "id:        {}", picture.id.map(|id| id.to_string()).unwrap_or_else(dash));
    match file {
        Some(file) => {
            let _ = writeln!(text, "file:      {}", file.full_path().display());
            let _ = writeln!(text, "modified:  {}", file.modified);
        }
        None => {
            let _ = writeln!(text, "file:      -");
        }
    }
    let _ = writeln!(
        text,
        "date:      {}",
        picture.capture_date.map(|d| d.to_string()).unwrap_or_else(dash)
    );
    let _ = writeln!(
        text,
        "signature: {}",
        picture.content_signature.clone().unwrap_or_else(dash)
    );
    let _ = writeln!(text, "make:      {}", picture.camera_make.clone().unwrap_or_else(dash));
    let _ = writeln!(text, "model:     {}", picture.camera_model.clone().unwrap_or_else(dash));
    let _ = writeln!(
        text,
        "location:  {}",
        picture.location().map(|l| l.display).unwrap_or_else(dash)
    );
    let _ = writeln!(
        text,
        "place:     {}",
        location
            .and_then(|l| l.place_info.as_ref())
            .map(|p| p.normalized().to_string())
            .unwrap_or_else(dash)
    );
    let _ = writeln!(text, "rotation:  {}", picture.rotation);
    let _ = write!(text, "reviewed:  {}", picture.rotation_reviewed);
    text
}

/// Wrap-around cursor over a list of picture ids.
#[derive(Debug, Clone)]
pub struct Navigator {
    ids: Vec<i64>,
    position: usize,
}

impl Navigator {
    pub fn new(ids: Vec<i64>) -> Self {
        Self { ids, position: 0 }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current(&self) -> Option<i64> {
        self.ids.get(self.position).copied()
    }

    pub fn next(&mut self) -> Option<i64> {
        if self.ids.is_empty() {
            return None;
        }
        self.position = (self.position + 1) % self.ids.len();
        self.current()
    }

    pub fn previous(&mut self) -> Option<i64> {
        if self.ids.is_empty() {
            return None;
        }
        self.position = (self.position + self.ids.len() - 1) % self.ids.len();
        self.current()
    }

    /// Jump to `id` if listed.
    pub fn seek(&mut self, id: i64) -> bool {
        match self.ids.iter().position(|&i| i == id) {
            Some(position) => {
                self.position = position;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::MetadataExtractor;
    use crate::test_support::{create_patterned_image, in_memory_store};
    use image::GenericImageView;
    use tempfile::TempDir;

    fn catalog_image(store: &CatalogStore, temp_dir: &TempDir, name: &str) -> i64 {
        let path = temp_dir.path().join(name);
        create_patterned_image(&path, 80, 40, 3).unwrap();
        let extracted = MetadataExtractor::new(&["jpg".to_string()])
            .extract(&path)
            .unwrap();
        store
            .insert_catalog_entry(&extracted.picture, &extracted.file)
            .unwrap()
    }

    fn dimensions(bytes: &[u8]) -> (u32, u32) {
        image::load_from_memory(bytes).unwrap().dimensions()
    }

    #[test]
    fn test_rotation_keeps_signature() {
        let temp_dir = TempDir::new().unwrap();
        let store = in_memory_store();
        let id = catalog_image(&store, &temp_dir, "a.jpg");
        let editor = PictureEditor::new(&store);
        let signature = store.load_picture(id).unwrap().unwrap().content_signature;

        let rotated = editor.dispatch(id, PictureCommand::RotateClockwise).unwrap();
        assert_eq!(rotated.rotation, 90);
        assert_eq!(dimensions(&rotated.thumbnail), (40, 80));

        let back = editor.dispatch(id, PictureCommand::RotateAnticlockwise).unwrap();
        assert_eq!(back.rotation, 0);
        editor.dispatch(id, PictureCommand::RotateAnticlockwise).unwrap();

        let stored = store.load_picture(id).unwrap().unwrap();
        assert_eq!(stored.rotation, 270);
        assert_eq!(stored.content_signature, signature);
    }

    #[test]
    fn test_regenerate_and_refresh() {
        let temp_dir = TempDir::new().unwrap();
        let store = in_memory_store();
        let id = catalog_image(&store, &temp_dir, "a.jpg");
        let editor = PictureEditor::new(&store);
        let original = store.load_picture(id).unwrap().unwrap();

        editor.dispatch(id, PictureCommand::RotateClockwise).unwrap();
        let regenerated = editor.dispatch(id, PictureCommand::RegenerateThumbnail).unwrap();
        assert_eq!(regenerated.rotation, 0);
        assert_eq!(dimensions(&regenerated.thumbnail), (80, 40));

        store.refresh_signature(id, &original.thumbnail, "stale", 0).unwrap();
        let refreshed = editor.dispatch(id, PictureCommand::RefreshSignature).unwrap();
        assert_eq!(refreshed.content_signature, original.content_signature);
        assert_eq!(
            store.load_picture(id).unwrap().unwrap().content_signature,
            original.content_signature
        );
    }

    #[test]
    fn test_set_attributes_then_confirm_and_reset() {
        let temp_dir = TempDir::new().unwrap();
        let store = in_memory_store();
        let id = catalog_image(&store, &temp_dir, "a.jpg");
        let editor = PictureEditor::new(&store);

        let updated = editor
            .dispatch(
                id,
                PictureCommand::SetAttributes {
                    camera_make: Some(" Nikon ".to_string()),
                    camera_model: Some(String::new()),
                    capture_date: "2018-06-01 10:30".to_string(),
                    location: "51.5, -0.125, 12".to_string(),
                },
            )
            .unwrap();
        assert_eq!(updated.camera_make.as_deref(), Some("Nikon"));
        assert_eq!(updated.camera_model, None);
        assert_eq!(
            updated.capture_date,
            parse_date_text("2018-06-01 10:30:00").unwrap()
        );
        assert!(store.load_location(id).unwrap().is_none());

        let confirmed = editor.dispatch(id, PictureCommand::Confirm).unwrap();
        assert!(confirmed.rotation_reviewed);
        let location = store.load_location(id).unwrap().unwrap();
        assert!((location.longitude + 0.125).abs() < 1e-5);
        assert_eq!(location.altitude, Some(12.0));

        let view = editor.view(id).unwrap();
        assert!(view.text.contains("make:      Nikon"));
        assert!(view.text.contains("reviewed:  true"));
        assert!(view.text.contains("N 51"));

        editor.dispatch(id, PictureCommand::Reset).unwrap();
        assert!(!store.load_picture(id).unwrap().unwrap().rotation_reviewed);
        assert!(store.load_location(id).unwrap().is_none());
    }

    #[test]
    fn test_invalid_edit_text() {
        let temp_dir = TempDir::new().unwrap();
        let store = in_memory_store();
        let id = catalog_image(&store, &temp_dir, "a.jpg");
        let editor = PictureEditor::new(&store);

        let bad_date = editor.dispatch(
            id,
            PictureCommand::SetAttributes {
                camera_make: None,
                camera_model: None,
                capture_date: "yesterday".to_string(),
                location: String::new(),
            },
        );
        assert!(matches!(bad_date, Err(EditError::InvalidDate { .. })));
        assert!(matches!(
            parse_location_text("52.1"),
            Err(EditError::InvalidLocation { .. })
        ));
        assert!(matches!(
            parse_location_text("north, east"),
            Err(EditError::InvalidLocation { .. })
        ));
        assert!(parse_location_text("200, 4").unwrap().is_empty());
        assert!(matches!(
            editor.dispatch(999, PictureCommand::Confirm),
            Err(EditError::NotFound { id: 999 })
        ));
    }

    #[test]
    fn test_date_formats() {
        let expect = |text: &str, h: u32, m: u32, s: u32| {
            let date = parse_date_text(text).unwrap().unwrap();
            assert_eq!(
                date,
                NaiveDate::from_ymd_opt(2017, 12, 24)
                    .unwrap()
                    .and_hms_opt(h, m, s)
                    .unwrap()
            );
        };
        expect("2017-12-24", 0, 0, 0);
        expect("2017-12-24 18:05", 18, 5, 0);
        expect(" 2017-12-24 18:05:09 ", 18, 5, 9);
        assert!(parse_date_text("2017-12-24 18:05:09.250").unwrap().is_some());
        assert_eq!(parse_date_text("  ").unwrap(), None);
    }

    #[test]
    fn test_mark_reviewed_from_json() {
        let temp_dir = TempDir::new().unwrap();
        let store = in_memory_store();
        let a = catalog_image(&store, &temp_dir, "a.jpg");
        let b = catalog_image(&store, &temp_dir, "b.jpg");
        let editor = PictureEditor::new(&store);

        assert_eq!(editor.mark_reviewed(&format!("[{}, {}]", a, b)).unwrap(), 2);
        assert!(store.load_picture(b).unwrap().unwrap().rotation_reviewed);
        assert!(matches!(
            editor.mark_reviewed("1, 2"),
            Err(EditError::InvalidIdList(_))
        ));
    }

    #[test]
    fn test_navigator_wraps() {
        let mut nav = Navigator::new(vec![4, 8, 15]);
        assert_eq!(nav.current(), Some(4));
        assert_eq!(nav.previous(), Some(15));
        assert_eq!(nav.next(), Some(4));
        assert_eq!(nav.next(), Some(8));
        assert!(nav.seek(15));
        assert_eq!(nav.next(), Some(4));
        assert!(!nav.seek(16));

        let mut empty = Navigator::new(Vec::new());
        assert_eq!(empty.next(), None);
        assert!(empty.is_empty());
    }
}

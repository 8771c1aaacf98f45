use crate::core::exif::ExifService;
use crate::core::hash::HashService;
use crate::core::thumbnail::{ThumbnailError, ThumbnailService};
use crate::database::models::{FileRecord, PictureRecord};
use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported file type: {path}")]
    Unsupported { path: String },

    #[error("Unreadable image {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: ThumbnailError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractionError {
    /// True when the caller should just skip the file.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            ExtractionError::Unsupported { .. } | ExtractionError::Unreadable { .. }
        )
    }
}

/// Picture and file rows for one image, not yet persisted.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub picture: PictureRecord,
    pub file: FileRecord,
}

/// Reads one image file into catalog records.
pub struct MetadataExtractor {
    supported_formats: HashSet<String>,
    exif: ExifService,
    thumbnails: ThumbnailService,
    hasher: HashService,
}

impl MetadataExtractor {
    pub fn new(supported_formats: &[String]) -> Self {
        Self {
            supported_formats: supported_formats
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exif: ExifService::new(),
            thumbnails: ThumbnailService::new(),
            hasher: HashService::new(),
        }
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                self.supported_formats
                    .contains(&ext.to_string_lossy().to_lowercase())
            })
            .unwrap_or(false)
    }

    pub fn extract(&self, path: &Path) -> Result<Extracted, ExtractionError> {
        let path_text = path.to_string_lossy().to_string();
        if !self.is_supported(path) {
            return Err(ExtractionError::Unsupported { path: path_text });
        }

        let thumbnail = self
            .thumbnails
            .from_path(path, 0)
            .map_err(|source| ExtractionError::Unreadable {
                path: path_text.clone(),
                source,
            })?;
        let signature = self.hasher.compute_signature(&thumbnail);

        let snapshot = match self.exif.read(path) {
            Ok(snapshot) => snapshot.unwrap_or_default(),
            Err(e) => {
                log::warn!("Ignoring EXIF of {}: {}", path_text, e);
                Default::default()
            }
        };

        let picture = PictureRecord {
            id: None,
            capture_date: snapshot.capture_date,
            content_signature: Some(signature),
            camera_make: snapshot.camera_make,
            camera_model: snapshot.camera_model,
            gps: snapshot.gps,
            thumbnail,
            exif: snapshot.groups,
            rotation: 0,
            rotation_reviewed: false,
        };

        Ok(Extracted {
            picture,
            file: file_record(path)?,
        })
    }
}

/// File row for `path`, read straight from the filesystem entry.
pub fn file_record(path: &Path) -> Result<FileRecord, ExtractionError> {
    let metadata = fs::metadata(path)?;
    let modified = metadata.modified().map(to_local).ok();
    let created = metadata.created().map(to_local).ok();
    let fallback = modified.or(created).unwrap_or_else(|| to_local(SystemTime::UNIX_EPOCH));

    Ok(FileRecord {
        id: None,
        picture_id: None,
        path: path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        modified: modified.unwrap_or(fallback),
        created: created.unwrap_or(fallback),
        size: metadata.len() as i64,
        checked: true,
    })
}

/// Local wall clock time, truncated to whole seconds.
pub fn to_local(time: SystemTime) -> NaiveDateTime {
    let local: DateTime<Local> = time.into();
    let naive = local.naive_local();
    naive.with_nanosecond(0).unwrap_or(naive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        create_patterned_image, create_test_image, create_test_image_with_exif, ExifFixture,
    };
    use tempfile::TempDir;

    fn extractor() -> MetadataExtractor {
        MetadataExtractor::new(&crate::AppConfig::default().supported_formats)
    }

    #[test]
    fn test_unsupported_extension_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.txt");
        fs::write(&path, b"hello").unwrap();

        let err = extractor().extract(&path).unwrap_err();
        assert!(matches!(err, ExtractionError::Unsupported { .. }));
        assert!(err.is_skippable());
    }

    #[test]
    fn test_unreadable_image_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.jpg");
        fs::write(&path, b"definitely not a jpeg").unwrap();

        let err = extractor().extract(&path).unwrap_err();
        assert!(matches!(err, ExtractionError::Unreadable { .. }));
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let extractor = extractor();
        assert!(extractor.is_supported(Path::new("/a/IMG_0001.JPG")));
        assert!(extractor.is_supported(Path::new("/a/scan.Tif")));
        assert!(!extractor.is_supported(Path::new("/a/movie.mp4")));
        assert!(!extractor.is_supported(Path::new("/a/README")));
    }

    #[test]
    fn test_extract_file_record() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo.png");
        create_test_image(&path, 640, 480).unwrap();

        let extracted = extractor().extract(&path).unwrap();
        assert_eq!(extracted.file.name, "photo.png");
        assert_eq!(extracted.file.path, temp_dir.path().to_string_lossy());
        assert_eq!(extracted.file.full_path(), path);
        assert_eq!(extracted.file.size, fs::metadata(&path).unwrap().len() as i64);
        assert!(extracted.picture.gps.is_empty());
        assert!(extracted.picture.capture_date.is_none());
        assert_eq!(extracted.picture.rotation, 0);
    }

    #[test]
    fn test_identical_images_share_signature() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("a.png");
        let second = temp_dir.path().join("b.png");
        let other = temp_dir.path().join("c.png");
        create_patterned_image(&first, 900, 700, 1).unwrap();
        create_patterned_image(&second, 900, 700, 1).unwrap();
        create_patterned_image(&other, 900, 700, 2).unwrap();

        let extractor = extractor();
        let a = extractor.extract(&first).unwrap().picture;
        let b = extractor.extract(&second).unwrap().picture;
        let c = extractor.extract(&other).unwrap().picture;
        assert_eq!(a.content_signature, b.content_signature);
        assert_ne!(a.content_signature, c.content_signature);
    }

    #[test]
    fn test_extract_keeps_raw_gps() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tagged.jpg");
        create_test_image_with_exif(&path, 64, 48, &ExifFixture::amsterdam()).unwrap();

        let picture = extractor().extract(&path).unwrap().picture;
        assert_eq!(picture.camera_make.as_deref(), Some("Canon"));
        assert_eq!(picture.gps.latitude.as_ref().unwrap().reference, "N");
        let location = picture.location().unwrap();
        assert!((location.latitude - 52.0).abs() < 1e-9);
        assert_eq!(location.altitude, Some(12.5));
    }
}

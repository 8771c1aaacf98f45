//! Picking pictures from an outside folder that the catalog does not have.

use crate::config::AppConfig;
use crate::core::extractor::{Extracted, MetadataExtractor};
use crate::database::{CatalogStore, StoreError};
use crate::services::audit::{AuditAction, AuditLog, AuditRecord, MERGE_LOG_NAME};
use crate::services::quarantine::{move_file, MoveOutcome, QuarantineError};
use crate::services::{report, Phase, Progress, ProgressCallback};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Quarantine error: {0}")]
    Move(#[from] QuarantineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a candidate counts as already catalogued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchReason {
    Signature,
    CaptureDate,
    FileModified,
}

impl std::fmt::Display for MatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            MatchReason::Signature => "signature",
            MatchReason::CaptureDate => "capture date",
            MatchReason::FileModified => "file modified",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    pub examined: usize,
    pub selected: usize,
    pub kept: usize,
    pub failed: usize,
}

pub struct MergeSelector<'a> {
    store: &'a CatalogStore,
    extractor: MetadataExtractor,
    progress_callback: Option<ProgressCallback>,
}

impl<'a> MergeSelector<'a> {
    pub fn new(store: &'a CatalogStore, config: &AppConfig) -> Self {
        Self {
            store,
            extractor: MetadataExtractor::new(&config.supported_formats),
            progress_callback: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Move every picture below `source` that the catalog lacks into
    /// `destination`. Decisions go to the audit log in `source`.
    pub fn select(&self, source: &Path, destination: &Path) -> Result<MergeReport, MergeError> {
        if !source.is_dir() {
            return Err(MergeError::InvalidPath {
                path: source.to_string_lossy().to_string(),
            });
        }
        fs::create_dir_all(destination)?;

        let audit = AuditLog::in_folder(source, MERGE_LOG_NAME);
        audit.record(
            AuditRecord::new(AuditAction::RunStarted)
                .source(source)
                .destination(destination),
        );

        let candidates = self.candidates(source, destination);
        let total = candidates.len();
        let mut outcome = MergeReport::default();

        for (i, path) in candidates.iter().enumerate() {
            report(
                self.progress_callback.as_ref(),
                Progress {
                    phase: Phase::Merge,
                    processed: i + 1,
                    total,
                    current: path.to_string_lossy().to_string(),
                },
            );
            outcome.examined += 1;

            let extracted = match self.extractor.extract(path) {
                Ok(extracted) => extracted,
                Err(e) => {
                    log::warn!("Leaving {}: {}", path.display(), e);
                    outcome.failed += 1;
                    continue;
                }
            };

            if let Some(reason) = self.catalogued(&extracted)? {
                log::debug!("{} already catalogued ({})", path.display(), reason);
                audit.record(
                    AuditRecord::new(AuditAction::Kept)
                        .source(path)
                        .detail(format!("match {}", reason)),
                );
                outcome.kept += 1;
                continue;
            }

            match move_file(path, destination, "merged") {
                Ok(MoveOutcome::Moved { destination }) => {
                    audit.record(
                        AuditRecord::new(AuditAction::Selected)
                            .source(path)
                            .destination(&destination),
                    );
                    outcome.selected += 1;
                }
                Ok(MoveOutcome::AlreadyAbsent) => {
                    audit.record(AuditRecord::new(AuditAction::AlreadyAbsent).source(path));
                    outcome.failed += 1;
                }
                Err(e) => {
                    log::error!("{}", e);
                    audit.record(
                        AuditRecord::new(AuditAction::MoveFailed)
                            .source(path)
                            .detail(e.to_string()),
                    );
                    outcome.failed += 1;
                }
            }
        }

        log::info!("Merge selection of {} done: {:?}", source.display(), outcome);
        Ok(outcome)
    }

    /// Signature first; then capture date, or the file's modified time when
    /// the picture has no capture date.
    fn catalogued(&self, extracted: &Extracted) -> Result<Option<MatchReason>, StoreError> {
        if let Some(signature) = &extracted.picture.content_signature {
            if self.store.signature_exists(signature)? {
                return Ok(Some(MatchReason::Signature));
            }
        }
        match extracted.picture.capture_date {
            Some(date) if self.store.capture_date_exists(date)? => Ok(Some(MatchReason::CaptureDate)),
            Some(_) => Ok(None),
            None if self.store.file_modified_exists(extracted.file.modified)? => {
                Ok(Some(MatchReason::FileModified))
            }
            None => Ok(None),
        }
    }

    fn candidates(&self, source: &Path, destination: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = WalkDir::new(source)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| !p.starts_with(destination) && self.extractor.is_supported(p))
            .collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        create_patterned_image, create_test_image_with_exif, in_memory_store, ExifFixture,
    };
    use tempfile::TempDir;

    #[test]
    fn test_select_moves_only_unknown_pictures() {
        let temp_dir = TempDir::new().unwrap();
        let library = temp_dir.path().join("library");
        let incoming = temp_dir.path().join("incoming");
        let destination = temp_dir.path().join("to_import");
        fs::create_dir_all(&library).unwrap();
        fs::create_dir_all(&incoming).unwrap();

        let store = in_memory_store();
        let config = AppConfig::default();
        let extractor = MetadataExtractor::new(&config.supported_formats);

        // Catalogued picture, and its copy in the incoming folder.
        let known = library.join("known.jpg");
        create_patterned_image(&known, 50, 50, 1).unwrap();
        let extracted = extractor.extract(&known).unwrap();
        store
            .insert_catalog_entry(&extracted.picture, &extracted.file)
            .unwrap();
        fs::copy(&known, incoming.join("copy.jpg")).unwrap();

        // Same capture date as a catalogued picture, different pixels.
        let dated = library.join("dated.jpg");
        create_test_image_with_exif(&dated, 30, 20, &ExifFixture::amsterdam()).unwrap();
        let extracted = extractor.extract(&dated).unwrap();
        store
            .insert_catalog_entry(&extracted.picture, &extracted.file)
            .unwrap();
        create_test_image_with_exif(&incoming.join("same_day.jpg"), 60, 20, &ExifFixture::amsterdam())
            .unwrap();

        // No capture date and a modified time no catalogued file shares.
        let new = incoming.join("new.jpg");
        create_patterned_image(&new, 50, 50, 9).unwrap();
        fs::File::options()
            .write(true)
            .open(&new)
            .unwrap()
            .set_modified(std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000_000))
            .unwrap();
        fs::write(incoming.join("notes.txt"), b"not a picture").unwrap();

        let selector = MergeSelector::new(&store, &config);
        let report = selector.select(&incoming, &destination).unwrap();

        assert_eq!(
            report,
            MergeReport {
                examined: 3,
                selected: 1,
                kept: 2,
                failed: 0
            }
        );
        assert!(destination.join("new.jpg").exists());
        assert!(!incoming.join("new.jpg").exists());
        assert!(incoming.join("copy.jpg").exists());
        assert!(incoming.join("same_day.jpg").exists());

        let records = AuditLog::in_folder(&incoming, MERGE_LOG_NAME).read_all().unwrap();
        let kept: Vec<String> = records
            .iter()
            .filter(|r| r.action == AuditAction::Kept)
            .filter_map(|r| r.detail.clone())
            .collect();
        assert_eq!(kept, vec!["match signature", "match capture date"]);
    }

    #[test]
    fn test_select_rejects_missing_source() {
        let temp_dir = TempDir::new().unwrap();
        let store = in_memory_store();
        let selector = MergeSelector::new(&store, &AppConfig::default());
        assert!(matches!(
            selector.select(&temp_dir.path().join("nope"), temp_dir.path()),
            Err(MergeError::InvalidPath { .. })
        ));
    }
}

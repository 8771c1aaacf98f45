//! Folder to catalog reconciliation.
//!
//! Each candidate file is either NEW (no file row with the same path and
//! name: extracted and inserted), EXISTING (marked checked, not re-read) or,
//! for rows not visited during the pass, ORPHAN. Orphans stay unchecked until
//! [`SyncReconciler::purge_orphans`] is invoked explicitly.

use crate::config::AppConfig;
use crate::core::extractor::{Extracted, ExtractionError, MetadataExtractor};
use crate::database::{CatalogStore, StoreError};
use crate::services::{report, Phase, Progress, ProgressCallback};
use glob::Pattern;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("Invalid exclude pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub discovered: usize,
    pub inserted: usize,
    pub already_present: usize,
    pub skipped: usize,
    pub failed: usize,
    /// File rows left unchecked after the pass.
    pub orphans: usize,
}

pub struct SyncReconciler<'a> {
    store: &'a CatalogStore,
    extractor: MetadataExtractor,
    exclude_patterns: Vec<Pattern>,
    batch_size: usize,
    progress_callback: Option<ProgressCallback>,
}

impl<'a> SyncReconciler<'a> {
    pub fn new(store: &'a CatalogStore, config: &AppConfig) -> Result<Self, SyncError> {
        let exclude_patterns = config
            .exclude_patterns
            .iter()
            .map(|pattern| Pattern::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            store,
            extractor: MetadataExtractor::new(&config.supported_formats),
            exclude_patterns,
            batch_size: config.extraction_batch_size.max(1),
            progress_callback: None,
        })
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Incremental pass over `root`.
    pub fn sync(&self, root: &Path) -> Result<SyncReport, SyncError> {
        let candidates = self.discover(root)?;
        let total = candidates.len();
        let mut report = SyncReport {
            discovered: total,
            ..Default::default()
        };

        self.store.mark_all_files_unchecked()?;

        let mut new_files = Vec::new();
        for (i, path) in candidates.into_iter().enumerate() {
            let (dir, name) = split_path(&path);
            match self.store.find_picture_id_by_path_name(&dir, &name) {
                Ok(Some(picture_id)) => match self.store.mark_file_checked(picture_id) {
                    Ok(_) => report.already_present += 1,
                    Err(e) => {
                        log::error!("Failed to mark {} checked: {}", path.display(), e);
                        report.failed += 1;
                    }
                },
                Ok(None) => new_files.push(path.clone()),
                Err(e) => {
                    log::error!("Lookup of {} failed: {}", path.display(), e);
                    report.failed += 1;
                }
            }
            self.progress(Phase::Reconcile, i + 1, total, &path);
        }

        log::info!(
            "{} of {} files already catalogued, {} new",
            report.already_present,
            total,
            new_files.len()
        );
        self.insert_all(new_files, &mut report);

        report.orphans = self.store.unchecked_picture_ids()?.len();
        self.progress(Phase::Complete, total, total, root);
        log::info!("Sync of {} done: {:?}", root.display(), report);
        Ok(report)
    }

    /// Extract and insert every candidate without looking for existing rows.
    /// Only meaningful on an empty catalog.
    pub fn full_rebuild(&self, root: &Path) -> Result<SyncReport, SyncError> {
        let candidates = self.discover(root)?;
        let existing = self.store.stats()?.pictures;
        if existing > 0 {
            log::warn!(
                "Full rebuild on a catalog that already holds {} pictures; duplicates will follow",
                existing
            );
        }

        let mut report = SyncReport {
            discovered: candidates.len(),
            ..Default::default()
        };
        self.insert_all(candidates, &mut report);
        self.progress(Phase::Complete, report.discovered, report.discovered, root);
        log::info!("Rebuild of {} done: {:?}", root.display(), report);
        Ok(report)
    }

    /// Delete every picture whose file was not seen by the last pass.
    pub fn purge_orphans(&self) -> Result<Vec<i64>, SyncError> {
        let orphans = self.store.unchecked_picture_ids()?;
        let total = orphans.len();
        let mut purged = Vec::with_capacity(total);

        for (i, id) in orphans.into_iter().enumerate() {
            let location = self
                .store
                .load_file(id)
                .ok()
                .flatten()
                .map(|f| f.full_path().display().to_string())
                .unwrap_or_default();

            match self.store.delete_pictures(&[id]) {
                Ok(_) => {
                    log::info!("Purged orphan picture {} ({})", id, location);
                    purged.push(id);
                }
                Err(e) => log::error!("Failed to purge picture {} ({}): {}", id, location, e),
            }
            self.progress(Phase::Purge, i + 1, total, Path::new(&location));
        }

        Ok(purged)
    }

    /// Supported, non-excluded files below `root`, sorted.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>, SyncError> {
        if !root.is_dir() {
            return Err(SyncError::InvalidPath {
                path: root.to_string_lossy().to_string(),
            });
        }
        self.progress(Phase::Discovery, 0, 0, root);

        let mut discovered = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::warn!("Skipping unreadable entry: {}", err);
                    None
                }
            })
        {
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }

            let path_str = path.to_string_lossy();
            if self
                .exclude_patterns
                .iter()
                .any(|pattern| pattern.matches(&path_str))
            {
                continue;
            }

            if self.extractor.is_supported(path) {
                discovered.push(path.to_path_buf());
            }
        }

        discovered.sort();
        Ok(discovered)
    }

    /// Extract in parallel chunks, then insert one unit of work per file.
    fn insert_all(&self, files: Vec<PathBuf>, report: &mut SyncReport) {
        let total = files.len();
        let mut processed = 0;
        let extractor = &self.extractor;

        for chunk in files.chunks(self.batch_size) {
            let extracted: Vec<(&PathBuf, Result<Extracted, ExtractionError>)> = chunk
                .par_iter()
                .map(|path| (path, extractor.extract(path)))
                .collect();

            for (path, result) in extracted {
                processed += 1;
                match result {
                    Ok(entry) => {
                        match self.store.insert_catalog_entry(&entry.picture, &entry.file) {
                            Ok(id) => {
                                log::debug!("Catalogued {} as picture {}", path.display(), id);
                                report.inserted += 1;
                            }
                            Err(e) => {
                                log::error!("Failed to catalogue {}: {}", path.display(), e);
                                report.failed += 1;
                            }
                        }
                    }
                    Err(e) if e.is_skippable() => {
                        log::warn!("Skipping {}: {}", path.display(), e);
                        report.skipped += 1;
                    }
                    Err(e) => {
                        log::error!("Failed to read {}: {}", path.display(), e);
                        report.failed += 1;
                    }
                }
                self.progress(Phase::Extract, processed, total, path);
            }
        }
    }

    fn progress(&self, phase: Phase, processed: usize, total: usize, current: &Path) {
        report(
            self.progress_callback.as_ref(),
            Progress {
                phase,
                processed,
                total,
                current: current.to_string_lossy().to_string(),
            },
        );
    }
}

/// Parent directory and file name, as stored in the files table.
pub fn split_path(path: &Path) -> (String, String) {
    let dir = path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    (dir, name)
}

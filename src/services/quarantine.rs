use crate::database::{CatalogStore, StoreError};
use crate::services::audit::{AuditAction, AuditLog, AuditRecord};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuarantineError {
    #[error("Failed to create folder {path}: {source}")]
    CreateFolder {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    Move {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No free file name for {path} in {folder}")]
    NameExhausted { path: String, folder: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    Moved { destination: PathBuf },
    /// Nothing to move.
    AlreadyAbsent,
}

/// Folder that removed files are moved into.
#[derive(Debug, Clone)]
pub struct Quarantine {
    folder: PathBuf,
}

impl Quarantine {
    pub fn new(folder: &Path) -> Result<Self, QuarantineError> {
        fs::create_dir_all(folder).map_err(|source| QuarantineError::CreateFolder {
            path: folder.to_string_lossy().to_string(),
            source,
        })?;
        Ok(Self {
            folder: folder.to_path_buf(),
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Move the file of picture `picture_id` into the quarantine folder.
    pub fn admit(&self, source: &Path, picture_id: i64) -> Result<MoveOutcome, QuarantineError> {
        move_file(source, &self.folder, &picture_id.to_string())
    }

    /// Quarantine the file and record the outcome. Returns whether the
    /// catalog row may be deleted: yes when moved or already gone, no when
    /// the move failed.
    pub fn evict(&self, picture_id: i64, source: &Path, audit: &AuditLog) -> bool {
        match self.admit(source, picture_id) {
            Ok(MoveOutcome::Moved { destination }) => {
                log::info!("Moved {} to {}", source.display(), destination.display());
                audit.record(
                    AuditRecord::new(AuditAction::Deleted)
                        .picture(picture_id)
                        .source(source)
                        .destination(&destination),
                );
                true
            }
            Ok(MoveOutcome::AlreadyAbsent) => {
                log::warn!("File {} already absent, deleting catalog entry", source.display());
                audit.record(
                    AuditRecord::new(AuditAction::AlreadyAbsent)
                        .picture(picture_id)
                        .source(source),
                );
                true
            }
            Err(e) => {
                log::error!("Keeping picture {}: {}", picture_id, e);
                audit.record(
                    AuditRecord::new(AuditAction::MoveFailed)
                        .picture(picture_id)
                        .source(source)
                        .detail(e.to_string()),
                );
                false
            }
        }
    }

    /// Remove every catalog entry whose file id is in `[start, end]`, or
    /// `>= start` without an end.
    pub fn remove_file_range(
        &self,
        store: &CatalogStore,
        audit: &AuditLog,
        start: i64,
        end: Option<i64>,
    ) -> Result<RemovalReport, StoreError> {
        let entries = store.file_entries_in_id_range(start, end)?;
        audit.record(AuditRecord::new(AuditAction::RunStarted).detail(format!(
            "remove file ids {}..{}",
            start,
            end.map(|e| e.to_string()).unwrap_or_default()
        )));

        let mut report = RemovalReport::default();
        for entry in entries {
            let Some(picture_id) = entry.picture_id else {
                continue;
            };
            report.considered += 1;
            if !self.evict(picture_id, &entry.full_path(), audit) {
                report.kept += 1;
                continue;
            }
            match store.delete_pictures(&[picture_id]) {
                Ok(n) => report.deleted += n,
                Err(e) => {
                    log::error!("Failed to delete picture {}: {}", picture_id, e);
                    report.kept += 1;
                }
            }
        }

        log::info!("Range removal done: {:?}", report);
        Ok(report)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemovalReport {
    pub considered: usize,
    pub deleted: usize,
    pub kept: usize,
}

/// Move `source` into `folder`, keeping its name when free and otherwise
/// adding `_<tag>` (then a counter) before the extension.
pub fn move_file(source: &Path, folder: &Path, tag: &str) -> Result<MoveOutcome, QuarantineError> {
    if !source.is_file() {
        return Ok(MoveOutcome::AlreadyAbsent);
    }

    let destination = free_destination(source, folder, tag)?;
    let move_error = |e: std::io::Error| QuarantineError::Move {
        from: source.to_string_lossy().to_string(),
        to: destination.to_string_lossy().to_string(),
        source: e,
    };

    match fs::rename(source, &destination) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound && !source.exists() => {
            return Ok(MoveOutcome::AlreadyAbsent);
        }
        Err(e) => {
            // Across file systems rename fails; copy then remove instead.
            log::debug!("Rename failed ({}), copying {}", e, source.display());
            fs::copy(source, &destination).map_err(move_error)?;
            if let Err(e) = fs::remove_file(source) {
                let _ = fs::remove_file(&destination);
                return Err(move_error(e));
            }
        }
    }

    Ok(MoveOutcome::Moved { destination })
}

fn free_destination(source: &Path, folder: &Path, tag: &str) -> Result<PathBuf, QuarantineError> {
    let name = source.file_name().unwrap_or_default();
    let plain = folder.join(name);
    if !plain.exists() {
        return Ok(plain);
    }

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for n in 0..1000 {
        let candidate = if n == 0 {
            folder.join(format!("{}_{}{}", stem, tag, extension))
        } else {
            folder.join(format!("{}_{}_{}{}", stem, tag, n, extension))
        };
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(QuarantineError::NameExhausted {
        path: source.to_string_lossy().to_string(),
        folder: folder.to_string_lossy().to_string(),
    })
}

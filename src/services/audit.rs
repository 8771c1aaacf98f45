//! Append-only JSON Lines audit log of destructive operations.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub const RESOLVE_LOG_NAME: &str = "_delete_duplicate_pictures.jsonl";
pub const MERGE_LOG_NAME: &str = "_select_pictures_to_merge.jsonl";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RunStarted,
    /// File moved to quarantine, picture deleted.
    Deleted,
    /// File was already gone, picture deleted.
    AlreadyAbsent,
    /// File could not be moved, picture kept.
    MoveFailed,
    Skipped,
    Aborted,
    /// Merge candidate moved into the destination.
    Selected,
    /// Merge candidate already catalogued, left in place.
    Kept,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub timestamp: String,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditRecord {
    pub fn new(action: AuditAction) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339(),
            action,
            picture_id: None,
            source: None,
            destination: None,
            detail: None,
        }
    }

    pub fn picture(mut self, picture_id: i64) -> Self {
        self.picture_id = Some(picture_id);
        self
    }

    pub fn source(mut self, path: &Path) -> Self {
        self.source = Some(path.to_string_lossy().into_owned());
        self
    }

    pub fn destination(mut self, path: &Path) -> Self {
        self.destination = Some(path.to_string_lossy().into_owned());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_folder(folder: &Path, file_name: &str) -> Self {
        Self::new(folder.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &AuditRecord) -> std::io::Result<()> {
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record).map_err(std::io::Error::other)?;
        writeln!(out, "{}", line)
    }

    /// Append, logging instead of failing. The audit trail never aborts the
    /// operation it records.
    pub fn record(&self, record: AuditRecord) {
        if let Err(e) = self.append(&record) {
            log::error!(
                "Failed to write audit record to {}: {} ({:?})",
                self.path.display(),
                e,
                record
            );
        }
    }

    /// Every well-formed record; malformed lines are skipped with a warning.
    pub fn read_all(&self) -> std::io::Result<Vec<AuditRecord>> {
        let f = File::open(&self.path)?;
        let reader = BufReader::new(f);

        let mut records = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditRecord>(&line) {
                Ok(record) => records.push(record),
                Err(err) => log::warn!("Skipping malformed audit entry {}: {}", i, err),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let log = AuditLog::in_folder(temp_dir.path(), RESOLVE_LOG_NAME);

        log.record(AuditRecord::new(AuditAction::RunStarted).detail("key=signature"));
        log.record(
            AuditRecord::new(AuditAction::Deleted)
                .picture(12)
                .source(Path::new("/photos/a.jpg"))
                .destination(Path::new("/quarantine/a.jpg")),
        );

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, AuditAction::RunStarted);
        assert_eq!(records[1].picture_id, Some(12));
        assert_eq!(records[1].source.as_deref(), Some("/photos/a.jpg"));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let log = AuditLog::in_folder(temp_dir.path(), "audit.jsonl");
        log.record(AuditRecord::new(AuditAction::Skipped).picture(1));
        std::fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .unwrap()
            .write_all(b"{not json\n")
            .unwrap();
        log.record(AuditRecord::new(AuditAction::Aborted));

        let actions: Vec<AuditAction> = log.read_all().unwrap().iter().map(|r| r.action).collect();
        assert_eq!(actions, vec![AuditAction::Skipped, AuditAction::Aborted]);
    }

    #[test]
    fn test_serialized_action_names() {
        let line = serde_json::to_string(&AuditRecord::new(AuditAction::AlreadyAbsent)).unwrap();
        assert!(line.contains("\"action\":\"already_absent\""));
        assert!(!line.contains("picture_id"));
    }
}

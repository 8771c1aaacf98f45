//! Interactive duplicate resolution.
//!
//! Groups come from [`CatalogStore::list_duplicate_groups`] in ascending key
//! order. Members reviewed after the cutoff are left out; what remains is
//! numbered 1..k and handed to a [`Presenter`], whose [`Decision`] is applied
//! and committed before the next group is shown.

use crate::database::models::{DuplicateGroup, FileRecord, IdentityKey};
use crate::database::{CatalogStore, StoreError};
use crate::services::audit::{AuditAction, AuditLog, AuditRecord, RESOLVE_LOG_NAME};
use crate::services::quarantine::{Quarantine, QuarantineError};
use crate::services::{report, Phase, Progress, ProgressCallback};
use chrono::{Local, NaiveDateTime, Timelike};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

pub const REVIEWER_NAME_MIN: usize = 6;
pub const REVIEWER_NAME_MAX: usize = 19;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Reviewer name must be {min} to {max} characters, got {name:?}")]
    InvalidReviewer {
        name: String,
        min: usize,
        max: usize,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Quarantine error: {0}")]
    Quarantine(#[from] QuarantineError),

    #[error("Presenter failed: {0}")]
    Presenter(String),
}

/// One group member as shown to the reviewer.
#[derive(Debug, Clone)]
pub struct ReviewCandidate {
    /// 1-based, stable within the group.
    pub index: usize,
    pub picture_id: i64,
    pub file: Option<FileRecord>,
    pub thumbnail: Vec<u8>,
    pub display: String,
}

#[derive(Debug, Clone)]
pub struct ReviewGroup {
    pub key: String,
    /// 1-based position among all groups of the run.
    pub position: usize,
    pub total: usize,
    pub candidates: Vec<ReviewCandidate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Skip,
    Abort,
    /// Candidate indices to delete.
    Delete(Vec<usize>),
}

/// Shows a group and returns the reviewer's decision. Holds all rendering.
pub trait Presenter {
    fn decide(&mut self, group: &ReviewGroup) -> Result<Decision, ResolveError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolutionReport {
    pub groups: usize,
    /// Groups with no member left after the cutoff filter.
    pub suppressed: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub kept_on_error: usize,
    /// Groups left as they were because the catalog could not be read or
    /// written.
    pub failed: usize,
    pub aborted: bool,
}

pub fn validate_reviewer(name: &str) -> Result<(), ResolveError> {
    let len = name.chars().count();
    if (REVIEWER_NAME_MIN..=REVIEWER_NAME_MAX).contains(&len) {
        Ok(())
    } else {
        Err(ResolveError::InvalidReviewer {
            name: name.to_string(),
            min: REVIEWER_NAME_MIN,
            max: REVIEWER_NAME_MAX,
        })
    }
}

pub struct DuplicateResolver<'a> {
    store: &'a CatalogStore,
    quarantine: Quarantine,
    audit: AuditLog,
    reviewer: String,
    progress_callback: Option<ProgressCallback>,
}

impl<'a> DuplicateResolver<'a> {
    pub fn new(
        store: &'a CatalogStore,
        quarantine_folder: &Path,
        reviewer: &str,
    ) -> Result<Self, ResolveError> {
        validate_reviewer(reviewer)?;
        let quarantine = Quarantine::new(quarantine_folder)?;
        let audit = AuditLog::in_folder(quarantine.folder(), RESOLVE_LOG_NAME);
        Ok(Self {
            store,
            quarantine,
            audit,
            reviewer: reviewer.to_string(),
            progress_callback: None,
        })
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn resolve(
        &self,
        key: IdentityKey,
        cutoff: NaiveDateTime,
        presenter: &mut dyn Presenter,
    ) -> Result<ResolutionReport, ResolveError> {
        let groups = self.store.list_duplicate_groups(key)?;
        let total = groups.len();
        log::info!("{} duplicate groups by {}", total, key);
        self.audit.record(AuditRecord::new(AuditAction::RunStarted).detail(format!(
            "key={} cutoff={} reviewer={}",
            key, cutoff, self.reviewer
        )));

        let mut outcome = ResolutionReport {
            groups: total,
            ..Default::default()
        };

        for (i, group) in groups.iter().enumerate() {
            report(
                self.progress_callback.as_ref(),
                Progress {
                    phase: Phase::Resolve,
                    processed: i + 1,
                    total,
                    current: group.key.clone(),
                },
            );

            let candidates = match self.candidates(group, cutoff) {
                Ok(candidates) => candidates,
                Err(e) => {
                    log::error!(
                        "Leaving group {} {:?}: {}",
                        group.key,
                        group.picture_ids,
                        e
                    );
                    outcome.failed += 1;
                    continue;
                }
            };
            if candidates.is_empty() {
                log::debug!("Group {} reviewed after cutoff, skipping", group.key);
                outcome.suppressed += 1;
                continue;
            }

            let review_group = ReviewGroup {
                key: group.key.clone(),
                position: i + 1,
                total,
                candidates,
            };

            match presenter.decide(&review_group)? {
                Decision::Abort => {
                    log::info!("Resolution aborted at group {}", group.key);
                    self.audit
                        .record(AuditRecord::new(AuditAction::Aborted).detail(group.key.clone()));
                    outcome.aborted = true;
                    break;
                }
                Decision::Skip => match self.skip(&review_group) {
                    Ok(()) => outcome.skipped += 1,
                    Err(e) => {
                        log::error!(
                            "Could not record reviews for group {} {:?}: {}",
                            group.key,
                            group.picture_ids,
                            e
                        );
                        outcome.failed += 1;
                    }
                },
                Decision::Delete(indices) => match self.delete(&review_group, &indices) {
                    Ok((deleted, kept)) => {
                        outcome.deleted += deleted;
                        outcome.kept_on_error += kept;
                    }
                    Err(e) => {
                        log::error!("Could not delete from group {}: {}", group.key, e);
                        outcome.failed += 1;
                    }
                },
            }
        }

        log::info!("Resolution finished: {:?}", outcome);
        Ok(outcome)
    }

    fn candidates(
        &self,
        group: &DuplicateGroup,
        cutoff: NaiveDateTime,
    ) -> Result<Vec<ReviewCandidate>, StoreError> {
        let mut candidates = Vec::new();
        for &picture_id in &group.picture_ids {
            if !self.store.review_required(picture_id, cutoff)? {
                continue;
            }
            let Some(picture) = self.store.load_picture(picture_id)? else {
                continue;
            };
            let file = self.store.load_file(picture_id)?;

            let index = candidates.len() + 1;
            let path = file
                .as_ref()
                .map(|f| f.full_path().to_string_lossy().to_string())
                .unwrap_or_else(|| "<no file>".to_string());
            let display = format!(
                "{}: {} [{} | {} {}]",
                index,
                path,
                picture
                    .capture_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                picture.camera_make.as_deref().unwrap_or("-"),
                picture.camera_model.as_deref().unwrap_or("-"),
            );

            candidates.push(ReviewCandidate {
                index,
                picture_id,
                file,
                thumbnail: picture.thumbnail,
                display,
            });
        }
        Ok(candidates)
    }

    fn skip(&self, group: &ReviewGroup) -> Result<(), StoreError> {
        let ids: Vec<i64> = group.candidates.iter().map(|c| c.picture_id).collect();
        self.store.add_reviews(&ids, &self.reviewer, review_time())?;
        for &id in &ids {
            self.audit.record(
                AuditRecord::new(AuditAction::Skipped)
                    .picture(id)
                    .detail(group.key.clone()),
            );
        }
        Ok(())
    }

    /// Quarantine the selected files, then delete their pictures in one
    /// commit. Returns (deleted, kept because the move failed).
    fn delete(&self, group: &ReviewGroup, indices: &[usize]) -> Result<(usize, usize), StoreError> {
        let selected: BTreeSet<usize> = indices.iter().copied().collect();
        let mut doomed = Vec::new();
        let mut kept = 0;

        for index in selected {
            let Some(candidate) = group.candidates.iter().find(|c| c.index == index) else {
                log::warn!("Ignoring index {} for group {}", index, group.key);
                continue;
            };

            let removable = match &candidate.file {
                Some(file) => self
                    .quarantine
                    .evict(candidate.picture_id, &file.full_path(), &self.audit),
                None => {
                    self.audit
                        .record(AuditRecord::new(AuditAction::AlreadyAbsent).picture(candidate.picture_id));
                    true
                }
            };
            if removable {
                doomed.push(candidate.picture_id);
            } else {
                kept += 1;
            }
        }

        // Moved files whose rows survive a failed commit turn up as orphans
        // on the next sync.
        let deleted = self.store.delete_pictures(&doomed).map_err(|e| {
            log::error!("Pictures {:?} were quarantined but not deleted", doomed);
            e
        })?;
        Ok((deleted, kept))
    }
}

fn review_time() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::MetadataExtractor;
    use crate::database::repositories::default_review_cutoff;
    use crate::test_support::{create_patterned_image, in_memory_store};
    use chrono::Duration;
    use std::collections::VecDeque;
    use std::fs;
    use tempfile::TempDir;

    struct ScriptedPresenter {
        decisions: VecDeque<Decision>,
        shown: Vec<ReviewGroup>,
    }

    impl ScriptedPresenter {
        fn new(decisions: Vec<Decision>) -> Self {
            Self {
                decisions: decisions.into(),
                shown: Vec::new(),
            }
        }
    }

    impl Presenter for ScriptedPresenter {
        fn decide(&mut self, group: &ReviewGroup) -> Result<Decision, ResolveError> {
            self.shown.push(group.clone());
            self.decisions
                .pop_front()
                .ok_or_else(|| ResolveError::Presenter("script exhausted".to_string()))
        }
    }

    /// Writes the same image under each folder and catalogs it.
    fn catalog_copies(
        store: &CatalogStore,
        root: &Path,
        folders: &[&str],
        seed: u32,
    ) -> Vec<(i64, std::path::PathBuf)> {
        let extractor = MetadataExtractor::new(&["jpg".to_string()]);
        folders
            .iter()
            .map(|folder| {
                let dir = root.join(folder);
                fs::create_dir_all(&dir).unwrap();
                let path = dir.join(format!("img{}.jpg", seed));
                create_patterned_image(&path, 64, 48, seed).unwrap();
                let extracted = extractor.extract(&path).unwrap();
                let id = store
                    .insert_catalog_entry(&extracted.picture, &extracted.file)
                    .unwrap();
                (id, path)
            })
            .collect()
    }

    fn now_plus(seconds: i64) -> NaiveDateTime {
        review_time() + Duration::seconds(seconds)
    }

    #[test]
    fn test_delete_first_of_identical_pair() {
        let temp_dir = TempDir::new().unwrap();
        let store = in_memory_store();
        let copies = catalog_copies(&store, temp_dir.path(), &["a", "b"], 1);
        let (first, first_path) = copies[0].clone();
        let (second, second_path) = copies[1].clone();

        let quarantine_dir = temp_dir.path().join("deleted");
        let resolver = DuplicateResolver::new(&store, &quarantine_dir, "reviewer").unwrap();
        let mut presenter = ScriptedPresenter::new(vec![Decision::Delete(vec![1])]);

        let report = resolver
            .resolve(IdentityKey::Signature, now_plus(60), &mut presenter)
            .unwrap();

        assert_eq!(presenter.shown.len(), 1);
        assert_eq!(presenter.shown[0].candidates.len(), 2);
        assert_eq!(presenter.shown[0].candidates[0].picture_id, first);
        assert_eq!(report.deleted, 1);

        assert!(store.load_picture(first).unwrap().is_none());
        assert!(store.load_picture(second).unwrap().is_some());
        assert!(!first_path.exists());
        assert!(second_path.exists());
        assert!(quarantine_dir.join("img1.jpg").exists());

        let records = resolver.audit_log().read_all().unwrap();
        let deleted: Vec<&AuditRecord> = records
            .iter()
            .filter(|r| r.action == AuditAction::Deleted)
            .collect();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].picture_id, Some(first));
    }

    #[test]
    fn test_skip_suppresses_until_cutoff_passes() {
        let temp_dir = TempDir::new().unwrap();
        let store = in_memory_store();
        let copies = catalog_copies(&store, temp_dir.path(), &["a", "b"], 2);

        let resolver =
            DuplicateResolver::new(&store, &temp_dir.path().join("q"), "reviewer").unwrap();
        let mut presenter = ScriptedPresenter::new(vec![Decision::Skip]);
        let report = resolver
            .resolve(IdentityKey::Signature, now_plus(60), &mut presenter)
            .unwrap();
        assert_eq!(report.skipped, 1);

        let reviewed_at = store.latest_review_time(copies[0].0).unwrap();
        assert_eq!(store.reviews_for(copies[1].0).unwrap().len(), 1);

        // Cutoff before the review: nothing to show.
        let mut silent = ScriptedPresenter::new(vec![]);
        let report = resolver
            .resolve(
                IdentityKey::Signature,
                reviewed_at - Duration::seconds(1),
                &mut silent,
            )
            .unwrap();
        assert_eq!(report.suppressed, 1);
        assert!(silent.shown.is_empty());

        // Cutoff after the review: prompted again.
        let mut again = ScriptedPresenter::new(vec![Decision::Skip]);
        resolver
            .resolve(
                IdentityKey::Signature,
                reviewed_at + Duration::seconds(1),
                &mut again,
            )
            .unwrap();
        assert_eq!(again.shown.len(), 1);
        assert_eq!(store.stats().unwrap().pictures, 2);
    }

    #[test]
    fn test_default_cutoff_suppresses_any_review() {
        let temp_dir = TempDir::new().unwrap();
        let store = in_memory_store();
        catalog_copies(&store, temp_dir.path(), &["a", "b"], 6);
        catalog_copies(&store, temp_dir.path(), &["c", "d"], 7);

        let resolver =
            DuplicateResolver::new(&store, &temp_dir.path().join("q"), "reviewer").unwrap();
        let mut presenter = ScriptedPresenter::new(vec![Decision::Skip, Decision::Abort]);
        let report = resolver
            .resolve(IdentityKey::Signature, default_review_cutoff(), &mut presenter)
            .unwrap();
        assert!(report.aborted);
        assert_eq!(presenter.shown.len(), 2);

        // Only the group that was never reviewed comes back.
        let skipped = presenter.shown[0].key.clone();
        let mut next = ScriptedPresenter::new(vec![Decision::Skip]);
        let report = resolver
            .resolve(IdentityKey::Signature, default_review_cutoff(), &mut next)
            .unwrap();
        assert_eq!(report.suppressed, 1);
        assert_eq!(next.shown.len(), 1);
        assert_ne!(next.shown[0].key, skipped);
    }

    #[test]
    fn test_store_failure_leaves_only_that_group() {
        let temp_dir = TempDir::new().unwrap();
        let store = in_memory_store();
        let broken = catalog_copies(&store, temp_dir.path(), &["a", "b"], 8);
        let healthy = catalog_copies(&store, temp_dir.path(), &["c", "d"], 9);

        let trigger = format!(
            "CREATE TRIGGER reject_review BEFORE INSERT ON reviews
             WHEN NEW.picture_id = {}
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            broken[1].0
        );
        store
            .unit_of_work(|conn| conn.execute_batch(&trigger).map_err(StoreError::from))
            .unwrap();

        let resolver =
            DuplicateResolver::new(&store, &temp_dir.path().join("q"), "reviewer").unwrap();
        let mut presenter = ScriptedPresenter::new(vec![Decision::Skip, Decision::Skip]);
        let report = resolver
            .resolve(IdentityKey::Signature, now_plus(60), &mut presenter)
            .unwrap();

        assert_eq!(presenter.shown.len(), 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert!(!report.aborted);

        // The failed group's reviews were rolled back together.
        assert!(store.reviews_for(broken[0].0).unwrap().is_empty());
        assert!(store.reviews_for(broken[1].0).unwrap().is_empty());
        assert_eq!(store.reviews_for(healthy[0].0).unwrap().len(), 1);
        assert_eq!(store.reviews_for(healthy[1].0).unwrap().len(), 1);
    }

    #[test]
    fn test_abort_keeps_earlier_deletions() {
        let temp_dir = TempDir::new().unwrap();
        let store = in_memory_store();
        catalog_copies(&store, temp_dir.path(), &["a", "b"], 3);
        catalog_copies(&store, temp_dir.path(), &["c", "d"], 4);

        let resolver =
            DuplicateResolver::new(&store, &temp_dir.path().join("q"), "reviewer").unwrap();
        let mut presenter =
            ScriptedPresenter::new(vec![Decision::Delete(vec![2]), Decision::Abort]);
        let report = resolver
            .resolve(IdentityKey::Signature, now_plus(60), &mut presenter)
            .unwrap();

        assert!(report.aborted);
        assert_eq!(report.deleted, 1);
        assert_eq!(presenter.shown.len(), 2);
        assert_eq!(store.stats().unwrap().pictures, 3);
    }

    #[test]
    fn test_absent_file_still_deletes_row() {
        let temp_dir = TempDir::new().unwrap();
        let store = in_memory_store();
        let copies = catalog_copies(&store, temp_dir.path(), &["a", "b"], 5);
        fs::remove_file(&copies[1].1).unwrap();

        let resolver =
            DuplicateResolver::new(&store, &temp_dir.path().join("q"), "reviewer").unwrap();
        let mut presenter = ScriptedPresenter::new(vec![Decision::Delete(vec![2, 7])]);
        let report = resolver
            .resolve(IdentityKey::Signature, now_plus(60), &mut presenter)
            .unwrap();

        assert_eq!(report.deleted, 1);
        assert!(store.load_picture(copies[1].0).unwrap().is_none());
        assert!(resolver
            .audit_log()
            .read_all()
            .unwrap()
            .iter()
            .any(|r| r.action == AuditAction::AlreadyAbsent && r.picture_id == Some(copies[1].0)));
    }

    #[test]
    fn test_reviewer_name_length() {
        let store = in_memory_store();
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            DuplicateResolver::new(&store, temp_dir.path(), "bob"),
            Err(ResolveError::InvalidReviewer { .. })
        ));
        assert!(validate_reviewer("twenty-characters-xx").is_err());
        assert!(validate_reviewer("nineteen-characters").is_ok());
        assert!(validate_reviewer("sixchr").is_ok());
    }
}

pub mod audit;
pub mod editor;
pub mod enricher;
pub mod geocoder;
pub mod merge;
pub mod quarantine;
pub mod resolver;
pub mod sync;

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum Phase {
    Discovery,
    Reconcile,
    Extract,
    Purge,
    Resolve,
    Geocode,
    Merge,
    Complete,
}

/// One processed item, reported to an observer.
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub phase: Phase,
    pub processed: usize,
    pub total: usize,
    pub current: String,
}

pub type ProgressCallback = Box<dyn Fn(Progress) + Send + Sync>;

/// Invoke the observer, if any. A panicking observer is logged and ignored.
pub(crate) fn report(callback: Option<&ProgressCallback>, progress: Progress) {
    if let Some(callback) = callback {
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            callback(progress);
        })) {
            log::warn!("Progress callback panicked: {:?}", e);
        }
    }
}

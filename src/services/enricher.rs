//! Place names for catalogued locations.

use crate::database::models::UpsertOutcome;
use crate::database::{CatalogStore, StoreError};
use crate::services::geocoder::ReverseGeocoder;
use crate::services::{report, Phase, Progress, ProgressCallback};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichmentReport {
    pub pending: usize,
    pub resolved: usize,
    /// Already had a place when written.
    pub unchanged: usize,
    pub failed: usize,
}

impl EnrichmentReport {
    fn absorb(&mut self, other: EnrichmentReport) {
        self.pending += other.pending;
        self.resolved += other.resolved;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
    }
}

pub struct GeoEnricher<'a> {
    store: &'a CatalogStore,
    geocoder: &'a dyn ReverseGeocoder,
    progress_callback: Option<ProgressCallback>,
}

impl<'a> GeoEnricher<'a> {
    pub fn new(store: &'a CatalogStore, geocoder: &'a dyn ReverseGeocoder) -> Self {
        Self {
            store,
            geocoder,
            progress_callback: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Geocode every location with id in `[start, end)` that has no place yet.
    /// Failures are left for a later run.
    pub fn enrich_range(&self, start: i64, end: i64) -> Result<EnrichmentReport, StoreError> {
        let pending = self.store.locations_pending_enrichment(start, end)?;
        let total = pending.len();
        let mut outcome = EnrichmentReport {
            pending: total,
            ..Default::default()
        };

        for (i, location) in pending.into_iter().enumerate() {
            let Some(location_id) = location.id else {
                continue;
            };
            report(
                self.progress_callback.as_ref(),
                Progress {
                    phase: Phase::Geocode,
                    processed: i + 1,
                    total,
                    current: format!("location {}", location_id),
                },
            );

            let place = match self.geocoder.reverse(location.latitude, location.longitude) {
                Ok(place) => place,
                Err(e) => {
                    log::warn!(
                        "Geocoding location {} ({}, {}) failed: {}",
                        location_id,
                        location.latitude,
                        location.longitude,
                        e
                    );
                    outcome.failed += 1;
                    continue;
                }
            };

            match self.store.set_place_info(location_id, &place) {
                Ok(UpsertOutcome::Unchanged) => outcome.unchanged += 1,
                Ok(_) => {
                    log::debug!("Location {}: {}", location_id, place.normalized());
                    outcome.resolved += 1;
                }
                Err(e) => {
                    log::error!("Failed to store place for location {}: {}", location_id, e);
                    outcome.failed += 1;
                }
            }
        }

        log::info!("Geocoded [{}, {}): {:?}", start, end, outcome);
        Ok(outcome)
    }

    /// [`Self::enrich_range`] over `[start, end)` in consecutive slices of
    /// `batch_size` ids.
    pub fn enrich_in_batches(
        &self,
        start: i64,
        end: i64,
        batch_size: i64,
    ) -> Result<EnrichmentReport, StoreError> {
        let step = batch_size.max(1);
        let mut total = EnrichmentReport::default();
        let mut from = start;
        while from < end {
            let to = from.saturating_add(step).min(end);
            total.absorb(self.enrich_range(from, to)?);
            from = to;
        }
        Ok(total)
    }
}

/// Create the missing location of every picture whose GPS decodes.
/// Returns the number of locations created.
pub fn backfill_locations(store: &CatalogStore) -> Result<usize, StoreError> {
    let ids = store.pictures_without_location()?;
    let mut created = 0;

    for picture_id in ids {
        let picture = match store.load_picture(picture_id) {
            Ok(Some(picture)) => picture,
            Ok(None) => continue,
            Err(e) => {
                log::error!("Failed to read picture {}: {}", picture_id, e);
                continue;
            }
        };
        let Some(decoded) = picture.location() else {
            continue;
        };
        match store.upsert_location(
            picture_id,
            decoded.latitude,
            decoded.longitude,
            decoded.altitude,
            None,
        ) {
            Ok(_) => created += 1,
            Err(e) => log::error!("Failed to add location for picture {}: {}", picture_id, e),
        }
    }

    log::info!("Created {} locations", created);
    Ok(created)
}

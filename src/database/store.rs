use super::connection::{open_connection, open_in_memory_connection, reset_schema};
use super::models::{
    CatalogStats, DuplicateGroup, FileRecord, FolderFilter, GeocodedPlace, IdentityKey,
    LocationRecord, PictureRecord, ReviewRecord, UpsertOutcome,
};
use super::repositories::{
    ConfigRepository, FileRepository, LocationRepository, PictureRepository, ReviewRepository,
};
use super::StoreError;
use crate::config::AppConfig;
use chrono::NaiveDateTime;
use rusqlite::Connection;
use std::path::Path;

/// The picture catalog. Owns one connection; every public operation is its
/// own unit of work.
pub struct CatalogStore {
    conn: Connection,
}

impl CatalogStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            conn: open_connection(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: open_in_memory_connection()?,
        })
    }

    /// Run `work` in one transaction: committed when it returns `Ok`, rolled
    /// back on `Err` or unwinding.
    pub fn unit_of_work<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| E::from(StoreError::from(e)))?;
        let value = work(&*tx)?;
        tx.commit().map_err(|e| E::from(StoreError::from(e)))?;
        Ok(value)
    }

    /// Drop every picture, file, location and review. Settings survive.
    pub fn clear_catalog(&self) -> Result<(), StoreError> {
        self.unit_of_work(|conn| reset_schema(conn))
    }

    pub fn upsert_picture(&self, picture: &PictureRecord) -> Result<i64, StoreError> {
        self.unit_of_work(|conn| upsert_picture(conn, picture))
    }

    pub fn upsert_file(&self, file: &FileRecord, picture_id: i64) -> Result<i64, StoreError> {
        self.unit_of_work(|conn| FileRepository::upsert(conn, file, picture_id))
    }

    /// Picture, file and (when the GPS decodes) location, together.
    pub fn insert_catalog_entry(
        &self,
        picture: &PictureRecord,
        file: &FileRecord,
    ) -> Result<i64, StoreError> {
        self.unit_of_work(|conn| insert_catalog_entry(conn, picture, file))
    }

    pub fn find_picture_id_by_path_name(
        &self,
        path: &str,
        name: &str,
    ) -> Result<Option<i64>, StoreError> {
        FileRepository::find_picture_id_by_path_name(&self.conn, path, name)
    }

    pub fn mark_all_files_unchecked(&self) -> Result<usize, StoreError> {
        self.unit_of_work(|conn| FileRepository::mark_all_unchecked(conn))
    }

    pub fn mark_file_checked(&self, picture_id: i64) -> Result<usize, StoreError> {
        self.unit_of_work(|conn| FileRepository::mark_checked(conn, picture_id))
    }

    pub fn unchecked_picture_ids(&self) -> Result<Vec<i64>, StoreError> {
        FileRepository::unchecked_picture_ids(&self.conn)
    }

    /// Delete pictures; files, locations and reviews go with them.
    pub fn delete_pictures(&self, ids: &[i64]) -> Result<usize, StoreError> {
        self.unit_of_work(|conn| {
            let mut deleted = 0;
            for &id in ids {
                deleted += PictureRepository::delete(conn, id)?;
            }
            Ok(deleted)
        })
    }

    pub fn upsert_location(
        &self,
        picture_id: i64,
        latitude: f64,
        longitude: f64,
        altitude: Option<f64>,
        place_info: Option<GeocodedPlace>,
    ) -> Result<UpsertOutcome, StoreError> {
        self.unit_of_work(|conn| {
            let location = LocationRecord {
                id: None,
                picture_id,
                capture_date: location_date(conn, picture_id)?,
                latitude,
                longitude,
                altitude,
                place_info,
            };
            LocationRepository::upsert(conn, &location)
        })
    }

    pub fn set_place_info(
        &self,
        location_id: i64,
        place: &GeocodedPlace,
    ) -> Result<UpsertOutcome, StoreError> {
        self.unit_of_work(|conn| LocationRepository::set_place_info(conn, location_id, place))
    }

    /// Mark the picture reviewed and store the location its GPS decodes to.
    pub fn confirm_picture(&self, picture_id: i64) -> Result<(), StoreError> {
        self.unit_of_work(|conn| {
            expect_one(
                PictureRepository::set_rotation_reviewed(conn, picture_id, true)?,
                picture_id,
            )?;
            let picture = PictureRepository::find_by_id(conn, picture_id)?.ok_or(
                StoreError::NotFound {
                    entity: "picture",
                    id: picture_id,
                },
            )?;
            if let Some(decoded) = picture.location() {
                let location = LocationRecord {
                    id: None,
                    picture_id,
                    capture_date: location_date(conn, picture_id)?,
                    latitude: decoded.latitude,
                    longitude: decoded.longitude,
                    altitude: decoded.altitude,
                    place_info: None,
                };
                LocationRepository::upsert(conn, &location)?;
            }
            Ok(())
        })
    }

    /// Clear the reviewed flag and drop the picture's location.
    pub fn reset_picture(&self, picture_id: i64) -> Result<(), StoreError> {
        self.unit_of_work(|conn| {
            expect_one(
                PictureRepository::set_rotation_reviewed(conn, picture_id, false)?,
                picture_id,
            )?;
            LocationRepository::remove(conn, picture_id)?;
            Ok(())
        })
    }

    pub fn list_duplicate_groups(&self, key: IdentityKey) -> Result<Vec<DuplicateGroup>, StoreError> {
        PictureRepository::duplicate_groups(&self.conn, key)
    }

    pub fn add_review(
        &self,
        picture_id: i64,
        reviewer_name: &str,
        review_time: NaiveDateTime,
    ) -> Result<i64, StoreError> {
        self.unit_of_work(|conn| ReviewRepository::add(conn, picture_id, reviewer_name, review_time))
    }

    /// One review per picture, all committed together.
    pub fn add_reviews(
        &self,
        picture_ids: &[i64],
        reviewer_name: &str,
        review_time: NaiveDateTime,
    ) -> Result<usize, StoreError> {
        self.unit_of_work(|conn| {
            for &id in picture_ids {
                ReviewRepository::add(conn, id, reviewer_name, review_time)?;
            }
            Ok(picture_ids.len())
        })
    }

    pub fn latest_review_time(&self, picture_id: i64) -> Result<NaiveDateTime, StoreError> {
        ReviewRepository::latest_review_time(&self.conn, picture_id)
    }

    /// A picture needs review unless it was reviewed after `cutoff`.
    pub fn review_required(&self, picture_id: i64, cutoff: NaiveDateTime) -> Result<bool, StoreError> {
        Ok(self.latest_review_time(picture_id)? <= cutoff)
    }

    pub fn load_picture(&self, id: i64) -> Result<Option<PictureRecord>, StoreError> {
        PictureRepository::find_by_id(&self.conn, id)
    }

    pub fn load_file(&self, picture_id: i64) -> Result<Option<FileRecord>, StoreError> {
        FileRepository::find_by_picture_id(&self.conn, picture_id)
    }

    pub fn load_location(&self, picture_id: i64) -> Result<Option<LocationRecord>, StoreError> {
        LocationRepository::find_by_picture_id(&self.conn, picture_id)
    }

    pub fn reviews_for(&self, picture_id: i64) -> Result<Vec<ReviewRecord>, StoreError> {
        ReviewRepository::for_picture(&self.conn, picture_id)
    }

    /// Replace thumbnail and rotation; the signature stays.
    pub fn update_thumbnail(&self, id: i64, thumbnail: &[u8], rotation: i32) -> Result<(), StoreError> {
        self.unit_of_work(|conn| {
            expect_one(PictureRepository::update_thumbnail(conn, id, thumbnail, rotation)?, id)
        })
    }

    pub fn refresh_signature(
        &self,
        id: i64,
        thumbnail: &[u8],
        signature: &str,
        rotation: i32,
    ) -> Result<(), StoreError> {
        self.unit_of_work(|conn| {
            expect_one(
                PictureRepository::update_signature(conn, id, thumbnail, signature, rotation)?,
                id,
            )
        })
    }

    pub fn set_rotation_reviewed(&self, ids: &[i64], reviewed: bool) -> Result<usize, StoreError> {
        self.unit_of_work(|conn| {
            let mut changed = 0;
            for &id in ids {
                changed += PictureRepository::set_rotation_reviewed(conn, id, reviewed)?;
            }
            Ok(changed)
        })
    }

    pub fn file_entries_in_id_range(
        &self,
        start: i64,
        end: Option<i64>,
    ) -> Result<Vec<FileRecord>, StoreError> {
        FileRepository::in_id_range(&self.conn, start, end)
    }

    pub fn locations_pending_enrichment(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<LocationRecord>, StoreError> {
        LocationRepository::pending_enrichment(&self.conn, start, end)
    }

    pub fn pictures_without_location(&self) -> Result<Vec<i64>, StoreError> {
        PictureRepository::ids_without_location(&self.conn)
    }

    pub fn folder_picture_ids(&self, folder: &str, filter: FolderFilter) -> Result<Vec<i64>, StoreError> {
        PictureRepository::ids_in_folder(&self.conn, folder, filter)
    }

    pub fn signature_exists(&self, signature: &str) -> Result<bool, StoreError> {
        PictureRepository::exists_with_signature(&self.conn, signature)
    }

    pub fn capture_date_exists(&self, capture_date: NaiveDateTime) -> Result<bool, StoreError> {
        PictureRepository::exists_with_capture_date(&self.conn, capture_date)
    }

    pub fn file_modified_exists(&self, modified: NaiveDateTime) -> Result<bool, StoreError> {
        FileRepository::exists_with_modified(&self.conn, modified)
    }

    pub fn stats(&self) -> Result<CatalogStats, StoreError> {
        Ok(CatalogStats {
            pictures: PictureRepository::count(&self.conn)?,
            files: FileRepository::count(&self.conn)?,
            unchecked_files: FileRepository::count_unchecked(&self.conn)?,
            locations: LocationRepository::count(&self.conn)?,
            pending_locations: LocationRepository::count_pending(&self.conn)?,
            reviews: ReviewRepository::count(&self.conn)?,
        })
    }

    pub fn load_config(&self) -> Result<AppConfig, StoreError> {
        ConfigRepository::load(&self.conn)
    }

    pub fn save_config(&self, config: &AppConfig) -> Result<(), StoreError> {
        self.unit_of_work(|conn| ConfigRepository::save(conn, config))
    }
}

fn expect_one(changed: usize, id: i64) -> Result<(), StoreError> {
    if changed == 0 {
        Err(StoreError::NotFound {
            entity: "picture",
            id,
        })
    } else {
        Ok(())
    }
}

/// Update in place when the record carries the id of an existing row,
/// insert otherwise.
pub fn upsert_picture(conn: &Connection, picture: &PictureRecord) -> Result<i64, StoreError> {
    if let Some(id) = picture.id {
        if PictureRepository::update(conn, id, picture)? > 0 {
            return Ok(id);
        }
    }
    PictureRepository::insert(conn, picture)
}

pub fn insert_catalog_entry(
    conn: &Connection,
    picture: &PictureRecord,
    file: &FileRecord,
) -> Result<i64, StoreError> {
    let picture_id = PictureRepository::insert(conn, picture)?;
    FileRepository::upsert(conn, file, picture_id)?;

    if let Some(decoded) = picture.location() {
        let location = LocationRecord {
            id: None,
            picture_id,
            capture_date: picture.capture_date.or(Some(file.modified)),
            latitude: decoded.latitude,
            longitude: decoded.longitude,
            altitude: decoded.altitude,
            place_info: None,
        };
        LocationRepository::upsert(conn, &location)?;
    }

    Ok(picture_id)
}

/// Capture date of the picture, else the modified time of its file.
pub fn location_date(conn: &Connection, picture_id: i64) -> Result<Option<NaiveDateTime>, StoreError> {
    let picture = PictureRepository::find_by_id(conn, picture_id)?.ok_or(StoreError::NotFound {
        entity: "picture",
        id: picture_id,
    })?;
    if picture.capture_date.is_some() {
        return Ok(picture.capture_date);
    }
    Ok(FileRepository::find_by_picture_id(conn, picture_id)?.map(|f| f.modified))
}

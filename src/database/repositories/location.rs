use crate::database::models::{GeocodedPlace, LocationRecord, UpsertOutcome};
use crate::database::StoreError;
use rusqlite::{params, Connection, OptionalExtension, Row};

const LOCATION_COLUMNS: &str =
    "id, picture_id, capture_date, latitude, longitude, altitude, place_info";

pub struct LocationRepository;

impl LocationRepository {
    /// Create the location of a picture or refresh it. A location that
    /// already carries place info is never touched.
    pub fn upsert(conn: &Connection, location: &LocationRecord) -> Result<UpsertOutcome, StoreError> {
        let place_info = location
            .place_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        match Self::find_by_picture_id(conn, location.picture_id)? {
            None => {
                conn.execute(
                    "INSERT INTO locations
                         (picture_id, capture_date, latitude, longitude, altitude, place_info, geom)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        location.picture_id,
                        location.capture_date,
                        location.latitude,
                        location.longitude,
                        location.altitude,
                        place_info,
                        location.geometry(),
                    ],
                )?;
                Ok(UpsertOutcome::Inserted)
            }
            Some(existing) if existing.place_info.is_some() => Ok(UpsertOutcome::Unchanged),
            Some(existing) => {
                conn.execute(
                    "UPDATE locations SET capture_date = ?1, latitude = ?2, longitude = ?3,
                         altitude = ?4, place_info = ?5, geom = ?6
                     WHERE id = ?7 AND place_info IS NULL",
                    params![
                        location.capture_date,
                        location.latitude,
                        location.longitude,
                        location.altitude,
                        place_info,
                        location.geometry(),
                        existing.id,
                    ],
                )?;
                Ok(UpsertOutcome::Updated)
            }
        }
    }

    /// Fill in place info of an unresolved location.
    pub fn set_place_info(
        conn: &Connection,
        location_id: i64,
        place: &GeocodedPlace,
    ) -> Result<UpsertOutcome, StoreError> {
        let changed = conn.execute(
            "UPDATE locations SET place_info = ?1 WHERE id = ?2 AND place_info IS NULL",
            params![serde_json::to_string(place)?, location_id],
        )?;
        Ok(if changed == 0 {
            UpsertOutcome::Unchanged
        } else {
            UpsertOutcome::Updated
        })
    }

    pub fn find_by_picture_id(
        conn: &Connection,
        picture_id: i64,
    ) -> Result<Option<LocationRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM locations WHERE picture_id = ?1",
            LOCATION_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![picture_id], Self::from_row)
            .optional()?)
    }

    pub fn remove(conn: &Connection, picture_id: i64) -> Result<usize, StoreError> {
        Ok(conn.execute(
            "DELETE FROM locations WHERE picture_id = ?1",
            params![picture_id],
        )?)
    }

    /// Unresolved locations with `start <= id < end`, ascending.
    pub fn pending_enrichment(
        conn: &Connection,
        start: i64,
        end: i64,
    ) -> Result<Vec<LocationRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM locations
             WHERE id >= ?1 AND id < ?2 AND place_info IS NULL
             ORDER BY id",
            LOCATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let locations = stmt
            .query_map(params![start, end], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(locations)
    }

    pub fn count(conn: &Connection) -> Result<i64, StoreError> {
        Ok(conn.query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))?)
    }

    pub fn count_pending(conn: &Connection) -> Result<i64, StoreError> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM locations WHERE place_info IS NULL",
            [],
            |row| row.get(0),
        )?)
    }

    fn from_row(row: &Row) -> rusqlite::Result<LocationRecord> {
        let place_info = row
            .get::<_, Option<String>>(6)?
            .and_then(|raw| match serde_json::from_str::<GeocodedPlace>(&raw) {
                Ok(place) => Some(place),
                Err(e) => {
                    log::warn!("Unreadable place info {:?}: {}", raw, e);
                    None
                }
            });

        Ok(LocationRecord {
            id: Some(row.get(0)?),
            picture_id: row.get(1)?,
            capture_date: row.get(2)?,
            latitude: row.get(3)?,
            longitude: row.get(4)?,
            altitude: row.get(5)?,
            place_info,
        })
    }
}

use crate::core::exif::TagGroups;
use crate::core::gps::{self, GpsFields};
use crate::database::models::{DuplicateGroup, FolderFilter, IdentityKey, PictureRecord};
use crate::database::StoreError;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

const PICTURE_COLUMNS: &str = "id, capture_date, content_signature, camera_make, camera_model, \
     gps_latitude, gps_longitude, gps_altitude, gps_img_direction, \
     thumbnail, exif, rotation, rotation_reviewed";

pub struct PictureRepository;

impl PictureRepository {
    pub fn insert(conn: &Connection, picture: &PictureRecord) -> Result<i64, StoreError> {
        let columns = Columns::from_record(picture)?;
        conn.execute(
            "INSERT INTO pictures (capture_date, content_signature, camera_make, camera_model,
                 gps_latitude, gps_longitude, gps_altitude, gps_img_direction,
                 thumbnail, exif, rotation, rotation_reviewed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                picture.capture_date,
                picture.content_signature,
                picture.camera_make,
                picture.camera_model,
                columns.latitude,
                columns.longitude,
                columns.altitude,
                columns.direction,
                picture.thumbnail,
                columns.exif,
                picture.rotation,
                picture.rotation_reviewed,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Overwrite every column of an existing row. Returns the number of rows
    /// touched.
    pub fn update(conn: &Connection, id: i64, picture: &PictureRecord) -> Result<usize, StoreError> {
        let columns = Columns::from_record(picture)?;
        let changed = conn.execute(
            "UPDATE pictures SET capture_date = ?1, content_signature = ?2, camera_make = ?3,
                 camera_model = ?4, gps_latitude = ?5, gps_longitude = ?6, gps_altitude = ?7,
                 gps_img_direction = ?8, thumbnail = ?9, exif = ?10, rotation = ?11,
                 rotation_reviewed = ?12
             WHERE id = ?13",
            params![
                picture.capture_date,
                picture.content_signature,
                picture.camera_make,
                picture.camera_model,
                columns.latitude,
                columns.longitude,
                columns.altitude,
                columns.direction,
                picture.thumbnail,
                columns.exif,
                picture.rotation,
                picture.rotation_reviewed,
                id,
            ],
        )?;
        Ok(changed)
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<PictureRecord>, StoreError> {
        let sql = format!("SELECT {} FROM pictures WHERE id = ?1", PICTURE_COLUMNS);
        let picture = conn
            .query_row(&sql, params![id], Self::from_row)
            .optional()?;
        Ok(picture)
    }

    /// Thumbnail and rotation only.
    pub fn update_thumbnail(
        conn: &Connection,
        id: i64,
        thumbnail: &[u8],
        rotation: i32,
    ) -> Result<usize, StoreError> {
        Ok(conn.execute(
            "UPDATE pictures SET thumbnail = ?1, rotation = ?2 WHERE id = ?3",
            params![thumbnail, rotation, id],
        )?)
    }

    pub fn update_signature(
        conn: &Connection,
        id: i64,
        thumbnail: &[u8],
        signature: &str,
        rotation: i32,
    ) -> Result<usize, StoreError> {
        Ok(conn.execute(
            "UPDATE pictures SET thumbnail = ?1, content_signature = ?2, rotation = ?3 WHERE id = ?4",
            params![thumbnail, signature, rotation, id],
        )?)
    }

    pub fn set_rotation_reviewed(
        conn: &Connection,
        id: i64,
        reviewed: bool,
    ) -> Result<usize, StoreError> {
        Ok(conn.execute(
            "UPDATE pictures SET rotation_reviewed = ?1 WHERE id = ?2",
            params![reviewed, id],
        )?)
    }

    pub fn delete(conn: &Connection, id: i64) -> Result<usize, StoreError> {
        Ok(conn.execute("DELETE FROM pictures WHERE id = ?1", params![id])?)
    }

    /// Groups of more than one picture sharing the key column, ascending by
    /// key, members ascending by id. Pictures with a null key never group.
    pub fn duplicate_groups(
        conn: &Connection,
        key: IdentityKey,
    ) -> Result<Vec<DuplicateGroup>, StoreError> {
        let column = key.column();
        let sql = format!(
            "SELECT CAST({col} AS TEXT), id FROM pictures
             WHERE {col} IS NOT NULL AND {col} IN (
                 SELECT {col} FROM pictures WHERE {col} IS NOT NULL
                 GROUP BY {col} HAVING COUNT(*) > 1
             )
             ORDER BY {col} ASC, id ASC",
            col = column
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut groups: Vec<DuplicateGroup> = Vec::new();
        for row in rows {
            let (key, id) = row?;
            match groups.last_mut() {
                Some(group) if group.key == key => group.picture_ids.push(id),
                _ => groups.push(DuplicateGroup {
                    key,
                    picture_ids: vec![id],
                }),
            }
        }

        Ok(groups)
    }

    pub fn exists_with_signature(conn: &Connection, signature: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM pictures WHERE content_signature = ?1 LIMIT 1",
                params![signature],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn exists_with_capture_date(
        conn: &Connection,
        capture_date: NaiveDateTime,
    ) -> Result<bool, StoreError> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM pictures WHERE capture_date = ?1 LIMIT 1",
                params![capture_date],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Pictures with some GPS data but no location row, ascending.
    pub fn ids_without_location(conn: &Connection) -> Result<Vec<i64>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT p.id FROM pictures p
             LEFT JOIN locations l ON l.picture_id = p.id
             WHERE l.id IS NULL AND p.gps_latitude != '{}' AND p.gps_longitude != '{}'
             ORDER BY p.id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Pictures whose file path contains `folder` (case-insensitive) and
    /// whose rotation has not been reviewed yet.
    pub fn ids_in_folder(
        conn: &Connection,
        folder: &str,
        filter: FolderFilter,
    ) -> Result<Vec<i64>, StoreError> {
        let gps_clause = match filter {
            FolderFilter::All => "",
            FolderFilter::WithoutGps => "AND p.gps_latitude = '{}'",
        };
        let sql = format!(
            "SELECT p.id FROM pictures p
             JOIN files f ON f.picture_id = p.id
             WHERE lower(f.path) LIKE ?1 ESCAPE '\\' AND NOT p.rotation_reviewed {}
             ORDER BY p.id",
            gps_clause
        );
        let pattern = format!("%{}%", escape_like(&folder.to_lowercase()));

        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![pattern], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    pub fn count(conn: &Connection) -> Result<i64, StoreError> {
        Ok(conn.query_row("SELECT COUNT(*) FROM pictures", [], |row| row.get(0))?)
    }

    fn from_row(row: &Row) -> rusqlite::Result<PictureRecord> {
        let text = |idx: usize| row.get::<_, Option<String>>(idx);

        let exif = match text(10)? {
            Some(raw) => serde_json::from_str::<TagGroups>(&raw).unwrap_or_else(|e| {
                log::debug!("Unreadable EXIF column: {}", e);
                TagGroups::new()
            }),
            None => TagGroups::new(),
        };

        Ok(PictureRecord {
            id: Some(row.get(0)?),
            capture_date: row.get(1)?,
            content_signature: row.get(2)?,
            camera_make: row.get(3)?,
            camera_model: row.get(4)?,
            gps: GpsFields {
                latitude: gps::from_column(text(5)?.as_deref()),
                longitude: gps::from_column(text(6)?.as_deref()),
                altitude: gps::from_column(text(7)?.as_deref()),
                direction: gps::from_column(text(8)?.as_deref()),
            },
            thumbnail: row.get::<_, Option<Vec<u8>>>(9)?.unwrap_or_default(),
            exif,
            rotation: row.get(11)?,
            rotation_reviewed: row.get(12)?,
        })
    }
}

/// Literal `LIKE` text: `%`, `_` and the escape character itself match only
/// themselves under `ESCAPE '\'`.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// JSON text columns of a picture.
struct Columns {
    latitude: String,
    longitude: String,
    altitude: String,
    direction: String,
    exif: String,
}

impl Columns {
    fn from_record(picture: &PictureRecord) -> Result<Self, StoreError> {
        Ok(Self {
            latitude: gps::to_column(&picture.gps.latitude)?,
            longitude: gps::to_column(&picture.gps.longitude)?,
            altitude: gps::to_column(&picture.gps.altitude)?,
            direction: gps::to_column(&picture.gps.direction)?,
            exif: serde_json::to_string(&picture.exif)?,
        })
    }
}

use crate::database::models::FileRecord;
use crate::database::StoreError;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

const FILE_COLUMNS: &str = "id, picture_id, path, name, modified, created, size, checked";

pub struct FileRepository;

impl FileRepository {
    /// Insert the file row of `picture_id`, or replace it. A picture owns at
    /// most one file.
    pub fn upsert(conn: &Connection, file: &FileRecord, picture_id: i64) -> Result<i64, StoreError> {
        let id = conn.query_row(
            "INSERT INTO files (picture_id, path, name, modified, created, size, checked)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(picture_id) DO UPDATE SET
                 path = excluded.path,
                 name = excluded.name,
                 modified = excluded.modified,
                 created = excluded.created,
                 size = excluded.size,
                 checked = excluded.checked
             RETURNING id",
            params![
                picture_id,
                file.path,
                file.name,
                file.modified,
                file.created,
                file.size,
                file.checked,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn find_picture_id_by_path_name(
        conn: &Connection,
        path: &str,
        name: &str,
    ) -> Result<Option<i64>, StoreError> {
        let id = conn
            .query_row(
                "SELECT picture_id FROM files WHERE path = ?1 AND name = ?2 ORDER BY id LIMIT 1",
                params![path, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn find_by_picture_id(
        conn: &Connection,
        picture_id: i64,
    ) -> Result<Option<FileRecord>, StoreError> {
        let sql = format!("SELECT {} FROM files WHERE picture_id = ?1", FILE_COLUMNS);
        Ok(conn
            .query_row(&sql, params![picture_id], Self::from_row)
            .optional()?)
    }

    pub fn mark_all_unchecked(conn: &Connection) -> Result<usize, StoreError> {
        Ok(conn.execute("UPDATE files SET checked = FALSE", [])?)
    }

    pub fn mark_checked(conn: &Connection, picture_id: i64) -> Result<usize, StoreError> {
        Ok(conn.execute(
            "UPDATE files SET checked = TRUE WHERE picture_id = ?1",
            params![picture_id],
        )?)
    }

    pub fn unchecked_picture_ids(conn: &Connection) -> Result<Vec<i64>, StoreError> {
        let mut stmt =
            conn.prepare("SELECT picture_id FROM files WHERE NOT checked ORDER BY picture_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// File rows with `start <= id`, and `id <= end` when given.
    pub fn in_id_range(
        conn: &Connection,
        start: i64,
        end: Option<i64>,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM files WHERE id >= ?1 AND id <= ?2 ORDER BY id",
            FILE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let files = stmt
            .query_map(params![start, end.unwrap_or(i64::MAX)], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    pub fn exists_with_modified(
        conn: &Connection,
        modified: NaiveDateTime,
    ) -> Result<bool, StoreError> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM files WHERE modified = ?1 LIMIT 1",
                params![modified],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn count(conn: &Connection) -> Result<i64, StoreError> {
        Ok(conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?)
    }

    pub fn count_unchecked(conn: &Connection) -> Result<i64, StoreError> {
        Ok(conn.query_row("SELECT COUNT(*) FROM files WHERE NOT checked", [], |row| {
            row.get(0)
        })?)
    }

    fn from_row(row: &Row) -> rusqlite::Result<FileRecord> {
        Ok(FileRecord {
            id: Some(row.get(0)?),
            picture_id: Some(row.get(1)?),
            path: row.get(2)?,
            name: row.get(3)?,
            modified: row.get(4)?,
            created: row.get(5)?,
            size: row.get(6)?,
            checked: row.get(7)?,
        })
    }
}

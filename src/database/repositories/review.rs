use crate::database::models::ReviewRecord;
use crate::database::StoreError;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};

/// Latest review time of a picture that was never reviewed.
pub fn review_sentinel() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1800, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Cutoff that accepts every recorded review, so only pictures never
/// reviewed need a decision.
pub fn default_review_cutoff() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

pub struct ReviewRepository;

impl ReviewRepository {
    /// Reviews are append-only.
    pub fn add(
        conn: &Connection,
        picture_id: i64,
        reviewer_name: &str,
        review_time: NaiveDateTime,
    ) -> Result<i64, StoreError> {
        conn.execute(
            "INSERT INTO reviews (picture_id, reviewer_name, review_time) VALUES (?1, ?2, ?3)",
            params![picture_id, reviewer_name, review_time],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn latest_review_time(conn: &Connection, picture_id: i64) -> Result<NaiveDateTime, StoreError> {
        let latest = Self::for_picture(conn, picture_id)?
            .into_iter()
            .map(|review| review.review_time)
            .max();
        Ok(latest.unwrap_or_else(review_sentinel))
    }

    pub fn for_picture(conn: &Connection, picture_id: i64) -> Result<Vec<ReviewRecord>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, picture_id, reviewer_name, review_time FROM reviews
             WHERE picture_id = ?1 ORDER BY id",
        )?;
        let reviews = stmt
            .query_map(params![picture_id], |row| {
                Ok(ReviewRecord {
                    id: row.get(0)?,
                    picture_id: row.get(1)?,
                    reviewer_name: row.get(2)?,
                    review_time: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reviews)
    }

    pub fn count(conn: &Connection) -> Result<i64, StoreError> {
        Ok(conn.query_row("SELECT COUNT(*) FROM reviews", [], |row| row.get(0))?)
    }
}

use super::{schema, StoreError};
use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the catalog at `path` and bring the schema up to date.
pub fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    initialize(&conn)?;
    log::debug!("Opened catalog {}", path.display());
    Ok(conn)
}

pub fn open_in_memory_connection() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    initialize(&conn)?;
    Ok(conn)
}

fn initialize(conn: &Connection) -> Result<(), StoreError> {
    // Cascades only fire with foreign keys enabled, per connection.
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(&schema::create_all())?;
    Ok(())
}

/// Drop and recreate every entity table.
pub fn reset_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(schema::DROP_ENTITY_TABLES)?;
    conn.execute_batch(&schema::create_all())?;
    Ok(())
}

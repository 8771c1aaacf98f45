use crate::config::AppConfig;
use crate::database::StoreError;
use chrono::Local;
use rusqlite::{params, Connection};

pub struct ConfigRepository;

impl ConfigRepository {
    /// Stored settings over the defaults.
    pub fn load(conn: &Connection) -> Result<AppConfig, StoreError> {
        let mut config = AppConfig::default();

        let mut stmt = conn.prepare("SELECT key, value FROM app_config")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            if !config.apply(&key, &value) {
                log::warn!("Ignoring config entry {} = {:?}", key, value);
            }
        }

        Ok(config)
    }

    pub fn save(conn: &Connection, config: &AppConfig) -> Result<(), StoreError> {
        let timestamp = Local::now().naive_local();

        for (key, value) in config.entries()? {
            conn.execute(
                "INSERT OR REPLACE INTO app_config (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, timestamp],
            )?;
        }

        Ok(())
    }
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/reverse";

/// Runtime settings, persisted as key/value rows in the catalog's
/// `app_config` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub supported_formats: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub extraction_batch_size: usize,
    pub reviewer_name: Option<String>,
    pub geocoder_url: String,
    pub geocoder_user_agent: String,
    pub geocoder_email: Option<String>,
    pub geocoder_language: String,
    pub geocoder_min_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supported_formats: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "tiff".to_string(),
                "tif".to_string(),
            ],
            exclude_patterns: Vec::new(),
            extraction_batch_size: 32,
            reviewer_name: None,
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            geocoder_user_agent: format!("picbase/{}", env!("CARGO_PKG_VERSION")),
            geocoder_email: None,
            geocoder_language: "en".to_string(),
            geocoder_min_interval_ms: 1100,
        }
    }
}

impl AppConfig {
    pub const KEYS: &'static [&'static str] = &[
        "supported_formats",
        "exclude_patterns",
        "extraction_batch_size",
        "reviewer_name",
        "geocoder_url",
        "geocoder_user_agent",
        "geocoder_email",
        "geocoder_language",
        "geocoder_min_interval_ms",
    ];

    /// Apply one stored key/value pair. Unknown keys and unparsable values
    /// leave the current setting in place and return `false`.
    pub fn apply(&mut self, key: &str, value: &str) -> bool {
        let optional = |v: &str| {
            let v = v.trim();
            if v.is_empty() || v == "null" {
                None
            } else {
                Some(v.to_string())
            }
        };

        match key {
            "supported_formats" => match serde_json::from_str::<Vec<String>>(value) {
                Ok(formats) => self.supported_formats = formats,
                Err(_) => return false,
            },
            "exclude_patterns" => match serde_json::from_str::<Vec<String>>(value) {
                Ok(patterns) => self.exclude_patterns = patterns,
                Err(_) => return false,
            },
            "extraction_batch_size" => match value.trim().parse::<usize>() {
                Ok(size) if size > 0 => self.extraction_batch_size = size,
                _ => return false,
            },
            "reviewer_name" => self.reviewer_name = optional(value),
            "geocoder_url" => self.geocoder_url = value.trim().to_string(),
            "geocoder_user_agent" => self.geocoder_user_agent = value.trim().to_string(),
            "geocoder_email" => self.geocoder_email = optional(value),
            "geocoder_language" => self.geocoder_language = value.trim().to_string(),
            "geocoder_min_interval_ms" => match value.trim().parse::<u64>() {
                Ok(ms) => self.geocoder_min_interval_ms = ms,
                Err(_) => return false,
            },
            _ => return false,
        }
        true
    }

    /// Key/value pairs in storage form.
    pub fn entries(&self) -> Result<Vec<(&'static str, String)>, serde_json::Error> {
        Ok(vec![
            (
                "supported_formats",
                serde_json::to_string(&self.supported_formats)?,
            ),
            (
                "exclude_patterns",
                serde_json::to_string(&self.exclude_patterns)?,
            ),
            (
                "extraction_batch_size",
                self.extraction_batch_size.to_string(),
            ),
            (
                "reviewer_name",
                self.reviewer_name.clone().unwrap_or_else(|| "null".to_string()),
            ),
            ("geocoder_url", self.geocoder_url.clone()),
            ("geocoder_user_agent", self.geocoder_user_agent.clone()),
            (
                "geocoder_email",
                self.geocoder_email.clone().unwrap_or_else(|| "null".to_string()),
            ),
            ("geocoder_language", self.geocoder_language.clone()),
            (
                "geocoder_min_interval_ms",
                self.geocoder_min_interval_ms.to_string(),
            ),
        ])
    }
}

/// `~/Documents/Picbase/picbase.db`, creating the directory if needed.
pub fn default_database_path() -> std::io::Result<PathBuf> {
    let home_dir = dirs::home_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not find home directory",
        )
    })?;

    let app_dir = home_dir.join("Documents").join("Picbase");
    std::fs::create_dir_all(&app_dir)?;
    Ok(app_dir.join("picbase.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_round_trip() {
        let mut config = AppConfig::default();
        config.exclude_patterns = vec!["*/@eaDir/*".to_string()];
        config.reviewer_name = Some("Howard".to_string());
        config.extraction_batch_size = 8;

        let mut restored = AppConfig::default();
        for (key, value) in config.entries().unwrap() {
            assert!(restored.apply(key, &value), "key {}", key);
        }
        assert_eq!(restored, config);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let mut config = AppConfig::default();
        assert!(!config.apply("extraction_batch_size", "zero"));
        assert!(!config.apply("extraction_batch_size", "0"));
        assert!(!config.apply("supported_formats", "jpg"));
        assert!(!config.apply("no_such_key", "1"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_keys_cover_entries() {
        let entries = AppConfig::default().entries().unwrap();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, AppConfig::KEYS);
    }
}

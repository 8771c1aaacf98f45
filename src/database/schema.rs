pub const CREATE_PICTURES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pictures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    capture_date DATETIME,
    content_signature TEXT,
    camera_make TEXT,
    camera_model TEXT,
    gps_latitude TEXT NOT NULL DEFAULT '{}',
    gps_longitude TEXT NOT NULL DEFAULT '{}',
    gps_altitude TEXT NOT NULL DEFAULT '{}',
    gps_img_direction TEXT NOT NULL DEFAULT '{}',
    thumbnail BLOB,
    exif TEXT NOT NULL DEFAULT '{}',
    rotation INTEGER NOT NULL DEFAULT 0,
    rotation_reviewed BOOLEAN NOT NULL DEFAULT FALSE
);
"#;

pub const CREATE_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    picture_id INTEGER NOT NULL UNIQUE REFERENCES pictures(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    name TEXT NOT NULL,
    modified DATETIME NOT NULL,
    created DATETIME NOT NULL,
    size INTEGER NOT NULL,
    checked BOOLEAN NOT NULL DEFAULT TRUE
);
"#;

pub const CREATE_LOCATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS locations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    picture_id INTEGER NOT NULL UNIQUE REFERENCES pictures(id) ON DELETE CASCADE,
    capture_date DATETIME,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    altitude REAL,
    place_info TEXT,
    geom TEXT NOT NULL
);
"#;

pub const CREATE_REVIEWS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    picture_id INTEGER NOT NULL REFERENCES pictures(id) ON DELETE CASCADE,
    reviewer_name TEXT NOT NULL,
    review_time DATETIME NOT NULL
);
"#;

pub const CREATE_CONFIG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS app_config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at DATETIME NOT NULL
);
"#;

pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_pictures_signature ON pictures(content_signature);
CREATE INDEX IF NOT EXISTS idx_pictures_capture_date ON pictures(capture_date);
CREATE INDEX IF NOT EXISTS idx_files_path_name ON files(path, name);
CREATE INDEX IF NOT EXISTS idx_files_modified ON files(modified);
CREATE INDEX IF NOT EXISTS idx_reviews_picture ON reviews(picture_id, review_time);
"#;

/// Dropped in dependency order by a catalog reset. `app_config` survives.
pub const DROP_ENTITY_TABLES: &str = r#"
DROP TABLE IF EXISTS reviews;
DROP TABLE IF EXISTS locations;
DROP TABLE IF EXISTS files;
DROP TABLE IF EXISTS pictures;
"#;

pub fn create_all() -> String {
    [
        CREATE_PICTURES_TABLE,
        CREATE_FILES_TABLE,
        CREATE_LOCATIONS_TABLE,
        CREATE_REVIEWS_TABLE,
        CREATE_CONFIG_TABLE,
        CREATE_INDEXES,
    ]
    .concat()
}

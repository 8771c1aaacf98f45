//! Picture catalog consistency engine.
//!
//! `core` holds per-file logic (GPS codec, EXIF normalization, canonical
//! thumbnails and signatures), `database` is the SQLite-backed catalog and
//! `services` orchestrates reconciliation, duplicate resolution and
//! geolocation enrichment on top of both.

pub mod config;
pub mod core;
pub mod database;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AppConfig;
pub use database::{CatalogStore, StoreError};

//! Row-level access per table. Every function takes the connection (or open
//! transaction) it runs on; unit-of-work boundaries belong to the caller.

pub mod config;
pub mod file;
pub mod location;
pub mod picture;
pub mod review;

pub use config::ConfigRepository;
pub use file::FileRepository;
pub use location::LocationRepository;
pub use picture::PictureRepository;
pub use review::{default_review_cutoff, review_sentinel, ReviewRepository};

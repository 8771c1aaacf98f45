pub mod exif;
pub mod extractor;
pub mod gps;
pub mod hash;
pub mod thumbnail;

pub use exif::{ExifError, ExifService, ExifSnapshot, TagGroups};
pub use extractor::{ExtractionError, Extracted, MetadataExtractor};
pub use gps::{DecodedAxis, DecodedLocation, Fraction, GpsAltitude, GpsCoordinate, GpsDirection, GpsFields};
pub use hash::HashService;
pub use thumbnail::{ThumbnailError, ThumbnailService, SIGNATURE_SCHEME};

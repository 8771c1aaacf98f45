use crate::core::gps::{Fraction, GpsAltitude, GpsCoordinate, GpsDirection, GpsFields};
use chrono::NaiveDateTime;
use exif::{Context, Exif, Field, In, Reader, Tag, Value};
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

/// Fixed pattern of EXIF date/time tags.
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum ExifError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("EXIF parsing error: {0}")]
    Parse(#[from] exif::Error),

    #[error("Date parsing error: {message}")]
    DateParse { message: String },
}

/// Tag group name (`0th`, `1st`, `Exif`, `GPS`, `Interop`) to tag name to value.
pub type TagGroups = BTreeMap<String, BTreeMap<String, Json>>;

/// Everything the catalog keeps from an image's embedded metadata.
#[derive(Debug, Clone, Default)]
pub struct ExifSnapshot {
    pub groups: TagGroups,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub capture_date: Option<NaiveDateTime>,
    pub gps: GpsFields,
}

/// Service for extracting EXIF metadata from image files
pub struct ExifService;

impl ExifService {
    pub fn new() -> Self {
        Self
    }

    /// Read the EXIF block of `file_path`.
    ///
    /// A missing file or a file without EXIF is `Ok(None)`; no tag ever fails
    /// the whole read.
    pub fn read(&self, file_path: &Path) -> Result<Option<ExifSnapshot>, ExifError> {
        let file = match File::open(file_path) {
            Ok(f) => f,
            Err(_) => return Ok(None),
        };

        let mut buf_reader = BufReader::new(file);
        let exif = match Reader::new().read_from_container(&mut buf_reader) {
            Ok(exif) => exif,
            Err(e) => {
                log::debug!("No EXIF in {}: {}", file_path.display(), e);
                return Ok(None);
            }
        };

        Ok(Some(self.snapshot(&exif)))
    }

    fn snapshot(&self, exif: &Exif) -> ExifSnapshot {
        let mut groups = TagGroups::new();
        for field in exif.fields() {
            groups
                .entry(group_name(field).to_string())
                .or_default()
                .insert(field.tag.to_string(), value_to_json(field));
        }

        let text = |tag: Tag| {
            exif.get_field(tag, In::PRIMARY)
                .and_then(|f| ascii_text(&f.value))
                .filter(|s| !s.is_empty())
        };

        let capture_date = text(Tag::DateTimeOriginal)
            .or_else(|| text(Tag::DateTime))
            .and_then(|s| match parse_exif_datetime(&s) {
                Ok(dt) => Some(dt),
                Err(e) => {
                    log::warn!("{}", e);
                    None
                }
            });

        ExifSnapshot {
            groups,
            camera_make: text(Tag::Make),
            camera_model: text(Tag::Model),
            capture_date,
            gps: gps_fields(exif),
        }
    }
}

impl Default for ExifService {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an EXIF date/time string.
pub fn parse_exif_datetime(datetime_str: &str) -> Result<NaiveDateTime, ExifError> {
    NaiveDateTime::parse_from_str(datetime_str.trim(), EXIF_DATETIME_FORMAT).map_err(|e| {
        ExifError::DateParse {
            message: format!("{:?}: {}", datetime_str, e),
        }
    })
}

/// Strip embedded null padding and surrounding whitespace.
pub fn clean_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .replace('\0', "")
        .trim()
        .to_string()
}

fn group_name(field: &Field) -> &'static str {
    match field.tag.context() {
        Context::Tiff if field.ifd_num == In::PRIMARY => "0th",
        Context::Tiff => "1st",
        Context::Exif => "Exif",
        Context::Gps => "GPS",
        _ => "Interop",
    }
}

fn ascii_text(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts.first().map(|p| clean_text(p)),
        _ => None,
    }
}

fn one_or_many(mut items: Vec<Json>) -> Json {
    if items.len() == 1 {
        items.remove(0)
    } else {
        Json::Array(items)
    }
}

/// Text where the tag decodes as text, the raw numeric form otherwise.
fn value_to_json(field: &Field) -> Json {
    match &field.value {
        Value::Ascii(parts) => one_or_many(parts.iter().map(|p| json!(clean_text(p))).collect()),
        Value::Byte(v) => one_or_many(v.iter().map(|x| json!(x)).collect()),
        Value::Short(v) => one_or_many(v.iter().map(|x| json!(x)).collect()),
        Value::Long(v) => one_or_many(v.iter().map(|x| json!(x)).collect()),
        Value::SLong(v) => one_or_many(v.iter().map(|x| json!(x)).collect()),
        Value::Rational(v) => one_or_many(v.iter().map(|r| json!([r.num, r.denom])).collect()),
        Value::SRational(v) => one_or_many(v.iter().map(|r| json!([r.num, r.denom])).collect()),
        Value::Undefined(bytes, _) => match std::str::from_utf8(bytes) {
            Ok(s) if s.chars().all(|c| !c.is_control() || c == '\0') => {
                json!(s.trim_end_matches('\0'))
            }
            _ => json!(bytes),
        },
        other => json!(other.display_as(field.tag).to_string()),
    }
}

fn rationals(exif: &Exif, tag: Tag) -> Option<Vec<Fraction>> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(v) => Some(
            v.iter()
                .map(|r| Fraction(r.num as i64, r.denom as i64))
                .collect(),
        ),
        _ => None,
    }
}

fn reference(exif: &Exif, tag: Tag) -> Option<String> {
    exif.get_field(tag, In::PRIMARY)
        .and_then(|f| ascii_text(&f.value))
}

fn gps_fields(exif: &Exif) -> GpsFields {
    let coordinate = |ref_tag: Tag, tag: Tag| {
        Some(GpsCoordinate {
            reference: reference(exif, ref_tag)?,
            pos: rationals(exif, tag)?,
        })
    };

    let altitude = rationals(exif, Tag::GPSAltitude)
        .and_then(|v| v.first().copied())
        .map(|alt| {
            let reference = match exif.get_field(Tag::GPSAltitudeRef, In::PRIMARY) {
                Some(Field {
                    value: Value::Byte(b),
                    ..
                }) => b.first().copied().unwrap_or(0),
                _ => 0,
            };
            GpsAltitude { reference, alt }
        });

    let direction = rationals(exif, Tag::GPSImgDirection)
        .and_then(|v| v.first().copied())
        .map(|dir| GpsDirection {
            reference: reference(exif, Tag::GPSImgDirectionRef).unwrap_or_default(),
            dir,
        });

    GpsFields {
        latitude: coordinate(Tag::GPSLatitudeRef, Tag::GPSLatitude),
        longitude: coordinate(Tag::GPSLongitudeRef, Tag::GPSLongitude),
        altitude,
        direction,
    }
}

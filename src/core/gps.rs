//! Conversion between EXIF sexagesimal GPS structures and decimal degrees.
//!
//! GPS values are persisted exactly as they come out of the image (a
//! reference letter plus degree/minute/second fractions) and are only turned
//! into decimal degrees when read.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Denominator used when quantizing seconds in [`to_dms`].
pub const SECONDS_DENOMINATOR: i64 = 100_000;

/// Decimal input outside of this bound is rejected by [`to_dms`]. Applies to
/// latitude as well as longitude.
pub const DECIMAL_BOUND: f64 = 180.0;

/// A rational EXIF value, serialized as `[numerator, denominator]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fraction(pub i64, pub i64);

impl Fraction {
    pub fn new(numerator: i64, denominator: i64) -> Self {
        Self(numerator, denominator)
    }

    pub fn numerator(&self) -> i64 {
        self.0
    }

    pub fn value(&self) -> Option<f64> {
        if self.1 == 0 {
            None
        } else {
            Some(self.0 as f64 / self.1 as f64)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinate {
    #[serde(rename = "ref")]
    pub reference: String,
    pub pos: Vec<Fraction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsAltitude {
    /// 0 above sea level, 1 below.
    #[serde(rename = "ref")]
    pub reference: u8,
    pub alt: Fraction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsDirection {
    #[serde(rename = "ref")]
    pub reference: String,
    pub dir: Fraction,
}

/// Raw GPS block of a picture. All fields `None` is the empty sentinel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsFields {
    pub latitude: Option<GpsCoordinate>,
    pub longitude: Option<GpsCoordinate>,
    pub altitude: Option<GpsAltitude>,
    pub direction: Option<GpsDirection>,
}

/// One decoded axis: human readable text plus signed decimal degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAxis {
    pub display: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub display: String,
}

/// Convert a reference letter and d/m/s fractions to decimal degrees.
///
/// Returns `None` for a malformed reference or any zero denominator; callers
/// treat that as "no location".
pub fn to_decimal(
    reference: &str,
    degrees: Fraction,
    minutes: Fraction,
    seconds: Fraction,
) -> Option<DecodedAxis> {
    let reference = reference.trim();
    let negative = match reference {
        "N" | "n" | "E" | "e" => false,
        "S" | "s" | "W" | "w" => true,
        _ => return None,
    };

    let d = degrees.value()?;
    let m = minutes.value()?;
    let s = seconds.value()?;

    let display = if minutes.numerator() == 0 && seconds.numerator() == 0 {
        format!("{} {:.4}°", reference, d)
    } else if seconds.numerator() == 0 {
        format!("{} {:.0}° {:.2}'", reference, d, m)
    } else {
        format!("{} {}° {}' {}\"", reference, d as i64, m as i64, s as i64)
    };

    let magnitude = d + m / 60.0 + s / 3600.0;
    let value = if negative { -magnitude } else { magnitude };

    Some(DecodedAxis { display, value })
}

/// Convert decimal coordinates back to the raw EXIF structure.
///
/// Missing, non-finite or out of range input yields the empty sentinel.
pub fn to_dms(latitude: Option<f64>, longitude: Option<f64>, altitude: Option<f64>) -> GpsFields {
    let (Some(lat), Some(lon)) = (latitude, longitude) else {
        return GpsFields::default();
    };
    if !in_range(lat) || !in_range(lon) {
        return GpsFields::default();
    }

    GpsFields {
        latitude: Some(axis_to_dms(lat, "N", "S")),
        longitude: Some(axis_to_dms(lon, "E", "W")),
        altitude: altitude.filter(|a| a.is_finite()).map(|alt| GpsAltitude {
            reference: if alt < 0.0 { 1 } else { 0 },
            alt: Fraction((alt.abs() * 100.0).trunc() as i64, 100),
        }),
        direction: None,
    }
}

fn in_range(value: f64) -> bool {
    value.is_finite() && value.abs() <= DECIMAL_BOUND
}

fn axis_to_dms(decimal: f64, positive: &str, negative: &str) -> GpsCoordinate {
    let reference = if decimal < 0.0 { negative } else { positive };
    let dd = decimal.abs();
    let d = dd.trunc();
    let m = ((dd - d) * 60.0).trunc();
    let s = ((dd - d - m / 60.0) * 3600.0 * SECONDS_DENOMINATOR as f64).trunc();

    GpsCoordinate {
        reference: reference.to_string(),
        pos: vec![
            Fraction(d as i64, 1),
            Fraction(m as i64, 1),
            Fraction(s.max(0.0) as i64, SECONDS_DENOMINATOR),
        ],
    }
}

impl GpsCoordinate {
    pub fn decode(&self) -> Option<DecodedAxis> {
        match self.pos.as_slice() {
            [d, m, s] => to_decimal(&self.reference, *d, *m, *s),
            _ => None,
        }
    }
}

impl GpsAltitude {
    pub fn meters(&self) -> Option<f64> {
        let value = self.alt.value()?;
        Some(if self.reference == 1 { -value } else { value })
    }
}

impl GpsFields {
    pub fn is_empty(&self) -> bool {
        self.latitude.is_none()
            && self.longitude.is_none()
            && self.altitude.is_none()
            && self.direction.is_none()
    }

    /// Decode latitude and longitude; both must succeed.
    pub fn decode(&self) -> Option<DecodedLocation> {
        let lat = self.latitude.as_ref()?.decode()?;
        let lon = self.longitude.as_ref()?.decode()?;
        let altitude = self.altitude.as_ref().and_then(GpsAltitude::meters);

        let alt_text = match altitude {
            Some(alt) => format!("{:.2}", alt),
            None => "-".to_string(),
        };
        let display = format!("{}, {}, altitude: {}", lat.display, lon.display, alt_text);

        Some(DecodedLocation {
            latitude: lat.value,
            longitude: lon.value,
            altitude,
            display,
        })
    }
}

/// Serialize an optional GPS part into its column text; `None` becomes `{}`.
pub fn to_column<T: Serialize>(value: &Option<T>) -> Result<String, serde_json::Error> {
    match value {
        Some(v) => serde_json::to_string(v),
        None => Ok("{}".to_string()),
    }
}

/// Parse column text written by [`to_column`]. The empty object and anything
/// unparsable read back as `None`.
pub fn from_column<T: DeserializeOwned>(text: Option<&str>) -> Option<T> {
    let text = text?.trim();
    if text.is_empty() || text == "{}" {
        return None;
    }
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("Ignoring malformed GPS column {:?}: {}", text, e);
            None
        }
    }
}

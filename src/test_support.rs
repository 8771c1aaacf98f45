//! Fixtures shared by the unit tests.

use crate::database::CatalogStore;
use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};
use std::io::Cursor;
use std::path::Path;

pub fn create_test_image(
    path: &Path,
    width: u32,
    height: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    create_patterned_image(path, width, height, 0)
}

/// Gradient image whose pixels depend on `seed`, so different seeds give
/// different signatures.
pub fn create_patterned_image(
    path: &Path,
    width: u32,
    height: u32,
    seed: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let img = pattern(width, height, seed);
    img.save(path)?;
    Ok(())
}

fn pattern(width: u32, height: u32, seed: u32) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
    ImageBuffer::from_fn(width, height, |x, y| {
        let intensity = ((x + y + seed * 37) % 256) as u8;
        let tint = ((x * 3 + seed * 91) % 256) as u8;
        Rgb([intensity, tint, intensity / 2])
    })
}

pub struct ExifFixture {
    pub make: &'static str,
    pub model: &'static str,
    pub datetime: &'static str,
    pub latitude: (&'static str, [(u32, u32); 3]),
    pub longitude: (&'static str, [(u32, u32); 3]),
    pub altitude: Option<(u8, (u32, u32))>,
}

impl ExifFixture {
    pub fn amsterdam() -> Self {
        Self {
            make: "Canon",
            model: "EOS 5D",
            datetime: "2019:07:14 09:15:00",
            latitude: ("N", [(52, 1), (0, 1), (0, 1)]),
            longitude: ("E", [(4, 1), (30, 1), (0, 1)]),
            altitude: Some((0, (1250, 100))),
        }
    }
}

fn ascii(tag: Tag, text: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![text.as_bytes().to_vec()]),
    }
}

fn rationals(tag: Tag, parts: &[(u32, u32)]) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Rational(
            parts
                .iter()
                .map(|&(num, denom)| Rational { num, denom })
                .collect(),
        ),
    }
}

/// JPEG with an APP1 EXIF segment carrying make, model, date and GPS.
pub fn create_test_image_with_exif(
    path: &Path,
    width: u32,
    height: u32,
    fixture: &ExifFixture,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut fields = vec![
        ascii(Tag::Make, fixture.make),
        ascii(Tag::Model, fixture.model),
        ascii(Tag::DateTimeOriginal, fixture.datetime),
        ascii(Tag::GPSLatitudeRef, fixture.latitude.0),
        rationals(Tag::GPSLatitude, &fixture.latitude.1),
        ascii(Tag::GPSLongitudeRef, fixture.longitude.0),
        rationals(Tag::GPSLongitude, &fixture.longitude.1),
    ];
    if let Some((reference, alt)) = fixture.altitude {
        fields.push(Field {
            tag: Tag::GPSAltitudeRef,
            ifd_num: In::PRIMARY,
            value: Value::Byte(vec![reference]),
        });
        fields.push(rationals(Tag::GPSAltitude, &[alt]));
    }

    let mut tiff = Cursor::new(Vec::new());
    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    writer.write(&mut tiff, false)?;
    let tiff = tiff.into_inner();

    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, 90);
    pattern(width, height, 7).write_with_encoder(encoder)?;

    let payload_len = 2 + 6 + tiff.len();
    let mut out = Vec::with_capacity(jpeg.len() + payload_len + 2);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&(payload_len as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);

    std::fs::write(path, out)?;
    Ok(())
}

pub fn in_memory_store() -> CatalogStore {
    CatalogStore::open_in_memory().unwrap()
}

use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use std::path::Path;
use thiserror::Error;

/// Version tag of the canonical thumbnail recipe that content signatures are
/// computed over. Changing any constant below produces different thumbnail
/// bytes, so every stored signature must be recomputed and this tag bumped.
pub const SIGNATURE_SCHEME: &str = "thumb-v1:600x600:lanczos3:jpeg-q75:sha256";

pub const THUMBNAIL_BOX: u32 = 600;
pub const THUMBNAIL_FILTER: FilterType = FilterType::Lanczos3;
pub const THUMBNAIL_QUALITY: u8 = 75;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },
}

/// Produces the canonical thumbnail stored in the catalog.
pub struct ThumbnailService {
    thumbnail_size: u32,
    quality: u8,
}

impl ThumbnailService {
    pub fn new() -> Self {
        Self {
            thumbnail_size: THUMBNAIL_BOX,
            quality: THUMBNAIL_QUALITY,
        }
    }

    /// Canonical thumbnail of the image at `path`, turned clockwise by
    /// `rotation` degrees.
    pub fn from_path(&self, path: &Path, rotation: i32) -> Result<Vec<u8>, ThumbnailError> {
        let img = self.load_image(path)?;
        self.render(rotate(img, rotation))
    }

    /// Turn an already stored thumbnail clockwise by `degrees`.
    pub fn rotate_bytes(&self, thumbnail: &[u8], degrees: i32) -> Result<Vec<u8>, ThumbnailError> {
        let img = image::load_from_memory(thumbnail)?;
        self.encode(&rotate(img, degrees))
    }

    /// Fit within the bounding box, never upscaling, then encode.
    pub fn render(&self, img: DynamicImage) -> Result<Vec<u8>, ThumbnailError> {
        let resized = self.resize_image(img);
        self.encode(&resized)
    }

    fn load_image(&self, path: &Path) -> Result<DynamicImage, ThumbnailError> {
        image::open(path).map_err(|e| match e {
            image::ImageError::Unsupported(_) => ThumbnailError::UnsupportedFormat {
                format: path
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_string())
                    .unwrap_or_default(),
            },
            other => ThumbnailError::Image(other),
        })
    }

    fn resize_image(&self, img: DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        if width <= self.thumbnail_size && height <= self.thumbnail_size {
            return img;
        }
        img.resize(self.thumbnail_size, self.thumbnail_size, THUMBNAIL_FILTER)
    }

    fn encode(&self, img: &DynamicImage) -> Result<Vec<u8>, ThumbnailError> {
        // Alpha and palette images are flattened to plain RGB for JPEG.
        let rgb_img = img.to_rgb8();

        let mut output = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut output, self.quality);
        rgb_img.write_with_encoder(encoder)?;

        Ok(output)
    }
}

impl Default for ThumbnailService {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize any multiple of 90 into `0..360`.
pub fn normalize_rotation(degrees: i32) -> i32 {
    degrees.rem_euclid(360)
}

fn rotate(img: DynamicImage, degrees: i32) -> DynamicImage {
    match normalize_rotation(degrees) {
        90 => img.rotate90(),
        180 => img.rotate180(),
        270 => img.rotate270(),
        _ => img,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::create_test_image;
    use image::{ImageBuffer, Rgba};
    use tempfile::TempDir;

    fn dimensions(bytes: &[u8]) -> (u32, u32) {
        image::load_from_memory(bytes).unwrap().dimensions()
    }

    #[test]
    fn test_fits_bounding_box_landscape() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("wide.png");
        create_test_image(&original, 1920, 1080).unwrap();

        let bytes = ThumbnailService::new().from_path(&original, 0).unwrap();
        let (width, height) = dimensions(&bytes);
        assert_eq!(width, 600);
        assert!(height < 600);
        assert!((height as i64 - 338).abs() <= 1);
    }

    #[test]
    fn test_fits_bounding_box_portrait() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("tall.png");
        create_test_image(&original, 1080, 1920).unwrap();

        let (width, height) = dimensions(&ThumbnailService::new().from_path(&original, 0).unwrap());
        assert_eq!(height, 600);
        assert!(width < 600);
    }

    #[test]
    fn test_small_image_is_not_upscaled() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("small.png");
        create_test_image(&original, 120, 80).unwrap();

        let (width, height) = dimensions(&ThumbnailService::new().from_path(&original, 0).unwrap());
        assert_eq!((width, height), (120, 80));
    }

    #[test]
    fn test_alpha_channel_is_flattened() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("alpha.png");
        let img = ImageBuffer::from_fn(50, 40, |x, _| Rgba([x as u8, 10, 20, 128]));
        img.save(&original).unwrap();

        let bytes = ThumbnailService::new().from_path(&original, 0).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("same.png");
        create_test_image(&original, 800, 600).unwrap();

        let service = ThumbnailService::new();
        assert_eq!(
            service.from_path(&original, 0).unwrap(),
            service.from_path(&original, 0).unwrap()
        );
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("rot.png");
        create_test_image(&original, 300, 100).unwrap();

        let service = ThumbnailService::new();
        let thumb = service.from_path(&original, 0).unwrap();
        assert_eq!(dimensions(&service.rotate_bytes(&thumb, 90).unwrap()), (100, 300));
        assert_eq!(dimensions(&service.rotate_bytes(&thumb, -90).unwrap()), (100, 300));
        assert_eq!(dimensions(&service.from_path(&original, 270).unwrap()), (100, 300));
    }

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(0), 0);
    }

    #[test]
    fn test_unreadable_file() {
        let temp_dir = TempDir::new().unwrap();
        let bogus = temp_dir.path().join("bogus.jpg");
        std::fs::write(&bogus, b"not an image").unwrap();
        assert!(ThumbnailService::new().from_path(&bogus, 0).is_err());
    }
}

use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::config::ImageConfig;
use crate::error::SyncError;

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Scales images down to a safe upload size and re-encodes them as JPEG.
#[derive(Debug, Clone)]
pub struct ImageCompressor {
    max_side_px: u32,
    jpeg_quality: u8,
    max_upload_bytes: usize,
}

impl ImageCompressor {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            max_side_px: config.max_side_px.max(1),
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, SyncError> {
        let decoded = image::load_from_memory(raw)
            .map_err(|err| SyncError::ImageEncoding(format!("unreadable image: {err}")))?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(SyncError::ImageEncoding("image has no pixels".into()));
        }

        let scaled = self.scale_to_safe_upload_size(decoded);
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.jpeg_quality)
            .encode_image(&scaled.to_rgb8())
            .map_err(|err| SyncError::ImageEncoding(format!("jpeg encoding failed: {err}")))?;

        if encoded.len() > self.max_upload_bytes {
            return Err(SyncError::ImageEncoding(format!(
                "{} bytes exceeds upload limit of {}",
                encoded.len(),
                self.max_upload_bytes
            )));
        }

        Ok(encoded)
    }

    fn scale_to_safe_upload_size(&self, image: DynamicImage) -> DynamicImage {
        if image.width().max(image.height()) <= self.max_side_px {
            return image;
        }
        // `resize` keeps the aspect ratio and fits inside the box.
        image.resize(self.max_side_px, self.max_side_px, FilterType::Triangle)
    }
}

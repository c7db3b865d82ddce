// src/services/image_processor.rs
use crate::errors::AnalysisError;
use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageOutputFormat};
use log::{debug, warn};

/// Largest image the model endpoint accepts, before base64 encoding.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Image bytes ready to embed in a data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    pub data: Bytes,
    pub mime_type: &'static str,
}

#[derive(Debug, Clone)]
pub struct ImageProcessor {
    max_upload_bytes: usize,
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageProcessor {
    pub fn new() -> Self {
        Self {
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_limit(max_upload_bytes: usize) -> Self {
        Self { max_upload_bytes }
    }

    pub fn mime_type(data: &[u8]) -> &'static str {
        match image::guess_format(data) {
            Ok(ImageFormat::Png) => "image/png",
            Ok(ImageFormat::WebP) => "image/webp",
            Ok(ImageFormat::Gif) => "image/gif",
            _ => "image/jpeg",
        }
    }

    pub fn decode(&self, data: &[u8]) -> Result<DynamicImage, AnalysisError> {
        if data.is_empty() {
            return Err(AnalysisError::NoData);
        }
        image::load_from_memory(data).map_err(|e| {
            warn!("Failed to decode image: {}", e);
            AnalysisError::NoData
        })
    }

    /// Passes small images through untouched and shrinks oversized ones until
    /// they fit the upload limit.
    pub fn prepare_for_upload(&self, data: &Bytes) -> Result<PreparedImage, AnalysisError> {
        if data.is_empty() {
            return Err(AnalysisError::NoData);
        }

        if data.len() <= self.max_upload_bytes {
            return Ok(PreparedImage {
                data: data.clone(),
                mime_type: Self::mime_type(data),
            });
        }

        let img = image::load_from_memory(data).map_err(|e| {
            warn!("Oversized image could not be decoded for resizing: {}", e);
            AnalysisError::ImageTooLarge
        })?;

        let (width, height) = img.dimensions();

        // Scale area with the byte ratio and leave headroom for JPEG variance
        let scale_factor =
            ((self.max_upload_bytes as f64 / data.len() as f64).sqrt() * 0.9) as f32;
        let new_width = ((width as f32 * scale_factor) as u32).max(256);
        let new_height = ((height as f32 * scale_factor) as u32).max(256);

        let resized = img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3);

        let mut output = Vec::new();
        resized
            .write_to(
                &mut std::io::Cursor::new(&mut output),
                ImageOutputFormat::Jpeg(80),
            )
            .map_err(|e| {
                warn!("Failed to encode resized image: {}", e);
                AnalysisError::ImageTooLarge
            })?;

        if output.len() > self.max_upload_bytes {
            return Err(AnalysisError::ImageTooLarge);
        }

        debug!(
            "Resized image from {} to {} bytes ({}x{} -> {}x{})",
            data.len(),
            output.len(),
            width,
            height,
            resized.width(),
            resized.height()
        );

        Ok(PreparedImage {
            data: Bytes::from(output),
            mime_type: "image/jpeg",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{png_bytes, solid_image};

    #[test]
    fn small_images_pass_through() {
        let data = Bytes::from(png_bytes(&solid_image(8, 8, [10, 200, 10])));
        let prepared = ImageProcessor::new().prepare_for_upload(&data).unwrap();
        assert_eq!(prepared.data, data);
        assert_eq!(prepared.mime_type, "image/png");
    }

    #[test]
    fn empty_input_is_no_data() {
        let processor = ImageProcessor::new();
        assert_eq!(
            processor.prepare_for_upload(&Bytes::new()),
            Err(AnalysisError::NoData)
        );
        assert!(matches!(processor.decode(&[]), Err(AnalysisError::NoData)));
    }

    #[test]
    fn undecodable_oversized_input_is_too_large() {
        let data = Bytes::from(vec![0u8; 64]);
        let processor = ImageProcessor::with_limit(16);
        assert_eq!(
            processor.prepare_for_upload(&data),
            Err(AnalysisError::ImageTooLarge)
        );
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(matches!(
            ImageProcessor::new().decode(b"definitely not an image"),
            Err(AnalysisError::NoData)
        ));
    }

    #[test]
    fn unknown_formats_default_to_jpeg() {
        assert_eq!(ImageProcessor::mime_type(b"\xff\xd8\xff\xe0rest"), "image/jpeg");
        assert_eq!(ImageProcessor::mime_type(b"????"), "image/jpeg");
    }
}

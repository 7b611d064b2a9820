use std::io::Cursor;

use async_trait::async_trait;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, GenericImageView};
use lumen_session::{ImagePayload, ImageResizer, SessionError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Scales attachments down so the longest side fits `max_side`, re-encoding
/// them as JPEG. Images already within bounds are passed through untouched.
pub(crate) struct JpegDownscaler {
    max_side: u32,
    quality: u8,
}

impl JpegDownscaler {
    pub(crate) fn new(max_side: u32, quality: u8) -> Self {
        Self {
            max_side: max_side.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    fn downscale(&self, bytes: &[u8]) -> Result<Option<Vec<u8>>, SessionError> {
        let image = image::load_from_memory(bytes)
            .map_err(|error| SessionError::ImageResize(error.to_string()))?;
        let (width, height) = image.dimensions();
        if width.max(height) <= self.max_side {
            return Ok(None);
        }

        let resized = image.resize(self.max_side, self.max_side, FilterType::Lanczos3);
        let rgb = resized.to_rgb8();
        let mut encoded = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut encoded, self.quality)
            .encode_image(&rgb)
            .map_err(|error| SessionError::ImageResize(error.to_string()))?;
        debug!(
            from_width = width,
            from_height = height,
            to_width = rgb.width(),
            to_height = rgb.height(),
            "downscaled attachment"
        );
        Ok(Some(encoded.into_inner()))
    }
}

#[async_trait]
impl ImageResizer for JpegDownscaler {
    async fn resize(&self, payload: &ImagePayload) -> Result<ImagePayload, SessionError> {
        let resizer = *self;
        let bytes = payload.as_bytes().to_vec();
        let downscaled = tokio::task::spawn_blocking(move || resizer.downscale(&bytes))
            .await
            .map_err(|error| SessionError::ImageResize(error.to_string()))??;
        Ok(match downscaled {
            Some(bytes) => ImagePayload::from_bytes(bytes),
            None => payload.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
    use lumen_session::{Composer, ImagePayload, ImageResizer};

    use super::JpegDownscaler;

    fn png(width: u32, height: u32) -> ImagePayload {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(width, height));
        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, ImageFormat::Png)
            .expect("encode png");
        ImagePayload::from_bytes(bytes.into_inner())
    }

    #[tokio::test]
    async fn functional_large_image_is_scaled_to_max_side_as_jpeg() {
        let resizer = JpegDownscaler::new(64, 82);
        let resized = resizer.resize(&png(256, 128)).await.expect("resize");

        assert_eq!(
            image::guess_format(resized.as_bytes()).expect("format"),
            ImageFormat::Jpeg
        );
        let decoded = image::load_from_memory(resized.as_bytes()).expect("decode");
        assert_eq!(decoded.dimensions(), (64, 32));
    }

    #[tokio::test]
    async fn unit_small_image_passes_through_unchanged() {
        let original = png(32, 16);
        let resized = JpegDownscaler::new(64, 82)
            .resize(&original)
            .await
            .expect("resize");
        assert_eq!(resized, original);
    }

    #[tokio::test]
    async fn regression_undecodable_bytes_fall_back_to_original_in_composer() {
        let mut composer = Composer::new();
        let garbage = ImagePayload::from_bytes(b"not an image".to_vec());
        composer
            .attach_resized(&JpegDownscaler::new(64, 82), garbage.clone())
            .await;
        assert_eq!(composer.pending(), [garbage]);
    }
}

//! Scaled image decoding.
//!
//! A bounds-only pass reads the natural size, a downscale factor is chosen
//! from the target size and policy, then a second pass decodes and subsamples.

use std::io::{BufRead, Cursor, Seek};

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, Limits};
use tracing::trace;

use crate::domain::entities::{DecodingPolicy, ImageSize};
use crate::domain::errors::DecodeError;
use crate::domain::ports::{DecodeSource, ImageDecoder};

/// Computes the integer downscale factor for an image of `natural` size.
#[must_use]
pub fn compute_scale(natural: (u32, u32), target: ImageSize, policy: DecodingPolicy) -> u32 {
    let target = target.non_zero();
    let (width, height) = natural;

    match policy {
        DecodingPolicy::Fast => {
            let (mut width_tmp, mut height_tmp, mut scale) = (width, height, 1u32);
            while width_tmp / 2 >= target.width && height_tmp / 2 >= target.height {
                width_tmp /= 2;
                height_tmp /= 2;
                scale *= 2;
            }
            scale
        }
        DecodingPolicy::MemorySaving => (width / target.width)
            .min(height / target.height)
            .max(1),
    }
}

/// Decoder built on the `image` crate.
///
/// The optional memory limit caps decoder allocations; exceeding it is
/// reported as `DecodeError::OutOfMemory` so the caller can retry.
#[derive(Debug, Clone, Default)]
pub struct ScaledDecoder {
    memory_limit: Option<u64>,
}

impl ScaledDecoder {
    /// Creates a decoder with an optional allocation budget in bytes.
    #[must_use]
    pub const fn new(memory_limit: Option<u64>) -> Self {
        Self { memory_limit }
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        if let Some(max) = self.memory_limit {
            limits.max_alloc = Some(max);
        }
        limits
    }

    fn read_bounds<R: BufRead + Seek>(reader: ImageReader<R>) -> Result<(u32, u32), DecodeError> {
        Ok(reader.with_guessed_format()?.into_dimensions()?)
    }

    fn decode_full<R: BufRead + Seek>(
        &self,
        reader: ImageReader<R>,
    ) -> Result<DynamicImage, DecodeError> {
        let mut reader = reader.with_guessed_format()?;
        reader.limits(self.limits());
        Ok(reader.decode()?)
    }
}

fn subsample(image: DynamicImage, scale: u32) -> DynamicImage {
    if scale <= 1 {
        return image;
    }
    let width = (image.width() / scale).max(1);
    let height = (image.height() / scale).max(1);
    image.resize_exact(width, height, FilterType::Triangle)
}

impl ImageDecoder for ScaledDecoder {
    fn decode(
        &self,
        source: &DecodeSource,
        target: ImageSize,
        policy: DecodingPolicy,
    ) -> Result<DynamicImage, DecodeError> {
        let natural = match source {
            DecodeSource::File(path) => Self::read_bounds(ImageReader::open(path)?)?,
            DecodeSource::Bytes(bytes) => Self::read_bounds(ImageReader::new(Cursor::new(bytes.clone())))?,
            DecodeSource::Image(image) => (image.width(), image.height()),
        };

        let scale = compute_scale(natural, target, policy);
        trace!(
            width = natural.0,
            height = natural.1,
            target = %target,
            policy = %policy,
            scale = scale,
            "Computed decode scale"
        );

        let full = match source {
            DecodeSource::File(path) => self.decode_full(ImageReader::open(path)?)?,
            DecodeSource::Bytes(bytes) => {
                self.decode_full(ImageReader::new(Cursor::new(bytes.clone())))?
            }
            DecodeSource::Image(image) => (**image).clone(),
        };

        Ok(subsample(full, scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mock::png_bytes;
    use bytes::Bytes;
    use std::sync::Arc;
    use test_case::test_case;

    #[test_case((800, 600), (100, 100), DecodingPolicy::Fast, 4 ; "fast_last_valid_doubling")]
    #[test_case((800, 600), (100, 100), DecodingPolicy::MemorySaving, 6 ; "memory_saving_min_ratio")]
    #[test_case((200, 200), (100, 100), DecodingPolicy::Fast, 2 ; "fast_exact_half")]
    #[test_case((50, 50), (100, 100), DecodingPolicy::Fast, 1 ; "fast_smaller_than_target")]
    #[test_case((50, 50), (100, 100), DecodingPolicy::MemorySaving, 1 ; "memory_saving_smaller_than_target")]
    #[test_case((1000, 10), (10, 10), DecodingPolicy::MemorySaving, 1 ; "memory_saving_limited_by_height")]
    #[test_case((64, 64), (0, 0), DecodingPolicy::Fast, 64 ; "zero_target_treated_as_one")]
    fn test_compute_scale(natural: (u32, u32), target: (u32, u32), policy: DecodingPolicy, expected: u32) {
        assert_eq!(
            compute_scale(natural, ImageSize::new(target.0, target.1), policy),
            expected
        );
    }

    #[test_case(DecodingPolicy::Fast, (200, 150) ; "fast")]
    #[test_case(DecodingPolicy::MemorySaving, (133, 100) ; "memory_saving")]
    fn test_decode_bytes_scaled(policy: DecodingPolicy, expected: (u32, u32)) {
        let source = DecodeSource::Bytes(Bytes::from(png_bytes(800, 600)));
        let img = ScaledDecoder::default()
            .decode(&source, ImageSize::new(100, 100), policy)
            .unwrap();
        assert_eq!((img.width(), img.height()), expected);
    }

    #[test]
    fn test_decode_file_reopens_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("img.img");
        std::fs::write(&path, png_bytes(64, 32)).unwrap();

        let img = ScaledDecoder::default()
            .decode(
                &DecodeSource::File(path),
                ImageSize::new(16, 16),
                DecodingPolicy::Fast,
            )
            .unwrap();
        assert_eq!((img.width(), img.height()), (32, 16));
    }

    #[test]
    fn test_decode_already_decoded_image() {
        let source = DecodeSource::Image(Arc::new(DynamicImage::new_rgb8(400, 400)));
        let img = ScaledDecoder::default()
            .decode(&source, ImageSize::new(100, 100), DecodingPolicy::MemorySaving)
            .unwrap();
        assert_eq!((img.width(), img.height()), (100, 100));
    }

    #[test]
    fn test_small_image_not_upscaled() {
        let source = DecodeSource::Bytes(Bytes::from(png_bytes(40, 30)));
        let img = ScaledDecoder::default()
            .decode(&source, ImageSize::new(100, 100), DecodingPolicy::Fast)
            .unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
    }

    #[test]
    fn test_garbage_is_fatal() {
        let source = DecodeSource::Bytes(Bytes::from_static(b"definitely not an image"));
        let err = ScaledDecoder::default()
            .decode(&source, ImageSize::new(10, 10), DecodingPolicy::Fast)
            .unwrap_err();
        assert!(!err.is_out_of_memory());
    }

    #[test]
    fn test_memory_limit_reports_out_of_memory() {
        let source = DecodeSource::Bytes(Bytes::from(png_bytes(800, 600)));
        let err = ScaledDecoder::new(Some(1024))
            .decode(&source, ImageSize::new(100, 100), DecodingPolicy::Fast)
            .unwrap_err();
        assert!(err.is_out_of_memory(), "unexpected error: {err}");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ScaledDecoder::default()
            .decode(
                &DecodeSource::File("/nonexistent/pixload/img".into()),
                ImageSize::new(10, 10),
                DecodingPolicy::Fast,
            )
            .unwrap_err();
        assert!(matches!(err, DecodeError::Io { .. }));
    }
}

//! Content check for stored uploads.
//!
//! The declared MIME type comes from the client, so after a file lands on disk
//! its bytes are decoded for real before the upload is accepted.

use image::error::{ImageFormatHint, UnsupportedError, UnsupportedErrorKind};
use image::{ImageError, ImageFormat, ImageReader, Limits};
use std::io::Cursor;

/// Largest accepted width or height. Guards against small files that declare
/// enormous dimensions and expand to huge buffers on decode.
pub const MAX_IMAGE_DIMENSION: u32 = 8192;

/// Upper bound for any single decoder allocation.
const MAX_DECODE_ALLOC: u64 = 256 * 1024 * 1024;

/// Basic facts about a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// Sniffs the format from the leading bytes and decodes the whole image.
/// Images past [`MAX_IMAGE_DIMENSION`] fail with a limits error.
///
/// CPU-bound; call it from `spawn_blocking`.
pub fn inspect_image(bytes: &[u8]) -> Result<ImageInfo, ImageError> {
    let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader.format().ok_or_else(|| {
        ImageError::Unsupported(UnsupportedError::from_format_and_kind(
            ImageFormatHint::Unknown,
            UnsupportedErrorKind::Format(ImageFormatHint::Unknown),
        ))
    })?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    reader.limits(limits);

    let decoded = reader.decode()?;

    Ok(ImageInfo {
        width: decoded.width(),
        height: decoded.height(),
        format,
    })
}

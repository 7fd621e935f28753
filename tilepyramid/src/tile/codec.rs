//! Image codec seam.
//!
//! The engine only deals in [`PixelBuffer`]s. Turning stored or downloaded
//! bytes into pixels goes through [`TileCodec`] so hosts can plug in their own
//! decoder; [`ImageCodec`] is the default, backed by the `image` crate.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage};
use thiserror::Error;

use super::pixels::PixelBuffer;
use crate::map::TileContentType;

/// Errors from decoding or encoding tile images.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes are not a decodable image.
    #[error("failed to decode tile image: {0}")]
    Decode(String),

    /// The pixels could not be encoded.
    #[error("failed to encode tile image: {0}")]
    Encode(String),

    /// Pixel data length does not match the dimensions.
    #[error("buffer of {actual} bytes does not fit {width}x{height} at {bytes_per_pixel} bytes per pixel")]
    BufferSize {
        width: u32,
        height: u32,
        bytes_per_pixel: u8,
        actual: usize,
    },

    /// A pixel must be 1 to 255 bytes wide.
    #[error("pixels of {0} bytes are not supported")]
    InvalidPixelSize(usize),

    /// Only 4-byte RGBA buffers can be encoded.
    #[error("cannot encode {0}-byte pixels")]
    UnsupportedPixelSize(u8),
}

/// Converts between encoded tile bytes and raw pixels.
pub trait TileCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer, CodecError>;

    fn encode(&self, pixels: &PixelBuffer, format: TileContentType) -> Result<Vec<u8>, CodecError>;
}

/// Default codec: decodes anything the `image` crate understands into RGBA.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

impl TileCodec for ImageCodec {
    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer, CodecError> {
        let image = image::load_from_memory(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        PixelBuffer::new(width, height, 4, rgba.into_raw())
    }

    fn encode(&self, pixels: &PixelBuffer, format: TileContentType) -> Result<Vec<u8>, CodecError> {
        if pixels.bytes_per_pixel() != 4 {
            return Err(CodecError::UnsupportedPixelSize(pixels.bytes_per_pixel()));
        }
        let rgba = RgbaImage::from_raw(pixels.width(), pixels.height(), pixels.data().to_vec())
            .ok_or_else(|| CodecError::Encode("pixel buffer size mismatch".to_string()))?;

        let mut out = Cursor::new(Vec::new());
        match format {
            TileContentType::Png => DynamicImage::ImageRgba8(rgba).write_to(&mut out, ImageFormat::Png),
            // JPEG has no alpha channel
            TileContentType::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8())
                .write_to(&mut out, ImageFormat::Jpeg),
        }
        .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(out.into_inner())
    }
}

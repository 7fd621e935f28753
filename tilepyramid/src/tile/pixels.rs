//! Raw pixel buffers and the quadrant upscale used for tile synthesis.

use super::codec::CodecError;

/// Owned, tightly packed raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    bytes_per_pixel: u8,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wraps raw bytes, checking that the length matches the dimensions.
    pub fn new(
        width: u32,
        height: u32,
        bytes_per_pixel: u8,
        data: Vec<u8>,
    ) -> Result<Self, CodecError> {
        let expected = width as usize * height as usize * bytes_per_pixel as usize;
        if bytes_per_pixel == 0 || data.len() != expected {
            return Err(CodecError::BufferSize {
                width,
                height,
                bytes_per_pixel,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            bytes_per_pixel,
            data,
        })
    }

    /// A buffer where every pixel equals `pixel`, which must be 1 to 255
    /// bytes long.
    pub fn filled(width: u32, height: u32, pixel: &[u8]) -> Result<Self, CodecError> {
        let bytes_per_pixel = u8::try_from(pixel.len())
            .ok()
            .filter(|bpp| *bpp > 0)
            .ok_or(CodecError::InvalidPixelSize(pixel.len()))?;
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * pixel.len());
        for _ in 0..count {
            data.extend_from_slice(pixel);
        }
        Ok(Self {
            width,
            height,
            bytes_per_pixel,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_pixel(&self) -> u8 {
        self.bytes_per_pixel
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Bytes of the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is outside the buffer.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.bytes_per_pixel as usize;
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        &self.data[offset..offset + bpp]
    }
}

/// Crops one quarter of `parent` and scales it to `width` x `height`.
///
/// `(qx, qy)` picks the quarter (`0` = left/top, `1` = right/bottom), i.e. the
/// child tile's `(x & 1, y & 1)`. Sampling is nearest-neighbour, so chaining
/// two exact 2x upscales yields the same pixels as one 4x upscale of the
/// matching sixteenth.
pub fn upscale_quadrant(
    parent: &PixelBuffer,
    qx: u32,
    qy: u32,
    width: u32,
    height: u32,
) -> PixelBuffer {
    let crop_w = (parent.width / 2).max(1);
    let crop_h = (parent.height / 2).max(1);
    let origin_x = (qx & 1) * (parent.width / 2);
    let origin_y = (qy & 1) * (parent.height / 2);
    let bpp = parent.bytes_per_pixel as usize;

    let mut data = Vec::with_capacity(width as usize * height as usize * bpp);
    for dy in 0..height {
        let sy = origin_y + (dy as u64 * crop_h as u64 / height.max(1) as u64) as u32;
        for dx in 0..width {
            let sx = origin_x + (dx as u64 * crop_w as u64 / width.max(1) as u64) as u32;
            data.extend_from_slice(parent.pixel(sx, sy));
        }
    }

    PixelBuffer {
        width,
        height,
        bytes_per_pixel: parent.bytes_per_pixel,
        data,
    }
}

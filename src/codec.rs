//! Image file decode/encode through the `image` crate.
//!
//! Decoding always yields 3-channel interleaved RGB, whatever the source
//! format stores. Encoding picks the colour type from the channel count and
//! the file format from the path's extension.

use std::path::Path;

use ::image::{ColorType, ImageReader};

use crate::error::{HalosharpError, Result};
use crate::image::{Image, RGB_CHANNELS};

/// Decode the file at `path` into an RGB `Image`.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Image> {
    let path = path.as_ref();
    let decoded = ImageReader::open(path)
        .map_err(|e| HalosharpError::ImageLoad(format!("{}: {}", path.display(), e)))?
        .with_guessed_format()
        .map_err(|e| HalosharpError::ImageLoad(format!("{}: {}", path.display(), e)))?
        .decode()
        .map_err(|e| HalosharpError::ImageLoad(format!("{}: {}", path.display(), e)))?;

    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    Image::new(height as usize, width as usize, RGB_CHANNELS, rgb.into_raw())
}

/// Encode `image` to `path`; 1, 3 and 4 channels map to L8, RGB8 and RGBA8.
pub fn save_image<P: AsRef<Path>>(image: &Image, path: P) -> Result<()> {
    let path = path.as_ref();
    let color = match image.channels() {
        1 => ColorType::L8,
        3 => ColorType::Rgb8,
        4 => ColorType::Rgba8,
        n => {
            return Err(HalosharpError::Encode(format!(
                "no 8-bit colour type with {} channels",
                n
            )))
        }
    };
    let width = u32::try_from(image.cols())
        .map_err(|_| HalosharpError::Encode(format!("width {} too large", image.cols())))?;
    let height = u32::try_from(image.rows())
        .map_err(|_| HalosharpError::Encode(format!("height {} too large", image.rows())))?;

    ::image::save_buffer(path, image.data(), width, height, color)
        .map_err(|e| HalosharpError::Encode(format!("{}: {}", path.display(), e)))
}

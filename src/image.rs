//! In-memory pixel grids.
//!
//! `Image` is a row-major grid of interleaved 8-bit channels. `PaddedImage`
//! is the same grid extended on all four sides by a halo of replicated edge
//! pixels, so that every stencil access around an in-bounds pixel stays
//! inside the buffer.

use crate::error::{HalosharpError, Result};

/// Channel count of decoded colour input.
pub const RGB_CHANNELS: usize = 3;

/// A `rows × cols` grid of pixels with `channels` interleaved bytes each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    rows: usize,
    cols: usize,
    channels: usize,
    data: Vec<u8>,
}

impl Image {
    /// Wrap an existing interleaved buffer.
    ///
    /// Fails if `data.len()` is not `rows * cols * channels` or `channels` is 0.
    pub fn new(rows: usize, cols: usize, channels: usize, data: Vec<u8>) -> Result<Self> {
        if channels == 0 {
            return Err(HalosharpError::Image("channel count must be at least 1".into()));
        }
        let expected = byte_len(rows, cols, channels)?;
        if data.len() != expected {
            return Err(HalosharpError::Image(format!(
                "{}x{}x{} image needs {} bytes, got {}",
                rows,
                cols,
                channels,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            channels,
            data,
        })
    }

    /// A zero-filled image, used on non-root workers before the broadcast lands.
    pub fn zeros(rows: usize, cols: usize, channels: usize) -> Result<Self> {
        let len = byte_len(rows, cols, channels)?;
        let data = try_alloc(len, "image buffer")?;
        Self::new(rows, cols, channels, data)
    }

    /// Placeholder with no pixels. Non-root workers hand this to `convolve`.
    pub fn empty(channels: usize) -> Self {
        Self {
            rows: 0,
            cols: 0,
            channels: channels.max(1),
            data: Vec::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Bytes in one row of pixels.
    pub fn row_bytes(&self) -> usize {
        self.cols * self.channels
    }

    pub fn get(&self, row: usize, col: usize, channel: usize) -> u8 {
        self.data[(row * self.cols + col) * self.channels + channel]
    }

    pub fn set(&mut self, row: usize, col: usize, channel: usize, value: u8) {
        self.data[(row * self.cols + col) * self.channels + channel] = value;
    }

    /// Build the halo-padded view with `padding` replicated rows/cols per side.
    pub fn pad_replicate(&self, padding: usize) -> Result<PaddedImage> {
        let rows = self.rows + 2 * padding;
        let cols = self.cols + 2 * padding;
        let len = byte_len(rows, cols, self.channels)?;
        let mut data = try_alloc(len, "padded image")?;

        if self.rows > 0 && self.cols > 0 {
            let ch = self.channels;
            for prow in 0..rows {
                let src_row = prow.saturating_sub(padding).min(self.rows - 1);
                for pcol in 0..cols {
                    let src_col = pcol.saturating_sub(padding).min(self.cols - 1);
                    let src = (src_row * self.cols + src_col) * ch;
                    let dst = (prow * cols + pcol) * ch;
                    data[dst..dst + ch].copy_from_slice(&self.data[src..src + ch]);
                }
            }
        }

        Ok(PaddedImage {
            padding,
            rows,
            cols,
            channels: self.channels,
            data,
        })
    }
}

/// An `Image` extended by `padding` edge-replicated pixels on every side.
#[derive(Debug, Clone)]
pub struct PaddedImage {
    padding: usize,
    rows: usize,
    cols: usize,
    channels: usize,
    data: Vec<u8>,
}

impl PaddedImage {
    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Padded row count (`rows + 2 * padding`).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Padded column count (`cols + 2 * padding`).
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Sample at padded coordinates.
    #[inline]
    pub fn at(&self, prow: usize, pcol: usize, channel: usize) -> u8 {
        self.data[(prow * self.cols + pcol) * self.channels + channel]
    }
}

/// `rows * cols * channels` with overflow reported as an allocation failure.
pub(crate) fn byte_len(rows: usize, cols: usize, channels: usize) -> Result<usize> {
    rows.checked_mul(cols)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| {
            HalosharpError::Allocation(format!(
                "{}x{}x{} bytes overflows the address space",
                rows, cols, channels
            ))
        })
}

/// Zero-filled buffer that reports allocator failure instead of aborting.
pub(crate) fn try_alloc(len: usize, what: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| {
        HalosharpError::Allocation(format!("{} of {} bytes: {}", what, len, e))
    })?;
    buf.resize(len, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(rows: usize, cols: usize) -> Image {
        let data = (0..rows * cols).map(|i| i as u8).collect();
        Image::new(rows, cols, 1, data).unwrap()
    }

    #[test]
    fn new_rejects_wrong_length() {
        assert!(Image::new(2, 2, 3, vec![0; 11]).is_err());
        assert!(Image::new(2, 2, 0, vec![]).is_err());
        assert!(Image::new(2, 2, 3, vec![0; 12]).is_ok());
    }

    #[test]
    fn get_and_set_address_interleaved_channels() {
        let mut img = Image::zeros(2, 3, 3).unwrap();
        img.set(1, 2, 1, 77);
        assert_eq!(img.get(1, 2, 1), 77);
        assert_eq!(img.data()[5 * 3 + 1], 77);
        assert_eq!(img.row_bytes(), 9);
    }

    #[test]
    fn padded_dimensions() {
        let padded = ramp(4, 5).pad_replicate(2).unwrap();
        assert_eq!(padded.rows(), 8);
        assert_eq!(padded.cols(), 9);
        assert_eq!(padded.padding(), 2);
    }

    #[test]
    fn padding_replicates_corner() {
        let img = ramp(3, 3);
        let padded = img.pad_replicate(2).unwrap();
        // Everything up-left of the image maps back to (0,0).
        for prow in 0..=2 {
            for pcol in 0..=2 {
                assert_eq!(padded.at(prow, pcol, 0), img.get(0, 0, 0));
            }
        }
        // Bottom-right halo maps to the last pixel.
        assert_eq!(padded.at(6, 6, 0), img.get(2, 2, 0));
    }

    #[test]
    fn padding_replicates_edges() {
        let img = ramp(3, 4);
        let padded = img.pad_replicate(1).unwrap();
        for col in 0..4 {
            assert_eq!(padded.at(0, col + 1, 0), img.get(0, col, 0));
            assert_eq!(padded.at(4, col + 1, 0), img.get(2, col, 0));
        }
        for row in 0..3 {
            assert_eq!(padded.at(row + 1, 0, 0), img.get(row, 0, 0));
            assert_eq!(padded.at(row + 1, 5, 0), img.get(row, 3, 0));
            for col in 0..4 {
                assert_eq!(padded.at(row + 1, col + 1, 0), img.get(row, col, 0));
            }
        }
    }

    #[test]
    fn padding_keeps_channels_separate() {
        let img = Image::new(1, 1, 3, vec![10, 20, 30]).unwrap();
        let padded = img.pad_replicate(1).unwrap();
        for prow in 0..3 {
            for pcol in 0..3 {
                assert_eq!(padded.at(prow, pcol, 0), 10);
                assert_eq!(padded.at(prow, pcol, 1), 20);
                assert_eq!(padded.at(prow, pcol, 2), 30);
            }
        }
    }

    #[test]
    fn padding_an_empty_image_is_empty() {
        let padded = Image::empty(3).pad_replicate(1).unwrap();
        assert_eq!(padded.rows(), 2);
        assert_eq!(padded.cols(), 2);
    }

    #[test]
    fn byte_len_overflow_is_allocation_error() {
        let err = byte_len(usize::MAX, 2, 1).unwrap_err();
        assert!(matches!(err, HalosharpError::Allocation(_)));
    }
}

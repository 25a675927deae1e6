//! Per-pixel stencil evaluation over a halo-padded image.

use std::ops::Range;

use super::kernel::Kernel;
use crate::error::{HalosharpError, Result};
use crate::image::PaddedImage;

/// Convolution response of one channel at unpadded `(col, row)`, clamped to `[0, 255]`.
///
/// `padding` is the kernel's halo width and must not exceed the halo the
/// padded image was built with. Accumulation is in `i64` and only the final
/// sum is clamped.
#[inline]
pub fn evaluate(
    padded: &PaddedImage,
    kernel: &Kernel,
    col: usize,
    row: usize,
    padding: usize,
    channel: usize,
) -> u8 {
    debug_assert!(padding <= padded.padding());
    debug_assert_eq!(kernel.padding(), padding);

    // Top-left corner of the stencil window in padded coordinates.
    let base_row = row + padded.padding() - padding;
    let base_col = col + padded.padding() - padding;

    let mut acc: i64 = 0;
    for ky in 0..kernel.size() {
        for kx in 0..kernel.size() {
            let w = kernel.weight(ky, kx);
            if w == 0 {
                continue;
            }
            let px = padded.at(base_row + ky, base_col + kx, channel);
            acc += i64::from(px) * i64::from(w);
        }
    }
    acc.clamp(0, 255) as u8
}

/// Evaluate every pixel and channel of `rows` into `out`.
///
/// Order is row-major, then column, then channel; `out` must hold exactly
/// `rows.len() * cols * channels` bytes where `cols` is the unpadded width.
pub fn apply_rows(
    padded: &PaddedImage,
    kernel: &Kernel,
    rows: Range<usize>,
    out: &mut [u8],
) -> Result<()> {
    let padding = kernel.padding();
    let channels = padded.channels();
    let cols = padded.cols() - 2 * padded.padding();
    let expected = rows.len() * cols * channels;
    if out.len() != expected {
        return Err(HalosharpError::Image(format!(
            "output slice holds {} bytes, rows {:?} need {}",
            out.len(),
            rows,
            expected
        )));
    }

    let mut idx = 0;
    for row in rows {
        for col in 0..cols {
            for channel in 0..channels {
                out[idx] = evaluate(padded, kernel, col, row, padding, channel);
                idx += 1;
            }
        }
    }
    Ok(())
}

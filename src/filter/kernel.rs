//! High-pass kernel synthesis.
//!
//! The kernel is a `k × k` integer grid whose only non-zero cells lie on the
//! horizontal and vertical cross through the centre. Cross cells at axis
//! distance `d` weigh `-(c - d + 1)` where `c = k / 2`, and the centre holds
//! the negated sum of everything else, so the grid sums to zero.

use std::fmt;

use crate::error::{HalosharpError, Result};

/// Square high-pass stencil with integer weights, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    size: usize,
    weights: Vec<i32>,
}

impl Kernel {
    /// Synthesize the cross-shaped high-pass kernel of side `size`.
    ///
    /// Returns `InvalidKernelSize` when `size` is even or smaller than 3,
    /// `KernelTooLarge` when the center weight `2c(c + 1)` does not fit an
    /// `i32`, and `Allocation` when the grid cannot be allocated.
    pub fn high_pass(size: usize) -> Result<Self> {
        validate_size(size)?;

        let center = size / 2;
        let center_weight = center_weight_for(center)
            .ok_or(HalosharpError::KernelTooLarge { size })?;

        let cells = size.checked_mul(size).ok_or_else(|| {
            HalosharpError::Allocation(format!("{size}x{size} kernel overflows usize"))
        })?;
        let mut weights = Vec::new();
        weights.try_reserve_exact(cells).map_err(|e| {
            HalosharpError::Allocation(format!("{size}x{size} kernel: {e}"))
        })?;
        weights.resize(cells, 0i32);
        let mut sum: i64 = 0;

        for y in 0..size {
            for x in 0..size {
                let dx = x.abs_diff(center);
                let dy = y.abs_diff(center);
                if dx == 0 && dy == 0 {
                    continue;
                }
                if dx == 0 || dy == 0 {
                    // Off-centre cross cell: only one of dx/dy is non-zero.
                    let dist = dx + dy;
                    let weight = -((center - dist + 1) as i32);
                    weights[y * size + x] = weight;
                    sum += i64::from(weight);
                }
            }
        }

        debug_assert_eq!(-sum, i64::from(center_weight));
        weights[center * size + center] = center_weight;
        Ok(Self { size, weights })
    }

    /// Side length `k`.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Halo width needed around the image: `(k - 1) / 2`.
    pub fn padding(&self) -> usize {
        (self.size - 1) / 2
    }

    /// Weight at row `i`, column `j`.
    #[inline]
    pub fn weight(&self, i: usize, j: usize) -> i32 {
        self.weights[i * self.size + j]
    }

    pub fn center_weight(&self) -> i32 {
        let c = self.size / 2;
        self.weight(c, c)
    }

    /// Row-major weights.
    pub fn weights(&self) -> &[i32] {
        &self.weights
    }

    pub fn sum(&self) -> i64 {
        self.weights.iter().map(|&w| i64::from(w)).sum()
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.weights.chunks(self.size) {
            for w in row {
                write!(f, "{:>4} ", w)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Sum of the cross magnitudes, `4 * (c + (c - 1) + ... + 1)`, if it fits.
fn center_weight_for(center: usize) -> Option<i32> {
    let c = u64::try_from(center).ok()?;
    let total = c.checked_mul(c.checked_add(1)?)?.checked_mul(2)?;
    i32::try_from(total).ok()
}

/// Accept odd sizes of at least 3.
pub fn validate_size(size: usize) -> Result<()> {
    if size % 2 == 0 || size < 3 {
        return Err(HalosharpError::InvalidKernelSize { size });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_three_is_the_laplacian() {
        let k = Kernel::high_pass(3).unwrap();
        assert_eq!(k.weights(), &[0, -1, 0, -1, 4, -1, 0, -1, 0]);
        assert_eq!(k.padding(), 1);
    }

    #[test]
    fn size_five_weights() {
        let k = Kernel::high_pass(5).unwrap();
        #[rustfmt::skip]
        let expected = [
            0,  0, -1,  0,  0,
            0,  0, -2,  0,  0,
           -1, -2, 12, -2, -1,
            0,  0, -2,  0,  0,
            0,  0, -1,  0,  0,
        ];
        assert_eq!(k.weights(), &expected);
        assert_eq!(k.center_weight(), 12);
        assert_eq!(k.padding(), 2);
    }

    #[test]
    fn odd_sizes_sum_to_zero() {
        for size in (3..=31).step_by(2) {
            let k = Kernel::high_pass(size).unwrap();
            assert_eq!(k.sum(), 0, "kernel of size {size} does not sum to zero");
            assert!(k.center_weight() > 0);
        }
    }

    #[test]
    fn off_cross_cells_are_zero() {
        let k = Kernel::high_pass(7).unwrap();
        let c = 3;
        for i in 0..7 {
            for j in 0..7 {
                if i != c && j != c {
                    assert_eq!(k.weight(i, j), 0, "({i},{j}) should be off the cross");
                } else if (i, j) != (c, c) {
                    assert!(k.weight(i, j) < 0);
                }
            }
        }
    }

    #[test]
    fn rejects_even_and_small_sizes() {
        for size in [0, 1, 2, 4, 6, 10, 64] {
            match Kernel::high_pass(size) {
                Err(HalosharpError::InvalidKernelSize { size: s }) => assert_eq!(s, size),
                other => panic!("size {size}: expected InvalidKernelSize, got {other:?}"),
            }
        }
    }

    #[test]
    fn oversized_kernels_fail_without_panicking() {
        // c = 32768: 2c(c + 1) is just past i32::MAX.
        assert!(matches!(
            Kernel::high_pass(65537),
            Err(HalosharpError::KernelTooLarge { size: 65537 })
        ));
        assert!(matches!(
            Kernel::high_pass((1 << 33) + 1),
            Err(HalosharpError::KernelTooLarge { .. })
        ));
        assert!(Kernel::high_pass(usize::MAX).is_err());
        assert_eq!(center_weight_for(32767), Some(2 * 32767 * 32768));
    }

    #[test]
    fn display_uses_fixed_width_columns() {
        let k = Kernel::high_pass(3).unwrap();
        let text = k.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "  -1    4   -1 ");
    }
}

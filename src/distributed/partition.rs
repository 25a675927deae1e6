//! Static row partitioning and gather transfer tables.
//!
//! Rows are split into contiguous blocks, one per worker. Every worker gets
//! `total / workers` rows and the first `total % workers` workers get one
//! extra, so the blocks tile `[0, total)` exactly with no gaps or overlap.

use std::ops::Range;

use crate::error::{HalosharpError, Result};

/// The contiguous block of rows one worker computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPartition {
    pub start_row: usize,
    pub local_rows: usize,
}

impl RowPartition {
    /// Rows assigned to `rank` out of `workers` for an image of `total_rows`.
    pub fn for_rank(total_rows: usize, workers: usize, rank: usize) -> Result<Self> {
        check_workers(workers)?;
        if rank >= workers {
            return Err(HalosharpError::Partition(format!(
                "rank {} out of range for {} workers",
                rank, workers
            )));
        }
        let base = total_rows / workers;
        let remainder = total_rows % workers;
        Ok(Self {
            start_row: rank * base + rank.min(remainder),
            local_rows: base + usize::from(rank < remainder),
        })
    }

    /// All partitions in rank order.
    pub fn all(total_rows: usize, workers: usize) -> Result<Vec<Self>> {
        check_workers(workers)?;
        (0..workers)
            .map(|rank| Self::for_rank(total_rows, workers, rank))
            .collect()
    }

    pub fn rows(&self) -> Range<usize> {
        self.start_row..self.start_row + self.local_rows
    }

    pub fn is_empty(&self) -> bool {
        self.local_rows == 0
    }
}

/// Root-side per-worker byte counts and offsets into the gather destination.
///
/// `displs[0] == 0`, `displs[i] == displs[i-1] + counts[i-1]` and
/// `counts` sums to the full image size in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTable {
    pub counts: Vec<usize>,
    pub displs: Vec<usize>,
}

impl TransferTable {
    /// Build the table for `workers` ranks, each row carrying `row_bytes` bytes.
    pub fn build(total_rows: usize, row_bytes: usize, workers: usize) -> Result<Self> {
        let mut counts = Vec::with_capacity(workers);
        let mut displs = Vec::with_capacity(workers);
        let mut offset = 0usize;
        for part in RowPartition::all(total_rows, workers)? {
            let count = part.local_rows.checked_mul(row_bytes).ok_or_else(|| {
                HalosharpError::Allocation(format!(
                    "{} rows of {} bytes overflows",
                    part.local_rows, row_bytes
                ))
            })?;
            displs.push(offset);
            counts.push(count);
            offset += count;
        }
        Ok(Self { counts, displs })
    }

    pub fn num_ranks(&self) -> usize {
        self.counts.len()
    }

    /// Sum of all counts: the size of the gathered buffer.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Byte range of `rank`'s contribution in the gathered buffer.
    pub fn range(&self, rank: usize) -> Range<usize> {
        self.displs[rank]..self.displs[rank] + self.counts[rank]
    }
}

fn check_workers(workers: usize) -> Result<()> {
    if workers == 0 {
        return Err(HalosharpError::Partition("worker count must be at least 1".into()));
    }
    Ok(())
}

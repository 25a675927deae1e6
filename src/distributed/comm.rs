//! Collective transport abstraction for the distributed convolution.
//!
//! The coordinator only ever needs two blocking collectives (broadcast from
//! the root and a variable-count gather to the root) plus rank/size queries
//! and a hard abort. Keeping them behind one trait lets the kernel and
//! partition logic run under a single-process or in-process thread-group
//! transport as well as MPI.

use super::partition::TransferTable;
use crate::error::{HalosharpError, Result};

/// Rank that holds the source image and receives the gathered result.
pub const ROOT: usize = 0;

/// Root-side destination of a variable-count gather.
pub struct GatherTarget<'a> {
    /// Full-size destination, `table.total()` bytes.
    pub buffer: &'a mut [u8],
    /// Per-rank byte counts and offsets into `buffer`.
    pub table: &'a TransferTable,
}

/// Abstraction over the collectives a convolution round needs.
///
/// Implementations: `SingleProcessComm` (no-op), `LocalGroupComm` (threads
/// in one process), `MpiComm` (via the mpi crate, `distributed` feature).
///
/// Every collective blocks until all ranks have taken part. A rank that
/// skips a call leaves its peers waiting.
pub trait CommunicationBackend {
    /// This process's rank.
    fn rank(&self) -> usize;

    /// Total number of ranks.
    fn num_ranks(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// Broadcast a small array of dimensions from `root`, in place.
    fn broadcast_dims(&self, dims: &mut [u64], root: usize) -> Result<()>;

    /// Broadcast a byte buffer from `root`, in place.
    ///
    /// Non-root ranks must pass a buffer already sized to the root's.
    fn broadcast_bytes(&self, data: &mut [u8], root: usize) -> Result<()>;

    /// Gather every rank's `local` bytes into the root's target.
    ///
    /// The root passes `Some(target)`; rank `r`'s bytes land at
    /// `target.table.range(r)`. Other ranks pass `None`.
    fn gather_bytes(
        &self,
        local: &[u8],
        target: Option<GatherTarget<'_>>,
        root: usize,
    ) -> Result<()>;

    /// Terminate every participant. Used when a rank cannot continue a
    /// collective round it has already entered.
    fn abort(&self, code: i32) -> !;
}

/// No-op transport for a single worker.
///
/// Broadcasts pass through unchanged and the gather is a local copy.
pub struct SingleProcessComm;

impl CommunicationBackend for SingleProcessComm {
    fn rank(&self) -> usize {
        0
    }

    fn num_ranks(&self) -> usize {
        1
    }

    fn broadcast_dims(&self, _dims: &mut [u64], root: usize) -> Result<()> {
        check_root(root, 1)
    }

    fn broadcast_bytes(&self, _data: &mut [u8], root: usize) -> Result<()> {
        // Single process: the root already holds the data.
        check_root(root, 1)
    }

    fn gather_bytes(
        &self,
        local: &[u8],
        target: Option<GatherTarget<'_>>,
        root: usize,
    ) -> Result<()> {
        check_root(root, 1)?;
        let target = target.ok_or_else(|| {
            HalosharpError::Comm("root must supply a gather target".into())
        })?;
        copy_contribution(target.buffer, target.table, 0, local)
    }

    fn abort(&self, code: i32) -> ! {
        tracing::error!(code, "aborting single-process run");
        std::process::exit(code)
    }
}

pub(crate) fn check_root(root: usize, num_ranks: usize) -> Result<()> {
    if root >= num_ranks {
        return Err(HalosharpError::Comm(format!(
            "root {} out of range for {} ranks",
            root, num_ranks
        )));
    }
    Ok(())
}

/// Place `rank`'s bytes at its table offset, checking the declared count.
pub(crate) fn copy_contribution(
    buffer: &mut [u8],
    table: &TransferTable,
    rank: usize,
    bytes: &[u8],
) -> Result<()> {
    if rank >= table.num_ranks() {
        return Err(HalosharpError::Comm(format!(
            "transfer table has no entry for rank {}",
            rank
        )));
    }
    if table.counts[rank] != bytes.len() {
        return Err(HalosharpError::Comm(format!(
            "rank {} sent {} bytes, table expects {}",
            rank,
            bytes.len(),
            table.counts[rank]
        )));
    }
    let range = table.range(rank);
    let buf_len = buffer.len();
    let dst = buffer.get_mut(range.clone()).ok_or_else(|| {
        HalosharpError::Comm(format!(
            "gather buffer of {} bytes cannot hold range {:?}",
            buf_len, range
        ))
    })?;
    dst.copy_from_slice(bytes);
    Ok(())
}

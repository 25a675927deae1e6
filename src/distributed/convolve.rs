//! Distributed high-pass convolution over a row-partitioned image.
//!
//! One `convolve` call is one collective round, and every rank must make it:
//!
//! 1. validate the kernel size and synthesize the kernel (local, no comms);
//! 2. broadcast `[rows, cols, channels]`, then the pixel buffer, from the root;
//! 3. pad the full replica with an edge-replicated halo;
//! 4. evaluate the stencil over this rank's row block into a local buffer;
//! 5. gather every block into the root's output using the transfer table.
//!
//! Only the root's return value carries the sharpened image. Allocation and
//! transport failures after the broadcast has started abort every rank
//! through the transport, since a rank that drops out would leave its peers
//! blocked in the next collective.

use std::time::Instant;

use super::comm::{CommunicationBackend, GatherTarget, ROOT};
use super::partition::{RowPartition, TransferTable};
use crate::error::{HalosharpError, Result};
use crate::filter::stencil;
use crate::filter::Kernel;
use crate::image::{byte_len, try_alloc, Image};
use crate::stats::Stats;

/// Exit code passed to `CommunicationBackend::abort` on a mid-round failure.
pub const ABORT_CODE: i32 = 1;

/// Sharpen `image` with a `kernel_size` high-pass stencil across all ranks.
///
/// The root passes the source image; other ranks pass any placeholder
/// (typically `Image::empty`) since their replica is rebuilt from the
/// broadcast. Returns `InvalidKernelSize` on every rank, before any
/// communication, when `kernel_size` is even or below 3.
pub fn convolve(
    image: &Image,
    kernel_size: usize,
    comm: &dyn CommunicationBackend,
    mut stats: Option<&mut Stats>,
) -> Result<Image> {
    let rank = comm.rank();
    let workers = comm.num_ranks();
    let _span = tracing::info_span!("convolve", rank, workers, kernel_size).entered();

    let kernel = Kernel::high_pass(kernel_size)?;
    if comm.is_root() {
        tracing::debug!("generated kernel:\n{}", kernel);
    }

    let t = Instant::now();
    let replica = broadcast_image(image, comm)?;
    if let Some(ref mut s) = stats {
        s.broadcast += t.elapsed();
    }

    let (rows, cols, channels) = (replica.rows(), replica.cols(), replica.channels());
    let row_bytes = replica.row_bytes();

    let start = Instant::now();

    let t = Instant::now();
    let padded = or_abort(comm, replica.pad_replicate(kernel.padding()))?;
    if let Some(ref mut s) = stats {
        s.pad += t.elapsed();
    }

    let part = RowPartition::for_rank(rows, workers, rank)?;
    let table = if comm.is_root() {
        Some(TransferTable::build(rows, row_bytes, workers)?)
    } else {
        None
    };
    tracing::debug!(
        start_row = part.start_row,
        local_rows = part.local_rows,
        "row partition assigned"
    );

    let t = Instant::now();
    let local_len = or_abort(comm, byte_len(part.local_rows, cols, channels))?;
    let mut local = or_abort(comm, try_alloc(local_len, "local result buffer"))?;
    stencil::apply_rows(&padded, &kernel, part.rows(), &mut local)?;
    drop(padded);
    if let Some(ref mut s) = stats {
        s.compute += t.elapsed();
    }

    let t = Instant::now();
    let output = match table {
        Some(ref table) => {
            let mut gathered = or_abort(comm, try_alloc(table.total(), "gather buffer"))?;
            let target = GatherTarget {
                buffer: &mut gathered,
                table,
            };
            or_abort(comm, comm.gather_bytes(&local, Some(target), ROOT))?;
            Image::new(rows, cols, channels, gathered)?
        }
        None => {
            or_abort(comm, comm.gather_bytes(&local, None, ROOT))?;
            Image::empty(channels)
        }
    };
    if let Some(ref mut s) = stats {
        s.gather += t.elapsed();
    }

    if comm.is_root() {
        let elapsed = start.elapsed();
        tracing::info!(
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            rows,
            cols,
            workers,
            "distributed convolution finished"
        );
    }

    if let Some(ref mut s) = stats {
        s.convolutions += 1;
        s.workers = workers;
        s.kernel_size = kernel_size;
        s.local_rows = part.local_rows;
        s.pixels_evaluated += (part.local_rows * cols) as u64;
        if let Some(ref table) = table {
            s.bytes_gathered += table.total() as u64;
        }
    }

    Ok(output)
}

/// Like `convolve`, but an invalid kernel size leaves the image unchanged.
///
/// The size check happens before any collective, so every rank takes the
/// same branch and none is left waiting.
pub fn sharpen_or_keep(
    image: &Image,
    kernel_size: usize,
    comm: &dyn CommunicationBackend,
    stats: Option<&mut Stats>,
) -> Result<Image> {
    match convolve(image, kernel_size, comm, stats) {
        Err(HalosharpError::InvalidKernelSize { size }) => {
            if comm.is_root() {
                tracing::warn!(size, "kernel size must be odd and >= 3; image left unchanged");
            }
            Ok(image.clone())
        }
        other => other,
    }
}

/// Give every rank an identical replica of the root's image.
///
/// Dimensions go first so non-root ranks can size their buffer before the
/// pixel broadcast.
fn broadcast_image(image: &Image, comm: &dyn CommunicationBackend) -> Result<Image> {
    let mut dims = if comm.is_root() {
        [image.rows() as u64, image.cols() as u64, image.channels() as u64]
    } else {
        [0u64; 3]
    };
    or_abort(comm, comm.broadcast_dims(&mut dims, ROOT))?;

    let [rows, cols, channels] = dims.map(|d| usize::try_from(d).unwrap_or(usize::MAX));
    let mut replica = if comm.is_root() {
        let mut data = or_abort(comm, try_alloc(image.data().len(), "image replica"))?;
        data.copy_from_slice(image.data());
        Image::new(rows, cols, channels, data)?
    } else {
        or_abort(comm, Image::zeros(rows, cols, channels))?
    };

    or_abort(comm, comm.broadcast_bytes(replica.data_mut(), ROOT))?;
    Ok(replica)
}

/// Escalate allocation and transport failures to a cluster-wide abort.
///
/// Peers may already be inside the next collective, so returning the error
/// from one rank alone would leave them blocked.
fn or_abort<T>(comm: &dyn CommunicationBackend, result: Result<T>) -> Result<T> {
    match result {
        Err(HalosharpError::Allocation(msg)) => {
            tracing::error!(rank = comm.rank(), %msg, "allocation failed mid-collective");
            comm.abort(ABORT_CODE)
        }
        Err(HalosharpError::Comm(msg)) => {
            tracing::error!(rank = comm.rank(), %msg, "collective failed");
            comm.abort(ABORT_CODE)
        }
        other => other,
    }
}

//! Row-partitioned convolution across workers.

pub mod comm;
pub mod comm_local;
#[cfg(feature = "distributed")]
pub mod comm_mpi;
pub mod convolve;
pub mod partition;

pub use convolve::{convolve, sharpen_or_keep};

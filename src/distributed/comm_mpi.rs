//! MPI communication backend for distributed convolution.
//!
//! Requires the `distributed` feature flag and an MPI installation.
//! Implements `CommunicationBackend` using `mpi::traits::*`: the image
//! broadcast maps to `MPI_Bcast` and the result gather to `MPI_Gatherv`.
//!
//! # Usage
//!
//! `MpiComm::initialize` owns the MPI universe for the life of the value;
//! dropping it finalises MPI, so keep it alive until the last collective:
//!
//! ```ignore
//! let comm = MpiComm::initialize()?;
//! let sharpened = convolve(&image, 3, &comm, None)?;
//! ```

use mpi::datatype::PartitionMut;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;

use super::comm::{check_root, CommunicationBackend, GatherTarget};
use crate::error::{HalosharpError, Result};

/// MPI-based communication backend over the world communicator.
pub struct MpiComm {
    universe: Universe,
}

impl MpiComm {
    /// Initialise MPI and take ownership of the universe.
    ///
    /// Fails if MPI was already initialised elsewhere in the process.
    pub fn initialize() -> Result<Self> {
        let universe = mpi::initialize()
            .ok_or_else(|| HalosharpError::Comm("MPI already initialized".into()))?;
        Ok(Self { universe })
    }

    fn world(&self) -> SimpleCommunicator {
        self.universe.world()
    }
}

fn to_count(n: usize) -> Result<Count> {
    Count::try_from(n).map_err(|_| {
        HalosharpError::Comm(format!("{} elements exceed MPI's 32-bit count", n))
    })
}

impl CommunicationBackend for MpiComm {
    fn rank(&self) -> usize {
        self.world().rank() as usize
    }

    fn num_ranks(&self) -> usize {
        self.world().size() as usize
    }

    fn broadcast_dims(&self, dims: &mut [u64], root: usize) -> Result<()> {
        let world = self.world();
        check_root(root, world.size() as usize)?;
        world.process_at_rank(root as Count).broadcast_into(dims);
        Ok(())
    }

    fn broadcast_bytes(&self, data: &mut [u8], root: usize) -> Result<()> {
        let world = self.world();
        check_root(root, world.size() as usize)?;
        to_count(data.len())?;
        world.process_at_rank(root as Count).broadcast_into(data);
        Ok(())
    }

    fn gather_bytes(
        &self,
        local: &[u8],
        target: Option<GatherTarget<'_>>,
        root: usize,
    ) -> Result<()> {
        let world = self.world();
        check_root(root, world.size() as usize)?;
        let root_process = world.process_at_rank(root as Count);
        // Every rank checks its own count before entering the collective.
        to_count(local.len())?;

        if world.rank() as usize != root {
            root_process.gather_varcount_into(local);
            return Ok(());
        }

        let target = target.ok_or_else(|| {
            HalosharpError::Comm("root must supply a gather target".into())
        })?;
        let counts = target
            .table
            .counts
            .iter()
            .map(|&c| to_count(c))
            .collect::<Result<Vec<Count>>>()?;
        let displs = target
            .table
            .displs
            .iter()
            .map(|&d| to_count(d))
            .collect::<Result<Vec<Count>>>()?;

        let mut partition = PartitionMut::new(target.buffer, &counts[..], &displs[..]);
        root_process.gather_varcount_into_root(local, &mut partition);
        Ok(())
    }

    fn abort(&self, code: i32) -> ! {
        tracing::error!(rank = self.rank(), code, "aborting MPI world");
        self.world().abort(code)
    }
}

//! In-process worker group transport.
//!
//! `LocalGroupComm` gives each thread of a group its own rank and implements
//! the collectives by copying buffers through shared slots guarded by a
//! mutex, with a generation-counted barrier between the deposit and read
//! phases. It lets multi-worker convolutions run without an MPI launcher.
//!
//! `abort` marks the group as aborted, wakes every blocked peer (their
//! pending collective returns an error) and panics the calling thread.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use super::comm::{check_root, copy_contribution, CommunicationBackend, GatherTarget};
use crate::error::{HalosharpError, Result};

struct GroupState {
    arrived: usize,
    generation: u64,
    slots: Vec<Option<Vec<u8>>>,
    aborted: Option<(usize, i32)>,
}

struct Shared {
    size: usize,
    state: Mutex<GroupState>,
    cond: Condvar,
}

/// One rank of an in-process worker group.
pub struct LocalGroupComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalGroupComm {
    /// Create `size` connected handles, rank 0 first.
    pub fn group(size: usize) -> Result<Vec<Self>> {
        if size == 0 {
            return Err(HalosharpError::Comm("worker group needs at least one rank".into()));
        }
        let shared = Arc::new(Shared {
            size,
            state: Mutex::new(GroupState {
                arrived: 0,
                generation: 0,
                slots: vec![None; size],
                aborted: None,
            }),
            cond: Condvar::new(),
        });
        Ok((0..size)
            .map(|rank| Self {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, GroupState>> {
        self.shared
            .state
            .lock()
            .map_err(|_| HalosharpError::Comm("worker group state poisoned".into()))
    }

    /// Block until every rank has arrived, or fail if the group was aborted.
    fn wait(&self) -> Result<()> {
        let mut st = self.lock()?;
        check_aborted(&st)?;
        let generation = st.generation;
        st.arrived += 1;
        if st.arrived == self.shared.size {
            st.arrived = 0;
            st.generation = st.generation.wrapping_add(1);
            self.shared.cond.notify_all();
            return Ok(());
        }
        while st.generation == generation {
            st = self
                .shared
                .cond
                .wait(st)
                .map_err(|_| HalosharpError::Comm("worker group state poisoned".into()))?;
            check_aborted(&st)?;
        }
        Ok(())
    }

    fn set_slot(&self, slot: usize, bytes: Option<Vec<u8>>) -> Result<()> {
        self.lock()?.slots[slot] = bytes;
        Ok(())
    }

    fn read_root_slot(&self, root: usize, data: &mut [u8]) -> Result<()> {
        let st = self.lock()?;
        let src = st.slots[root].as_deref().ok_or_else(|| {
            HalosharpError::Comm(format!("root {} did not deposit a broadcast", root))
        })?;
        if src.len() != data.len() {
            return Err(HalosharpError::Comm(format!(
                "rank {} expected {} broadcast bytes, root sent {}",
                self.rank,
                data.len(),
                src.len()
            )));
        }
        data.copy_from_slice(src);
        Ok(())
    }

    fn collect_slots(&self, target: Option<GatherTarget<'_>>) -> Result<()> {
        let target = target.ok_or_else(|| {
            HalosharpError::Comm("root must supply a gather target".into())
        })?;
        if target.table.num_ranks() != self.shared.size {
            return Err(HalosharpError::Comm(format!(
                "transfer table covers {} ranks, group has {}",
                target.table.num_ranks(),
                self.shared.size
            )));
        }
        let st = self.lock()?;
        for (rank, slot) in st.slots.iter().enumerate() {
            let bytes = slot.as_deref().unwrap_or(&[]);
            copy_contribution(target.buffer, target.table, rank, bytes)?;
        }
        Ok(())
    }
}

fn check_aborted(st: &GroupState) -> Result<()> {
    match st.aborted {
        Some((rank, code)) => Err(HalosharpError::Comm(format!(
            "rank {} aborted the worker group with code {}",
            rank, code
        ))),
        None => Ok(()),
    }
}

impl CommunicationBackend for LocalGroupComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn num_ranks(&self) -> usize {
        self.shared.size
    }

    fn broadcast_dims(&self, dims: &mut [u64], root: usize) -> Result<()> {
        let mut bytes: Vec<u8> = dims.iter().flat_map(|d| d.to_le_bytes()).collect();
        self.broadcast_bytes(&mut bytes, root)?;
        for (dim, chunk) in dims.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *dim = u64::from_le_bytes(raw);
        }
        Ok(())
    }

    fn broadcast_bytes(&self, data: &mut [u8], root: usize) -> Result<()> {
        check_root(root, self.shared.size)?;
        if self.rank == root {
            self.set_slot(root, Some(data.to_vec()))?;
        }
        self.wait()?;

        // Every rank must reach the second barrier, even after a local error.
        let result = if self.rank == root {
            Ok(())
        } else {
            self.read_root_slot(root, data)
        };
        self.wait()?;

        if self.rank == root {
            self.set_slot(root, None)?;
        }
        result
    }

    fn gather_bytes(
        &self,
        local: &[u8],
        target: Option<GatherTarget<'_>>,
        root: usize,
    ) -> Result<()> {
        check_root(root, self.shared.size)?;
        self.set_slot(self.rank, Some(local.to_vec()))?;
        self.wait()?;

        let result = if self.rank == root {
            self.collect_slots(target)
        } else {
            Ok(())
        };
        self.wait()?;

        self.set_slot(self.rank, None)?;
        result
    }

    fn abort(&self, code: i32) -> ! {
        tracing::error!(rank = self.rank, code, "aborting local worker group");
        if let Ok(mut st) = self.shared.state.lock() {
            st.aborted = Some((self.rank, code));
        }
        self.shared.cond.notify_all();
        panic!("rank {} aborted the local worker group with code {}", self.rank, code);
    }
}

/// Run `f` on `workers` threads, one `LocalGroupComm` each, and collect the
/// per-rank results in rank order.
///
/// A worker that returns an error or panics (including through `abort`)
/// fails the whole run.
pub fn run_workers<T, F>(workers: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(LocalGroupComm) -> Result<T> + Sync,
{
    let comms = LocalGroupComm::group(workers)?;
    let f = &f;
    thread::scope(|scope| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| scope.spawn(move || f(comm)))
            .collect();
        // Join every handle before looking at any result: the scope panics
        // on exit if a panicked thread was left unjoined.
        let joined: Vec<_> = handles.into_iter().map(|handle| handle.join()).collect();
        joined
            .into_iter()
            .enumerate()
            .map(|(rank, outcome)| {
                outcome.map_err(|_| HalosharpError::Comm(format!("worker {} panicked", rank)))?
            })
            .collect()
    })
}

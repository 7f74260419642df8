use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::TrainingError;
use crate::grid::Cell;

/// Cooperative cancellation flag shared between the interactive side and a
/// training worker. Checked between episodes / walks only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-table flag guaranteeing at most one active training session.
#[derive(Debug, Clone, Default)]
pub struct SessionLock {
    active: Arc<AtomicBool>,
    sessions: Arc<AtomicU64>,
}

impl SessionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the table for a session. `owner` names the table in the error.
    pub fn acquire(&self, owner: &'static str) -> Result<SessionGuard, TrainingError> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TrainingError::SessionActive(owner))?;
        let index = self.sessions.fetch_add(1, Ordering::Relaxed);
        Ok(SessionGuard {
            active: Arc::clone(&self.active),
            index,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Releases the session on drop, including when the worker unwinds.
#[derive(Debug)]
pub struct SessionGuard {
    active: Arc<AtomicBool>,
    index: u64,
}

impl SessionGuard {
    /// Zero-based count of sessions started on this table before this one.
    pub fn index(&self) -> u64 {
        self.index
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// A position written by the interactive thread and read by a training
/// worker, e.g. the navigator an adversary policy is learning to chase.
#[derive(Debug, Clone)]
pub struct LivePosition(Arc<AtomicU64>);

impl LivePosition {
    pub fn new(cell: Cell) -> Self {
        LivePosition(Arc::new(AtomicU64::new(pack(cell))))
    }

    pub fn set(&self, cell: Cell) {
        self.0.store(pack(cell), Ordering::Relaxed);
    }

    pub fn get(&self) -> Cell {
        unpack(self.0.load(Ordering::Relaxed))
    }
}

fn pack(cell: Cell) -> u64 {
    (u64::from(cell.row as u32) << 32) | u64::from(cell.col as u32)
}

fn unpack(bits: u64) -> Cell {
    Cell::new((bits >> 32) as u32 as i32, bits as u32 as i32)
}

/// Derive a deterministic seed for a given session or episode index.
pub fn episode_seed(base_seed: u64, episode_index: usize) -> u64 {
    // FNV-1a-inspired mixing for deterministic, well-distributed seeds
    let mut hash = base_seed ^ 0x517cc1b727220a95;
    let index = episode_index as u64;
    hash = hash.wrapping_mul(0x100000001b3);
    hash ^= index;
    hash = hash.wrapping_mul(0x100000001b3);
    hash ^= index >> 32;
    hash
}

/// RNG for one session: seeded when a base seed is configured, otherwise from
/// the OS.
pub fn session_rng(seed: Option<u64>, session_index: u64) -> StdRng {
    match seed {
        Some(base) => StdRng::seed_from_u64(episode_seed(base, session_index as usize)),
        None => StdRng::from_os_rng(),
    }
}

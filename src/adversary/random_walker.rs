use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;

use crate::grid::Cell;

use super::Scene;

/// Steps to a uniformly chosen free neighbour; stays put when boxed in.
#[derive(Debug)]
pub struct RandomWalker {
    rng: StdRng,
}

impl RandomWalker {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        RandomWalker { rng }
    }

    pub(super) fn next_cell(&mut self, position: Cell, scene: &Scene<'_>) -> Cell {
        let options: Vec<Cell> = scene.free_neighbors(position).collect();
        options.choose(&mut self.rng).copied().unwrap_or(position)
    }
}

impl Default for RandomWalker {
    fn default() -> Self {
        Self::new(None)
    }
}

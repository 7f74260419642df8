use std::sync::Arc;

use crate::grid::{Action, Cell};
use crate::training::session::LivePosition;

/// Reward for one transition `prev --action--> next` while chasing `target`.
pub trait RewardFn: Send + Sync {
    fn reward(&self, prev: Cell, action: Action, next: Cell, target: Cell) -> f64;
}

impl<F> RewardFn for F
where
    F: Fn(Cell, Action, Cell, Cell) -> f64 + Send + Sync,
{
    fn reward(&self, prev: Cell, action: Action, next: Cell, target: Cell) -> f64 {
        self(prev, action, next, target)
    }
}

/// Distance-shaped reward shared by both roles.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ShapedReward {
    /// Charged on every step, including bumps into walls.
    pub step_penalty: f64,
    /// Paid per unit of Manhattan distance closed towards the target.
    pub progress_reward: f64,
    /// Extra charge when the step leaves the distance unchanged or larger.
    pub regress_penalty: f64,
    /// Paid on reaching the target.
    pub arrival_reward: f64,
}

impl Default for ShapedReward {
    fn default() -> Self {
        ShapedReward {
            step_penalty: -1.0,
            progress_reward: 2.0,
            regress_penalty: -3.0,
            arrival_reward: 100.0,
        }
    }
}

impl RewardFn for ShapedReward {
    fn reward(&self, prev: Cell, _action: Action, next: Cell, target: Cell) -> f64 {
        let before = prev.manhattan(target) as f64;
        let after = next.manhattan(target) as f64;
        let mut reward = self.step_penalty;
        if after < before {
            reward += self.progress_reward * (before - after);
        } else {
            reward += self.regress_penalty;
        }
        if next == target {
            reward += self.arrival_reward;
        }
        reward
    }
}

/// Where the training target comes from.
#[derive(Debug, Clone)]
pub enum Target {
    /// A fixed cell: the goal, for the navigator.
    Fixed(Cell),
    /// The opponent's live position, re-read at the start of every episode.
    Tracked(LivePosition),
}

impl Target {
    pub fn resolve(&self) -> Cell {
        match self {
            Target::Fixed(cell) => *cell,
            Target::Tracked(live) => live.get(),
        }
    }
}

/// What a Q-learning session optimises: a target and a reward function.
/// The same agent algorithm serves both roles.
#[derive(Clone)]
pub struct Objective {
    pub target: Target,
    pub reward: Arc<dyn RewardFn>,
}

impl Objective {
    /// Reach a fixed goal.
    pub fn navigator(goal: Cell, reward: ShapedReward) -> Self {
        Self::with_reward(Target::Fixed(goal), Arc::new(reward))
    }

    /// Chase the opponent's live position.
    pub fn adversary(quarry: LivePosition, reward: ShapedReward) -> Self {
        Self::with_reward(Target::Tracked(quarry), Arc::new(reward))
    }

    /// Any target with a custom reward function.
    pub fn with_reward(target: Target, reward: Arc<dyn RewardFn>) -> Self {
        Objective { target, reward }
    }
}

impl std::fmt::Debug for Objective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Objective")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

//! Adversary behaviours layered on a shared move-ratio gate.
//!
//! Every adversary is an [`Adversary`]: a position, a [`MoveGate`] and one of
//! four closed [`Behavior`] variants. The gate is consulted before the
//! behaviour, so all variants share the same speed disadvantage.

mod blocker;
mod gate;
mod patroller;
mod pursuer;
mod random_walker;
mod squad;

pub use blocker::Blocker;
pub use gate::MoveGate;
pub use patroller::Patroller;
pub use pursuer::Pursuer;
pub use random_walker::RandomWalker;
pub use squad::Squad;

use crate::ai::QLearningAgent;
use crate::grid::{Action, Cell, GridEnvironment};
use crate::training::session::episode_seed;

/// Adversary tuning, shared by the whole roster.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AdversaryConfig {
    /// Navigator steps per adversary step.
    pub move_ratio: u32,
    /// Pursuers never close to within this Manhattan distance.
    pub standoff_distance: u32,
    /// Half-width of a patroller's square.
    pub patrol_radius: u32,
    /// Navigator steps a blocker predicts ahead.
    pub blocker_lookahead: u32,
    /// How far from the predicted navigator cell towards the goal a blocker
    /// aims, as a fraction of that segment.
    pub interception_bias: f64,
    pub roster: Vec<RosterEntry>,
    pub seed: Option<u64>,
}

impl Default for AdversaryConfig {
    fn default() -> Self {
        AdversaryConfig {
            move_ratio: 2,
            standoff_distance: 3,
            patrol_radius: 3,
            blocker_lookahead: 3,
            interception_bias: 0.3,
            roster: vec![
                RosterEntry::new(AdversaryKind::Pursuer, Cell::new(5, 35)),
                RosterEntry::new(AdversaryKind::Blocker, Cell::new(25, 5)),
                RosterEntry::new(AdversaryKind::Patroller, Cell::new(27, 20)),
                RosterEntry::new(AdversaryKind::RandomWalker, Cell::new(15, 37)),
            ],
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdversaryKind {
    Pursuer,
    Blocker,
    Patroller,
    RandomWalker,
}

impl AdversaryKind {
    pub fn name(self) -> &'static str {
        match self {
            AdversaryKind::Pursuer => "pursuer",
            AdversaryKind::Blocker => "blocker",
            AdversaryKind::Patroller => "patroller",
            AdversaryKind::RandomWalker => "random walker",
        }
    }
}

impl std::fmt::Display for AdversaryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One configured adversary.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RosterEntry {
    pub kind: AdversaryKind,
    pub position: Cell,
}

impl RosterEntry {
    pub fn new(kind: AdversaryKind, position: Cell) -> Self {
        RosterEntry { kind, position }
    }
}

/// What an adversary can see on the tick it moves.
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a> {
    pub env: &'a GridEnvironment,
    pub navigator: Cell,
    /// Direction of the navigator's most recent step.
    pub heading: Option<Action>,
    /// The navigator's planned route, when it is visible.
    pub route: Option<&'a [Cell]>,
    /// Cells held by other adversaries.
    pub occupied: &'a [Cell],
}

impl<'a> Scene<'a> {
    pub fn new(env: &'a GridEnvironment, navigator: Cell) -> Self {
        Scene {
            env,
            navigator,
            heading: None,
            route: None,
            occupied: &[],
        }
    }

    pub fn with_heading(mut self, heading: Option<Action>) -> Self {
        self.heading = heading;
        self
    }

    pub fn with_route(mut self, route: Option<&'a [Cell]>) -> Self {
        self.route = route;
        self
    }

    pub fn with_occupied(mut self, occupied: &'a [Cell]) -> Self {
        self.occupied = occupied;
        self
    }

    /// Valid and not held by another adversary.
    pub fn is_free(&self, cell: Cell) -> bool {
        self.env.is_valid(cell) && !self.occupied.contains(&cell)
    }

    pub fn is_occupied(&self, cell: Cell) -> bool {
        self.occupied.contains(&cell)
    }

    /// Free cardinal neighbours of `cell`, in [`Action::ALL`] order.
    pub fn free_neighbors(&self, cell: Cell) -> impl Iterator<Item = Cell> + '_ {
        self.env
            .neighbors(cell)
            .filter(move |&n| !self.occupied.contains(&n))
    }

    /// Next cell on a unit-cost shortest path that avoids other adversaries.
    pub fn step_towards(&self, from: Cell, to: Cell) -> Option<Cell> {
        crate::grid::shortest_path(self.env, from, to, |c| self.is_occupied(c))
            .and_then(|path| path.get(1).copied())
    }
}

#[derive(Debug)]
pub enum Behavior {
    Pursuer(Pursuer),
    Blocker(Blocker),
    Patroller(Patroller),
    RandomWalker(RandomWalker),
}

impl Behavior {
    pub fn kind(&self) -> AdversaryKind {
        match self {
            Behavior::Pursuer(_) => AdversaryKind::Pursuer,
            Behavior::Blocker(_) => AdversaryKind::Blocker,
            Behavior::Patroller(_) => AdversaryKind::Patroller,
            Behavior::RandomWalker(_) => AdversaryKind::RandomWalker,
        }
    }

    fn next_cell(&mut self, position: Cell, scene: &Scene<'_>) -> Cell {
        match self {
            Behavior::Pursuer(p) => p.next_cell(position, scene),
            Behavior::Blocker(b) => b.next_cell(position, scene),
            Behavior::Patroller(p) => p.next_cell(position, scene),
            Behavior::RandomWalker(r) => r.next_cell(position, scene),
        }
    }
}

/// Position bookkeeping plus the gate, wrapped around one behaviour.
#[derive(Debug)]
pub struct Adversary {
    position: Cell,
    gate: MoveGate,
    behavior: Behavior,
}

impl Adversary {
    pub fn new(position: Cell, move_ratio: u32, behavior: Behavior) -> Self {
        Adversary {
            position,
            gate: MoveGate::new(move_ratio),
            behavior,
        }
    }

    /// Build an adversary of `kind` with the shared tuning. `index` decorrelates
    /// the random walkers of a seeded roster.
    pub fn from_kind(kind: AdversaryKind, position: Cell, config: &AdversaryConfig, index: usize) -> Self {
        let behavior = match kind {
            AdversaryKind::Pursuer => Behavior::Pursuer(Pursuer::new(config.standoff_distance)),
            AdversaryKind::Blocker => Behavior::Blocker(Blocker::new(
                config.blocker_lookahead,
                config.interception_bias,
            )),
            AdversaryKind::Patroller => {
                Behavior::Patroller(Patroller::new(position, config.patrol_radius))
            }
            AdversaryKind::RandomWalker => Behavior::RandomWalker(RandomWalker::new(
                config.seed.map(|seed| episode_seed(seed, index)),
            )),
        };
        Self::new(position, config.move_ratio, behavior)
    }

    pub fn position(&self) -> Cell {
        self.position
    }

    pub fn kind(&self) -> AdversaryKind {
        self.behavior.kind()
    }

    pub fn gate(&self) -> &MoveGate {
        &self.gate
    }

    pub fn behavior(&self) -> &Behavior {
        &self.behavior
    }

    /// Hand a trained adversary policy to a pursuer. Other kinds ignore it
    /// and return `false`.
    pub fn attach_policy(&mut self, policy: QLearningAgent) -> bool {
        match &mut self.behavior {
            Behavior::Pursuer(p) => {
                p.set_policy(policy);
                true
            }
            _ => false,
        }
    }

    /// Advance the gate; see [`MoveGate::can_move`].
    pub fn can_move(&mut self) -> bool {
        self.gate.can_move()
    }

    /// Take this tick's move and return the new position.
    ///
    /// Counts one navigator step on the gate first; while the gate is closed
    /// the current position is returned unchanged. A behaviour that proposes
    /// anything other than a free cell at most one step away stays put.
    pub fn get_next_move(&mut self, scene: &Scene<'_>) -> Cell {
        if !self.can_move() {
            return self.position;
        }
        let proposed = self.behavior.next_cell(self.position, scene);
        let legal = proposed == self.position
            || (proposed.is_adjacent(self.position) && scene.is_free(proposed));
        if legal {
            self.position = proposed;
        } else {
            tracing::debug!(kind = %self.kind(), at = %self.position, %proposed, "discarded illegal adversary move");
        }
        self.position
    }
}

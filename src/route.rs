//! Route following for the navigator: the current route, checks that it is
//! still safe to walk, and a bounded budget for recomputing it.

use crate::ai::HeatMapPathfinder;
use crate::grid::{shortest_path, Cell, GridEnvironment};

/// Route safety tuning.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// An adversary within this Manhattan distance of a remaining route cell
    /// threatens the route.
    pub safe_distance: u32,
    /// Recomputations allowed before the route is given up.
    pub max_recalculations: u32,
}

impl Default for RouteConfig {
    fn default() -> Self {
        RouteConfig {
            safe_distance: 1,
            max_recalculations: 3,
        }
    }
}

/// Result of checking the current route against the live scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    Valid,
    /// No route is held.
    Missing,
    /// The navigator is more than one step from every route cell.
    OffRoute,
    /// The first remaining route cell that is now an obstacle or off the grid.
    Blocked(Cell),
    /// The first remaining route cell an adversary is too close to.
    Threatened(Cell),
}

impl RouteStatus {
    pub fn is_valid(self) -> bool {
        self == RouteStatus::Valid
    }
}

/// Where a recomputed route came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    /// The heat-map route, clear of every adversary.
    HeatMap,
    /// Unit-cost search around the cells adversaries are too close to.
    SafeFallback,
}

#[derive(Debug, Clone)]
pub struct RouteTracker {
    route: Vec<Cell>,
    config: RouteConfig,
    recalculations: u32,
}

impl RouteTracker {
    pub fn new(config: RouteConfig) -> Self {
        RouteTracker {
            route: Vec::new(),
            config,
            recalculations: 0,
        }
    }

    pub fn config(&self) -> &RouteConfig {
        &self.config
    }

    pub fn route(&self) -> &[Cell] {
        &self.route
    }

    pub fn has_route(&self) -> bool {
        !self.route.is_empty()
    }

    /// Swap in a new route. `None` (no route found) clears it.
    pub fn replace(&mut self, route: Option<Vec<Cell>>) {
        self.route = route.unwrap_or_default();
    }

    pub fn clear(&mut self) {
        self.route.clear();
    }

    pub fn recalculations(&self) -> u32 {
        self.recalculations
    }

    /// Count one recomputation. Returns `false` once the budget is spent, in
    /// which case the caller should give up rather than recompute.
    pub fn note_recalculation(&mut self) -> bool {
        self.recalculations += 1;
        if self.recalculations > self.config.max_recalculations {
            tracing::warn!(
                budget = self.config.max_recalculations,
                "route recalculation budget exhausted"
            );
            return false;
        }
        tracing::debug!(
            attempt = self.recalculations,
            budget = self.config.max_recalculations,
            "recalculating route"
        );
        true
    }

    pub fn reset_budget(&mut self) {
        self.recalculations = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.recalculations > self.config.max_recalculations
    }

    /// Index of the route cell the navigator is on, or of the nearest one when
    /// it is exactly one step off. Ties go to the earlier cell.
    fn locate(&self, navigator: Cell) -> Option<usize> {
        if let Some(i) = self.route.iter().position(|&c| c == navigator) {
            return Some(i);
        }
        self.route
            .iter()
            .enumerate()
            .min_by_key(|&(i, c)| (c.manhattan(navigator), i))
            .filter(|(_, c)| c.manhattan(navigator) <= 1)
            .map(|(i, _)| i)
    }

    /// Route cells from the navigator's position onwards.
    pub fn remaining(&self, navigator: Cell) -> &[Cell] {
        match self.locate(navigator) {
            Some(i) => &self.route[i..],
            None => &[],
        }
    }

    fn near_adversary(&self, cell: Cell, adversaries: &[Cell]) -> bool {
        adversaries
            .iter()
            .any(|a| a.manhattan(cell) <= self.config.safe_distance)
    }

    /// First cell of `route` an adversary is too close to. The navigator's
    /// own cell is never counted.
    pub fn first_threat(&self, route: &[Cell], navigator: Cell, adversaries: &[Cell]) -> Option<Cell> {
        route
            .iter()
            .copied()
            .find(|&c| c != navigator && self.near_adversary(c, adversaries))
    }

    pub fn validate(&self, navigator: Cell, env: &GridEnvironment, adversaries: &[Cell]) -> RouteStatus {
        if self.route.is_empty() {
            return RouteStatus::Missing;
        }
        let Some(index) = self.locate(navigator) else {
            return RouteStatus::OffRoute;
        };
        let remaining = &self.route[index..];
        if let Some(&cell) = remaining.iter().find(|&&c| !env.is_valid(c)) {
            return RouteStatus::Blocked(cell);
        }
        match self.first_threat(remaining, navigator, adversaries) {
            Some(cell) => RouteStatus::Threatened(cell),
            None => RouteStatus::Valid,
        }
    }

    /// Replace the route with a fresh one from the navigator to the goal.
    ///
    /// The heat-map route is kept when no adversary is within
    /// `safe_distance` of it. Otherwise a unit-cost search that avoids those
    /// cells is tried. `None` means neither produced a route and the route
    /// is cleared.
    pub fn recompute(
        &mut self,
        pathfinder: &HeatMapPathfinder,
        env: &GridEnvironment,
        adversaries: &[Cell],
    ) -> Option<RouteSource> {
        let start = env.navigator();
        let goal = env.goal();
        if let Some(route) = pathfinder.find_path(env, start, goal) {
            match self.first_threat(&route, start, adversaries) {
                None => {
                    self.route = route;
                    return Some(RouteSource::HeatMap);
                }
                Some(cell) => tracing::debug!(%cell, "heat-map route threatened; trying safe search"),
            }
        }
        let safe = shortest_path(env, start, goal, |c| c != start && self.near_adversary(c, adversaries));
        let source = safe.as_ref().map(|_| RouteSource::SafeFallback);
        self.replace(safe);
        source
    }

    /// Route cells walked so far, when the navigator stands on the route
    /// past its first cell.
    pub fn walked_prefix(&self, navigator: Cell) -> Option<Vec<Cell>> {
        let index = self.route.iter().position(|&c| c == navigator)?;
        (index > 0).then(|| self.route[..=index].to_vec())
    }

    /// The cell the navigator should step to next. `None` at the end of the
    /// route or when off it.
    pub fn next_step(&self, navigator: Cell) -> Option<Cell> {
        let index = self.locate(navigator)?;
        if self.route[index] == navigator {
            self.route.get(index + 1).copied()
        } else {
            Some(self.route[index])
        }
    }
}

impl Default for RouteTracker {
    fn default() -> Self {
        Self::new(RouteConfig::default())
    }
}

/// Partial routes kept for rebalancing; the oldest is dropped first.
const MAX_PARTIAL_PATHS: usize = 32;

/// Route outcomes fed back into the heat map.
///
/// Successes are held at no less than twice the failures: once failures
/// outweigh that, the partial routes walked before earlier invalidations
/// are reinforced, two applications each, until the ratio is restored.
#[derive(Debug, Clone, Default)]
pub struct ReinforcementLedger {
    successes: u32,
    failures: u32,
    partial_paths: Vec<Vec<Cell>>,
}

impl ReinforcementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn successes(&self) -> u32 {
        self.successes
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn partial_paths(&self) -> &[Vec<Cell>] {
        &self.partial_paths
    }

    pub fn record_success(&mut self) {
        self.successes += 1;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Keep a walked prefix of a dropped route. Single cells are ignored.
    pub fn record_partial(&mut self, path: Vec<Cell>) {
        if path.len() < 2 {
            return;
        }
        if self.partial_paths.len() == MAX_PARTIAL_PATHS {
            self.partial_paths.remove(0);
        }
        self.partial_paths.push(path);
    }

    pub fn needs_reinforcement(&self) -> bool {
        self.failures * 2 > self.successes
    }

    /// Deposit `path` on the heat map twice. `false` when a training session
    /// owns the map; nothing is deposited then.
    pub fn apply_twice(pathfinder: &HeatMapPathfinder, path: &[Cell]) -> bool {
        for _ in 0..2 {
            if let Err(err) = pathfinder.reinforce(path) {
                tracing::debug!(%err, "reinforcement skipped");
                return false;
            }
        }
        true
    }

    /// Reinforce a completed route, counting two successes.
    pub fn reinforce_success(&mut self, pathfinder: &HeatMapPathfinder, path: &[Cell]) -> bool {
        let applied = Self::apply_twice(pathfinder, path);
        if applied {
            self.successes += 2;
        }
        applied
    }

    /// Restore the success ratio from the kept partial routes. Returns how
    /// many were applied.
    pub fn rebalance(&mut self, pathfinder: &HeatMapPathfinder) -> usize {
        let mut applied = 0;
        for path in &self.partial_paths {
            if !self.needs_reinforcement() {
                break;
            }
            if !Self::apply_twice(pathfinder, path) {
                break;
            }
            self.successes += 2;
            applied += 1;
        }
        if applied > 0 {
            tracing::debug!(
                successes = self.successes,
                failures = self.failures,
                applied,
                "rebalanced heat-map reinforcement"
            );
        }
        applied
    }
}

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::Rng;

use crate::ai::analysis::{self, EnvironmentReport};
use crate::ai::heat_map::HeatMap;
use crate::error::TrainingError;
use crate::grid::search::weighted_astar;
use crate::grid::{Cell, GridEnvironment};
use crate::training::dashboard_msg::MetricsSnapshot;
use crate::training::metrics::{EpisodeResult, TimingMetrics, TrainingMetrics};
use crate::training::session::{session_rng, CancelToken, SessionLock};

const TABLE_NAME: &str = "heat map";

/// Walk preference per unit of Manhattan distance to the goal.
const GOAL_PULL: f64 = 10.0;
/// Walk penalty for stepping onto an adversary.
const CONTACT_PENALTY: f64 = 1000.0;
/// Scale of the `1 / distance` penalty inside the danger radius.
const DANGER_SCALE: f64 = 500.0;
/// Walk preference per unit of raw heat already on a cell.
const HEAT_FOLLOW: f64 = 0.1;
/// A* expansion budget as a multiple of the cell count.
const EXPANSION_FACTOR: usize = 5;

/// Heat-map training and search parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HeatMapConfig {
    /// Walks per explicit training call.
    pub iterations: usize,
    /// Walks run when `find_path` meets an empty map.
    pub lazy_iterations: usize,
    /// Adversaries closer than this (Manhattan) penalise a walk step.
    pub danger_radius: u32,
    /// Probability of a uniform random step during a walk.
    pub exploration_rate: f64,
    /// Heat deposited on the first cell of a perfectly efficient walk.
    pub success_bonus: f64,
    pub base_step_cost: f64,
    /// Cost discount at peak heat.
    pub heat_weight: f64,
    pub min_step_cost: f64,
    pub report_interval: usize,
    pub seed: Option<u64>,
}

impl Default for HeatMapConfig {
    fn default() -> Self {
        HeatMapConfig {
            iterations: 1000,
            lazy_iterations: 100,
            danger_radius: 3,
            exploration_rate: 0.2,
            success_bonus: 10.0,
            base_step_cost: 1.0,
            heat_weight: 0.15,
            min_step_cost: 0.05,
            report_interval: 100,
            seed: None,
        }
    }
}

impl HeatMapConfig {
    /// Cost of traversing a cell with the given normalized heat.
    pub fn step_cost(&self, normalized_heat: f64) -> f64 {
        (self.base_step_cost - self.heat_weight * normalized_heat).max(self.min_step_cost)
    }

    /// Lowest cost any single step can have; scales the heuristic.
    fn cheapest_step(&self) -> f64 {
        self.step_cost(1.0).min(self.base_step_cost)
    }
}

/// Outcome of a heat-map training call.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatTrainingSummary {
    pub walks_completed: usize,
    pub successful_walks: usize,
    /// Shortest walk that reached the goal, if any.
    pub best_walk: Option<Vec<Cell>>,
    pub cancelled: bool,
}

/// Learns a heat surface from biased random walks and extracts routes with
/// A* over it.
///
/// Clones share one heat map. Training writes it; `find_path` and
/// `analyze_environment` read whatever is there.
#[derive(Clone)]
pub struct HeatMapPathfinder {
    heat: Arc<RwLock<HeatMap>>,
    config: HeatMapConfig,
    session: SessionLock,
}

impl HeatMapPathfinder {
    pub fn new(width: usize, height: usize, config: HeatMapConfig) -> Self {
        HeatMapPathfinder {
            heat: Arc::new(RwLock::new(HeatMap::new(width, height))),
            config,
            session: SessionLock::new(),
        }
    }

    pub fn for_environment(env: &GridEnvironment, config: HeatMapConfig) -> Self {
        Self::new(env.width(), env.height(), config)
    }

    pub fn config(&self) -> &HeatMapConfig {
        &self.config
    }

    pub fn is_training(&self) -> bool {
        self.session.is_active()
    }

    fn read(&self) -> RwLockReadGuard<'_, HeatMap> {
        self.heat.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HeatMap> {
        self.heat.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> HeatMap {
        self.read().clone()
    }

    pub fn is_trained(&self) -> bool {
        !self.read().is_empty()
    }

    /// Clear the heat map. Fails while a session is active.
    pub fn reset(&self) -> Result<(), TrainingError> {
        let _guard = self.session.acquire(TABLE_NAME)?;
        self.write().reset();
        Ok(())
    }

    /// Rebuild the heat map from `iterations` walks from `start` to `goal`.
    ///
    /// The previous surface is cleared first. Steps near any of `adversaries`
    /// are penalised, not forbidden. Walks that hit the step cap
    /// (`width * height`) deposit nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn train(
        &self,
        env: &GridEnvironment,
        start: Cell,
        goal: Cell,
        iterations: usize,
        adversaries: &[Cell],
        progress: &mut dyn FnMut(&MetricsSnapshot),
        cancel: &CancelToken,
    ) -> Result<HeatTrainingSummary, TrainingError> {
        let guard = self.session.acquire(TABLE_NAME)?;
        let mut rng = session_rng(self.config.seed, guard.index());
        let report_every = self.config.report_interval.max(1);
        let mut metrics = TrainingMetrics::with_capacity(report_every);
        let mut timing = TimingMetrics::new();
        let mut summary = HeatTrainingSummary {
            walks_completed: 0,
            successful_walks: 0,
            best_walk: None,
            cancelled: false,
        };

        tracing::info!(%start, %goal, iterations, adversaries = adversaries.len(), "starting heat-map session");
        self.write().reset();

        for walk in 0..iterations {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let started = Instant::now();
            let path = {
                let heat = self.read();
                self.walk(env, &heat, start, goal, adversaries, &mut rng)
            };
            let reached = path.last() == Some(&goal);
            if reached {
                summary.successful_walks += 1;
                deposit(&mut self.write(), &path, self.config.success_bonus);
                if summary
                    .best_walk
                    .as_ref()
                    .map_or(true, |best| path.len() < best.len())
                {
                    summary.best_walk = Some(path.clone());
                }
            }
            timing.record_iteration_time(started.elapsed());
            metrics.record_episode(EpisodeResult {
                reward: 0.0,
                steps: path.len() - 1,
                reached,
            });
            summary.walks_completed = walk + 1;

            if summary.walks_completed % report_every == 0 || summary.walks_completed == iterations {
                let snapshot = MetricsSnapshot {
                    iteration: summary.walks_completed,
                    total_iterations: iterations,
                    epsilon: None,
                    episode_reward: None,
                    success_rate: metrics.success_rate(report_every),
                    avg_length: metrics.average_length(report_every),
                    best_length: metrics.best_length(),
                    iterations_per_sec: timing.iterations_per_sec(),
                };
                tracing::debug!(walk = summary.walks_completed, best = ?snapshot.best_length, "heat-map progress");
                progress(&snapshot);
                timing.reset_window();
            }
        }

        tracing::info!(
            completed = summary.walks_completed,
            successes = summary.successful_walks,
            cancelled = summary.cancelled,
            "heat-map session finished"
        );
        Ok(summary)
    }

    /// One biased walk. Returns every visited cell, starting with `start`.
    fn walk(
        &self,
        env: &GridEnvironment,
        heat: &HeatMap,
        start: Cell,
        goal: Cell,
        adversaries: &[Cell],
        rng: &mut StdRng,
    ) -> Vec<Cell> {
        let mut path = vec![start];
        let mut current = start;

        for _ in 0..env.cell_count() {
            if current == goal {
                break;
            }
            let neighbors: Vec<Cell> = env.neighbors(current).collect();
            if neighbors.is_empty() {
                break;
            }
            current = if neighbors.len() > 1 && rng.random::<f64>() < self.config.exploration_rate {
                neighbors[rng.random_range(0..neighbors.len())]
            } else {
                let mut best = neighbors[0];
                let mut best_weight = self.walk_weight(heat, best, goal, adversaries);
                for &candidate in &neighbors[1..] {
                    let weight = self.walk_weight(heat, candidate, goal, adversaries);
                    if weight > best_weight {
                        best = candidate;
                        best_weight = weight;
                    }
                }
                best
            };
            path.push(current);
        }
        path
    }

    fn walk_weight(&self, heat: &HeatMap, cell: Cell, goal: Cell, adversaries: &[Cell]) -> f64 {
        let mut weight = -GOAL_PULL * cell.manhattan(goal) as f64;
        for &adversary in adversaries {
            let d = cell.manhattan(adversary);
            if d == 0 {
                weight -= CONTACT_PENALTY;
            } else if d < self.config.danger_radius {
                weight -= DANGER_SCALE / (d as f64 + 0.1);
            }
        }
        weight + HEAT_FOLLOW * heat.get(cell)
    }

    /// Deposit heat along a realized route, e.g. one the navigator actually
    /// completed. Fails while a session is active.
    pub fn reinforce(&self, path: &[Cell]) -> Result<(), TrainingError> {
        let _guard = self.session.acquire(TABLE_NAME)?;
        deposit(&mut self.write(), path, self.config.success_bonus);
        Ok(())
    }

    /// Route from `start` to `goal` over the current heat surface.
    ///
    /// Adjacent cells short-circuit to a two-cell path. An empty map is
    /// trained for `lazy_iterations` walks first, unless a session already
    /// owns it. `None` means no route exists.
    pub fn find_path(&self, env: &GridEnvironment, start: Cell, goal: Cell) -> Option<Vec<Cell>> {
        if !env.is_valid(start) || !env.is_valid(goal) {
            return None;
        }
        if start == goal {
            return Some(vec![start]);
        }
        if start.is_adjacent(goal) {
            return Some(vec![start, goal]);
        }

        if self.read().is_empty() && !self.session.is_active() {
            tracing::debug!(%start, %goal, "heat map empty; running lazy training");
            if let Err(err) = self.train(
                env,
                start,
                goal,
                self.config.lazy_iterations,
                &[],
                &mut |_| {},
                &CancelToken::new(),
            ) {
                tracing::debug!(%err, "lazy training skipped");
            }
        }

        let heat = self.read();
        let path = self.search(&heat, env, start, goal);
        if path.is_none() {
            tracing::debug!(%start, %goal, "no heat-map route");
        }
        path
    }

    fn search(&self, heat: &HeatMap, env: &GridEnvironment, start: Cell, goal: Cell) -> Option<Vec<Cell>> {
        let peak = heat.peak();
        let cheapest = self.config.cheapest_step();
        weighted_astar(
            env,
            start,
            goal,
            |_, to| {
                let norm = if peak > 0.0 { heat.get(to) / peak } else { 0.0 };
                self.config.step_cost(norm)
            },
            |cell| f64::from(cell.manhattan(goal)) * cheapest,
            |_| false,
            env.cell_count() * EXPANSION_FACTOR,
        )
    }

    /// Chokepoints, safe zones and suggested adversary cells derived from the
    /// current heat surface. `None` while the map is empty. Never trains.
    pub fn analyze_environment(
        &self,
        env: &GridEnvironment,
        start: Cell,
        goal: Cell,
        adversary_count: usize,
    ) -> Option<EnvironmentReport> {
        let heat = self.read();
        if heat.is_empty() {
            return None;
        }
        let route = self.search(&heat, env, start, goal);
        Some(analysis::analyze(
            &heat,
            env,
            start,
            goal,
            route.as_deref(),
            adversary_count,
        ))
    }
}

/// Cells earlier on a path (closer to where it started) get more, and
/// longer paths get proportionally less.
fn deposit(heat: &mut HeatMap, path: &[Cell], bonus: f64) {
    let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
        return;
    };
    let len = path.len() as f64;
    let efficiency = ((f64::from(first.manhattan(last)) + 1.0) / len).min(1.0);
    for (i, &cell) in path.iter().enumerate() {
        heat.add(cell, bonus * efficiency * (len - i as f64) / len);
    }
}

impl std::fmt::Debug for HeatMapPathfinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeatMapPathfinder")
            .field("config", &self.config)
            .field("training", &self.is_training())
            .finish_non_exhaustive()
    }
}

//! The pursuit loop: the navigator walks its route one cell per tick, the
//! squad answers each accepted move, and routes are revalidated, recomputed
//! and fed back into the heat map as the scene changes.

use std::time::Duration;

use crate::adversary::{AdversaryKind, Squad};
use crate::ai::{HeatMapPathfinder, QLearningAgent, ShapedReward};
use crate::config::AppConfig;
use crate::error::TrainingError;
use crate::grid::{Cell, GridEnvironment};
use crate::route::{ReinforcementLedger, RouteSource, RouteStatus, RouteTracker};
use crate::training::{LivePosition, MetricsSnapshot, Trainee, TrainingOrchestrator, TrainingUpdate};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Arrived,
    Captured,
    BudgetExhausted,
    /// Set by the caller; [`Simulation::tick`] never returns it.
    TickLimit,
}

pub struct Simulation {
    env: GridEnvironment,
    squad: Squad,
    pathfinder: HeatMapPathfinder,
    adversary_policy: QLearningAgent,
    tracker: RouteTracker,
    ledger: ReinforcementLedger,
    orchestrator: TrainingOrchestrator,
    quarry: LivePosition,
    heat_iterations: usize,
    walked: Vec<Cell>,
}

impl Simulation {
    pub fn new(env: GridEnvironment, squad: Squad, config: &AppConfig) -> Self {
        Simulation {
            pathfinder: HeatMapPathfinder::for_environment(&env, config.heat_map.clone()),
            adversary_policy: QLearningAgent::for_environment(&env, config.q_learning.clone()),
            tracker: RouteTracker::new(config.route),
            ledger: ReinforcementLedger::new(),
            orchestrator: TrainingOrchestrator::new(),
            quarry: LivePosition::new(env.navigator()),
            heat_iterations: config.training.heat_iterations,
            walked: vec![env.navigator()],
            squad,
            env,
        }
    }

    pub fn env(&self) -> &GridEnvironment {
        &self.env
    }

    pub fn squad(&self) -> &Squad {
        &self.squad
    }

    pub fn tracker(&self) -> &RouteTracker {
        &self.tracker
    }

    pub fn ledger(&self) -> &ReinforcementLedger {
        &self.ledger
    }

    /// Cells the navigator has stood on, starting with its initial cell.
    pub fn walked(&self) -> &[Cell] {
        &self.walked
    }

    /// Train the adversary policy in the background from the first
    /// pursuer's cell, chasing the navigator's live position. `Ok(false)`
    /// when the squad has no pursuer.
    pub fn start_adversary_policy(&mut self, reward: ShapedReward, episodes: usize) -> Result<bool, TrainingError> {
        let Some(start) = self
            .squad
            .iter()
            .find(|a| a.kind() == AdversaryKind::Pursuer)
            .map(|a| a.position())
        else {
            return Ok(false);
        };
        self.orchestrator.start_adversary_training(
            &self.adversary_policy,
            self.env.clone(),
            start,
            self.quarry.clone(),
            reward,
            episodes,
        )?;
        Ok(true)
    }

    /// Retrain the heat map in the background around the live adversary
    /// positions. A session already in flight is left to finish.
    pub fn retrain_heat_map(&mut self) {
        if self.orchestrator.is_running(Trainee::HeatMap) {
            return;
        }
        let started = self.orchestrator.start_heat_map(
            &self.pathfinder,
            self.env.clone(),
            self.env.navigator(),
            self.env.goal(),
            self.heat_iterations,
            self.squad.positions(),
        );
        if let Err(err) = started {
            tracing::warn!(%err, "could not start heat-map retraining");
        }
    }

    /// Block until the heat-map session finishes, reporting its progress,
    /// then compute the first route.
    pub fn wait_for_heat_map(&mut self, mut progress: impl FnMut(&MetricsSnapshot)) -> bool {
        while self.orchestrator.is_running(Trainee::HeatMap) {
            std::thread::sleep(POLL_INTERVAL);
            for update in self.orchestrator.poll() {
                match update {
                    TrainingUpdate::Metrics(Trainee::HeatMap, snap) => progress(&snap),
                    TrainingUpdate::Failed(trainee, message) => {
                        tracing::warn!(trainee = trainee.name(), %message, "training failed");
                    }
                    _ => {}
                }
            }
        }
        self.recompute_route()
    }

    /// Replace the route, keeping clear of the adversaries, and feed the
    /// outcome into the ledger. `false` when no safe route exists.
    pub fn recompute_route(&mut self) -> bool {
        let adversaries = self.squad.positions();
        let found = match self.tracker.recompute(&self.pathfinder, &self.env, &adversaries) {
            Some(source) => {
                tracing::debug!(
                    ?source,
                    moves = self.tracker.route().len().saturating_sub(1),
                    "new route"
                );
                self.ledger.record_success();
                if source == RouteSource::SafeFallback {
                    ReinforcementLedger::apply_twice(&self.pathfinder, self.tracker.route());
                }
                true
            }
            None => {
                tracing::info!(navigator = %self.env.navigator(), "no safe route; holding position");
                self.ledger.record_failure();
                false
            }
        };
        self.ledger.rebalance(&self.pathfinder);
        found
    }

    fn drain_updates(&mut self) {
        for update in self.orchestrator.poll() {
            match update {
                TrainingUpdate::Finished(Trainee::HeatMap, outcome) if !outcome.cancelled => {
                    tracing::debug!("heat map retrained; refreshing route");
                    self.recompute_route();
                }
                TrainingUpdate::Finished(Trainee::AdversaryPolicy, outcome) if !outcome.cancelled => {
                    let pursuers = self.squad.attach_policy(&self.adversary_policy);
                    tracing::info!(pursuers, "adversary policy ready");
                }
                TrainingUpdate::Failed(trainee, message) => {
                    tracing::warn!(trainee = trainee.name(), %message, "training failed");
                }
                _ => {}
            }
        }
    }

    /// One navigator step followed by the adversaries' moves.
    ///
    /// The squad only moves when the navigator did: a held position leaves
    /// every gate counter untouched.
    pub fn tick(&mut self) -> Option<Ending> {
        self.drain_updates();

        let navigator = self.env.navigator();
        let status = self
            .tracker
            .validate(navigator, &self.env, &self.squad.positions());
        if !status.is_valid() {
            tracing::debug!(?status, %navigator, "route rejected");
            if let Some(partial) = self.tracker.walked_prefix(navigator) {
                self.ledger.record_partial(partial);
            }
            if !self.tracker.note_recalculation() {
                return Some(Ending::BudgetExhausted);
            }
            self.recompute_route();
            if matches!(status, RouteStatus::Threatened(_)) {
                self.retrain_heat_map();
            }
        }

        let next = self.tracker.next_step(navigator)?;
        if self.squad.occupies(next) || !self.env.move_navigator(next) {
            return None;
        }
        let heading = navigator.direction_to(next);
        self.walked.push(next);
        self.quarry.set(next);

        if next == self.env.goal() {
            return Some(Ending::Arrived);
        }

        let route = self.tracker.remaining(next).to_vec();
        self.squad
            .advance(&self.env, next, heading, Some(route.as_slice()));
        if self.squad.captures(next) {
            self.ledger.record_failure();
            return Some(Ending::Captured);
        }
        None
    }

    /// Add or remove an obstacle while running. Cells an adversary holds
    /// cannot take one. Accepted edits reset the recalculation budget and
    /// recompute the route.
    pub fn set_obstacle(&mut self, cell: Cell, present: bool) -> bool {
        if present && self.squad.occupies(cell) {
            return false;
        }
        if !self.env.set_obstacle(cell, present) {
            return false;
        }
        self.after_edit();
        true
    }

    pub fn clear_obstacles(&mut self) {
        self.env.clear_obstacles();
        self.after_edit();
    }

    fn after_edit(&mut self) {
        self.tracker.reset_budget();
        self.recompute_route();
    }

    /// Stop background training. On arrival the walked route is reinforced.
    pub fn finish(&mut self, ending: Ending) {
        self.orchestrator.cancel_all();
        self.orchestrator.wait_all();
        if ending == Ending::Arrived && !self.ledger.reinforce_success(&self.pathfinder, &self.walked) {
            tracing::warn!("could not reinforce the walked route");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adversary::{Adversary, Behavior, Pursuer};

    fn config(heat_iterations: usize) -> AppConfig {
        let mut config = AppConfig::default();
        config.heat_map.seed = Some(7);
        config.training.heat_iterations = heat_iterations;
        config
    }

    fn squad_with_pursuer(env: &GridEnvironment, cell: Cell, move_ratio: u32) -> Squad {
        let mut squad = Squad::new();
        assert!(squad.place(
            Adversary::new(cell, move_ratio, Behavior::Pursuer(Pursuer::new(0))),
            env
        ));
        squad
    }

    fn pursuer(sim: &Simulation) -> &Adversary {
        sim.squad().iter().next().unwrap()
    }

    #[test]
    fn test_adversaries_hold_while_navigator_holds() {
        let mut env = GridEnvironment::new(6, 6, Cell::new(0, 0), Cell::new(5, 5)).unwrap();
        env.set_obstacle(Cell::new(4, 5), true);
        env.set_obstacle(Cell::new(5, 4), true);
        let squad = squad_with_pursuer(&env, Cell::new(0, 5), 1);
        let mut sim = Simulation::new(env, squad, &config(0));

        for _ in 0..3 {
            assert_eq!(sim.tick(), None);
            assert_eq!(sim.env().navigator(), Cell::new(0, 0));
            assert_eq!(pursuer(&sim).position(), Cell::new(0, 5));
            assert_eq!(pursuer(&sim).gate().counter(), 0);
        }
        assert_eq!(sim.tick(), Some(Ending::BudgetExhausted));
        assert_eq!(sim.ledger().failures(), 3);
        assert_eq!(sim.walked().len(), 1);
    }

    #[test]
    fn test_adversaries_answer_each_navigator_move() {
        let env = GridEnvironment::new(8, 8, Cell::new(0, 0), Cell::new(0, 7)).unwrap();
        let squad = squad_with_pursuer(&env, Cell::new(7, 0), 2);
        let mut sim = Simulation::new(env, squad, &config(0));
        sim.tracker.replace(Some((0..8).map(|c| Cell::new(0, c)).collect()));

        assert_eq!(sim.tick(), None);
        assert_eq!(sim.env().navigator(), Cell::new(0, 1));
        assert_eq!(pursuer(&sim).gate().counter(), 1);
        assert_eq!(pursuer(&sim).position(), Cell::new(7, 0));

        assert_eq!(sim.tick(), None);
        assert_eq!(sim.env().navigator(), Cell::new(0, 2));
        assert_eq!(pursuer(&sim).gate().counter(), 0);
        assert_ne!(pursuer(&sim).position(), Cell::new(7, 0));
        assert_eq!(sim.tracker().recalculations(), 0);
    }

    #[test]
    fn test_threatened_route_is_replaced_once() {
        let env = GridEnvironment::new(5, 5, Cell::new(0, 0), Cell::new(4, 4)).unwrap();
        let guard = Cell::new(1, 2);
        let squad = squad_with_pursuer(&env, guard, 50);
        let mut sim = Simulation::new(env, squad, &config(50));
        let row_then_column: Vec<Cell> = (0..5)
            .map(|c| Cell::new(0, c))
            .chain((1..5).map(|r| Cell::new(r, 4)))
            .collect();
        sim.tracker.replace(Some(row_then_column));

        assert_eq!(sim.tick(), None);
        assert_eq!(sim.tracker().recalculations(), 1);
        assert!(sim.ledger().successes() >= 1);
        let adversaries = sim.squad().positions();
        assert!(sim
            .tracker()
            .validate(sim.env().navigator(), sim.env(), &adversaries)
            .is_valid());

        let mut ending = None;
        for _ in 0..30 {
            ending = sim.tick();
            if ending.is_some() {
                break;
            }
        }
        assert_eq!(ending, Some(Ending::Arrived));
        assert_eq!(sim.tracker().recalculations(), 1);
        assert_eq!(pursuer(&sim).position(), guard);
        assert!(sim.walked().iter().all(|c| c.manhattan(guard) > 1));

        let before = sim.ledger().successes();
        sim.finish(Ending::Arrived);
        assert_eq!(sim.ledger().successes(), before + 2);
    }

    #[test]
    fn test_edits_reset_budget_and_reroute() {
        let env = GridEnvironment::new(5, 5, Cell::new(0, 0), Cell::new(4, 4)).unwrap();
        let mut sim = Simulation::new(env, Squad::new(), &config(0));
        assert!(sim.recompute_route());
        assert!(sim.tracker.note_recalculation());
        assert!(sim.tracker.note_recalculation());

        let cell = sim.tracker().route()[3];
        assert!(sim.set_obstacle(cell, true));
        assert_eq!(sim.tracker().recalculations(), 0);
        assert!(!sim.tracker().route().contains(&cell));
        assert!(sim.tracker().validate(sim.env().navigator(), sim.env(), &[]).is_valid());

        assert!(!sim.set_obstacle(Cell::new(4, 4), true));
        assert!(sim.set_obstacle(Cell::new(2, 2), true));
        sim.clear_obstacles();
        assert_eq!(sim.env().obstacle_count(), 0);
        assert!(sim.tracker().has_route());
    }
}

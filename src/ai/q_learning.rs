use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::Rng;

use crate::ai::q_table::QTable;
use crate::ai::reward::{Objective, RewardFn};
use crate::error::TrainingError;
use crate::grid::{Action, Cell, GridEnvironment};
use crate::training::dashboard_msg::MetricsSnapshot;
use crate::training::metrics::{EpisodeResult, TimingMetrics, TrainingMetrics};
use crate::training::session::{session_rng, CancelToken, SessionLock};

const TABLE_NAME: &str = "q-table";

/// Q-learning hyperparameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct QLearningConfig {
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub epsilon_start: f64,
    pub epsilon_min: f64,
    /// Multiplicative decay applied after every episode.
    pub epsilon_decay: f64,
    pub max_steps_per_episode: usize,
    /// Episodes between progress reports.
    pub report_interval: usize,
    pub seed: Option<u64>,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        QLearningConfig {
            learning_rate: 0.1,
            discount_factor: 0.95,
            epsilon_start: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            max_steps_per_episode: 400,
            report_interval: 100,
            seed: None,
        }
    }
}

/// Result of a completed or cancelled training call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSummary {
    pub episodes_completed: usize,
    pub successes: usize,
    pub final_epsilon: f64,
    pub cancelled: bool,
}

/// Tabular Q-learning agent usable for the navigator or an adversary.
///
/// Cloning is cheap and every clone shares the same table: a background
/// session writes through one clone while the interactive side reads through
/// another. Reads of a cell's four values happen under a read guard, so they
/// are never torn, but they may observe a partially trained table.
#[derive(Clone)]
pub struct QLearningAgent {
    table: Arc<RwLock<QTable>>,
    config: QLearningConfig,
    session: SessionLock,
    trained: Arc<AtomicBool>,
}

impl QLearningAgent {
    pub fn new(width: usize, height: usize, config: QLearningConfig) -> Self {
        QLearningAgent {
            table: Arc::new(RwLock::new(QTable::new(width, height))),
            config,
            session: SessionLock::new(),
            trained: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn for_environment(env: &GridEnvironment, config: QLearningConfig) -> Self {
        Self::new(env.width(), env.height(), config)
    }

    pub fn config(&self) -> &QLearningConfig {
        &self.config
    }

    /// Set once a training call runs to completion. Not a convergence
    /// guarantee.
    pub fn is_trained(&self) -> bool {
        self.trained.load(Ordering::Acquire)
    }

    pub fn is_training(&self) -> bool {
        self.session.is_active()
    }

    fn read(&self) -> RwLockReadGuard<'_, QTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, QTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current table.
    pub fn snapshot(&self) -> QTable {
        self.read().clone()
    }

    /// Zero the table. Fails while a session is active.
    pub fn reset(&self) -> Result<(), TrainingError> {
        let _guard = self.session.acquire(TABLE_NAME)?;
        self.write().clear();
        self.trained.store(false, Ordering::Release);
        Ok(())
    }

    /// Run up to `max_iterations` episodes from `start` towards the
    /// objective's target.
    ///
    /// Epsilon starts at `epsilon_start` for every call and decays after each
    /// episode; it lives only for this session. `progress` is invoked every
    /// `report_interval` episodes and after the last one. Cancellation is
    /// checked between episodes.
    ///
    /// An unreachable target never errors; the session just exhausts its
    /// budget.
    pub fn train(
        &self,
        env: &GridEnvironment,
        start: Cell,
        objective: &Objective,
        max_iterations: usize,
        progress: &mut dyn FnMut(&MetricsSnapshot),
        cancel: &CancelToken,
    ) -> Result<TrainingSummary, TrainingError> {
        let guard = self.session.acquire(TABLE_NAME)?;
        let mut rng = session_rng(self.config.seed, guard.index());
        let mut epsilon = self.config.epsilon_start;
        let mut metrics = TrainingMetrics::with_capacity(self.config.report_interval.max(1));
        let mut timing = TimingMetrics::new();
        let report_every = self.config.report_interval.max(1);
        let mut successes = 0;
        let mut completed = 0;
        let mut cancelled = false;

        tracing::info!(
            %start,
            episodes = max_iterations,
            "starting Q-learning session"
        );

        for episode in 0..max_iterations {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let started = Instant::now();
            let target = objective.target.resolve();
            let result = self.run_episode(
                env,
                start,
                target,
                objective.reward.as_ref(),
                epsilon,
                &mut rng,
            );
            timing.record_iteration_time(started.elapsed());
            if result.reached {
                successes += 1;
            }
            metrics.record_episode(result);
            completed = episode + 1;
            epsilon = (epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);

            if completed % report_every == 0 || completed == max_iterations {
                let snapshot = MetricsSnapshot {
                    iteration: completed,
                    total_iterations: max_iterations,
                    epsilon: Some(epsilon),
                    episode_reward: Some(result.reward),
                    success_rate: metrics.success_rate(report_every),
                    avg_length: metrics.average_length(report_every),
                    best_length: metrics.best_length(),
                    iterations_per_sec: timing.iterations_per_sec(),
                };
                tracing::debug!(
                    episode = completed,
                    reward = result.reward,
                    epsilon,
                    "Q-learning progress"
                );
                progress(&snapshot);
                timing.reset_window();
            }
        }

        if !cancelled {
            self.trained.store(true, Ordering::Release);
        }
        tracing::info!(completed, successes, cancelled, "Q-learning session finished");

        Ok(TrainingSummary {
            episodes_completed: completed,
            successes,
            final_epsilon: epsilon,
            cancelled,
        })
    }

    /// One episode: epsilon-greedy steps with in-place updates until the
    /// target is reached or the step cap is hit.
    fn run_episode(
        &self,
        env: &GridEnvironment,
        start: Cell,
        target: Cell,
        reward_fn: &dyn RewardFn,
        epsilon: f64,
        rng: &mut StdRng,
    ) -> EpisodeResult {
        let alpha = self.config.learning_rate;
        let gamma = self.config.discount_factor;
        let mut state = start;
        let mut total = 0.0;
        let mut steps = 0;

        while state != target && steps < self.config.max_steps_per_episode {
            let action = if rng.random::<f64>() < epsilon {
                Action::ALL[rng.random_range(0..Action::COUNT)]
            } else {
                self.read().best_action(state)
            };

            let candidate = state.step(action);
            // Blocked moves leave the agent in place but still cost a step.
            let next = if env.is_valid(candidate) {
                candidate
            } else {
                state
            };
            let reward = reward_fn.reward(state, action, next, target);
            let done = next == target;

            {
                let mut table = self.write();
                let bootstrap = if done { 0.0 } else { table.max_value(next) };
                let current = table.get(state, action);
                let updated = current + alpha * (reward + gamma * bootstrap - current);
                table.set(state, action, updated);
            }

            total += reward;
            steps += 1;
            state = next;
        }

        EpisodeResult {
            reward: total,
            steps,
            reached: state == target,
        }
    }

    /// Greedy action for a state. Ties go to the first action in
    /// [`Action::ALL`] order.
    pub fn best_action(&self, state: Cell) -> Action {
        self.read().best_action(state)
    }

    /// Follow the greedy policy from `start` for at most `max_steps` steps.
    ///
    /// Stops at `goal`, or as soon as a state would be revisited (including a
    /// blocked move that leaves the agent in place). The returned path always
    /// starts with `start` and may be partial.
    pub fn best_path(
        &self,
        env: &GridEnvironment,
        start: Cell,
        goal: Cell,
        max_steps: usize,
    ) -> Vec<Cell> {
        let table = self.read();
        let mut path = vec![start];
        let mut visited = HashSet::from([start]);
        let mut current = start;

        for _ in 0..max_steps {
            if current == goal {
                break;
            }
            let candidate = current.step(table.best_action(current));
            let next = if env.is_valid(candidate) {
                candidate
            } else {
                current
            };
            if !visited.insert(next) {
                tracing::debug!(at = %current, "greedy policy cycles; truncating path");
                break;
            }
            path.push(next);
            current = next;
        }
        path
    }
}

impl std::fmt::Debug for QLearningAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QLearningAgent")
            .field("config", &self.config)
            .field("trained", &self.is_trained())
            .field("training", &self.is_training())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::reward::ShapedReward;
    use crate::training::session::LivePosition;

    fn seeded(seed: u64) -> QLearningConfig {
        QLearningConfig {
            seed: Some(seed),
            ..Default::default()
        }
    }

    fn open_env(size: usize) -> GridEnvironment {
        let last = size as i32 - 1;
        GridEnvironment::new(size, size, Cell::new(0, 0), Cell::new(last, last)).unwrap()
    }

    fn no_progress() -> impl FnMut(&MetricsSnapshot) {
        |_| {}
    }

    #[test]
    fn test_zero_iterations_leaves_table_untouched() {
        let env = open_env(5);
        let agent = QLearningAgent::for_environment(&env, seeded(1));
        let before = agent.snapshot();
        let objective = Objective::navigator(env.goal(), ShapedReward::default());
        let summary = agent
            .train(&env, env.navigator(), &objective, 0, &mut no_progress(), &CancelToken::new())
            .unwrap();
        assert_eq!(summary.episodes_completed, 0);
        assert_eq!(agent.snapshot(), before);
    }

    #[test]
    fn test_untrained_best_path_terminates() {
        let env = open_env(10);
        let agent = QLearningAgent::for_environment(&env, seeded(1));
        let path = agent.best_path(&env, Cell::new(5, 5), env.goal(), 1000);
        // All-zero rows pick Up until the wall, then the bump revisits.
        assert_eq!(path.first(), Some(&Cell::new(5, 5)));
        assert_eq!(path.last(), Some(&Cell::new(0, 5)));
        assert_eq!(path.len(), 6);
    }

    #[test]
    fn test_best_path_respects_step_cap() {
        let env = open_env(10);
        let agent = QLearningAgent::for_environment(&env, seeded(1));
        let path = agent.best_path(&env, Cell::new(9, 9), Cell::new(0, 0), 3);
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn test_best_path_detects_two_cell_cycle() {
        let env = open_env(4);
        let agent = QLearningAgent::for_environment(&env, seeded(1));
        {
            let mut table = agent.write();
            table.set(Cell::new(1, 1), Action::Right, 1.0);
            table.set(Cell::new(1, 2), Action::Left, 1.0);
        }
        let path = agent.best_path(&env, Cell::new(1, 1), Cell::new(3, 3), 100);
        assert_eq!(path, vec![Cell::new(1, 1), Cell::new(1, 2)]);
    }

    #[test]
    fn test_converges_to_manhattan_path_on_open_grid() {
        let env = open_env(10);
        let agent = QLearningAgent::for_environment(&env, seeded(42));
        let start = Cell::new(0, 0);
        let goal = Cell::new(9, 9);
        let objective = Objective::navigator(goal, ShapedReward::default());
        let summary = agent
            .train(&env, start, &objective, 5000, &mut no_progress(), &CancelToken::new())
            .unwrap();
        assert_eq!(summary.episodes_completed, 5000);
        assert!(agent.is_trained());

        let path = agent.best_path(&env, start, goal, 200);
        assert_eq!(path.last(), Some(&goal));
        assert_eq!(path.len() - 1, start.manhattan(goal) as usize);
    }

    #[test]
    fn test_epsilon_decays_to_floor() {
        let env = open_env(4);
        let config = QLearningConfig {
            epsilon_decay: 0.5,
            epsilon_min: 0.05,
            ..seeded(3)
        };
        let agent = QLearningAgent::for_environment(&env, config);
        let objective = Objective::navigator(env.goal(), ShapedReward::default());
        let summary = agent
            .train(&env, env.navigator(), &objective, 20, &mut no_progress(), &CancelToken::new())
            .unwrap();
        assert!((summary.final_epsilon - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_progress_cadence() {
        let env = open_env(4);
        let config = QLearningConfig {
            report_interval: 10,
            ..seeded(5)
        };
        let agent = QLearningAgent::for_environment(&env, config);
        let objective = Objective::navigator(env.goal(), ShapedReward::default());
        let mut reports = Vec::new();
        agent
            .train(
                &env,
                env.navigator(),
                &objective,
                35,
                &mut |snap: &MetricsSnapshot| reports.push(snap.iteration),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(reports, vec![10, 20, 30, 35]);
    }

    #[test]
    fn test_cancel_between_episodes() {
        let env = open_env(6);
        let config = QLearningConfig {
            report_interval: 1,
            ..seeded(7)
        };
        let agent = QLearningAgent::for_environment(&env, config);
        let objective = Objective::navigator(env.goal(), ShapedReward::default());
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let summary = agent
            .train(
                &env,
                env.navigator(),
                &objective,
                1000,
                &mut |snap: &MetricsSnapshot| {
                    if snap.iteration == 3 {
                        trigger.cancel();
                    }
                },
                &cancel,
            )
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.episodes_completed, 3);
        assert!(!agent.is_trained());
    }

    #[test]
    fn test_second_session_on_same_table_is_rejected() {
        let env = open_env(4);
        let config = QLearningConfig {
            report_interval: 1,
            ..seeded(9)
        };
        let agent = QLearningAgent::for_environment(&env, config);
        let other = agent.clone();
        let objective = Objective::navigator(env.goal(), ShapedReward::default());
        let mut nested = None;
        agent
            .train(
                &env,
                env.navigator(),
                &objective,
                1,
                &mut |_: &MetricsSnapshot| {
                    nested = Some(other.train(
                        &env,
                        env.navigator(),
                        &objective,
                        1,
                        &mut |_: &MetricsSnapshot| {},
                        &CancelToken::new(),
                    ));
                },
                &CancelToken::new(),
            )
            .unwrap();
        assert!(matches!(nested, Some(Err(TrainingError::SessionActive(_)))));
        assert!(!agent.is_training());
    }

    #[test]
    fn test_unreachable_goal_still_terminates() {
        let mut env = open_env(5);
        for col in 0..5 {
            env.set_obstacle(Cell::new(2, col), true);
        }
        let agent = QLearningAgent::for_environment(&env, seeded(11));
        let objective = Objective::navigator(env.goal(), ShapedReward::default());
        let summary = agent
            .train(&env, env.navigator(), &objective, 50, &mut no_progress(), &CancelToken::new())
            .unwrap();
        assert_eq!(summary.episodes_completed, 50);
        assert_eq!(summary.successes, 0);
        assert!(agent.is_trained());
        let path = agent.best_path(&env, env.navigator(), env.goal(), 100);
        assert_ne!(path.last(), Some(&env.goal()));
    }

    #[test]
    fn test_adversary_role_learns_to_reach_live_target() {
        let env = open_env(5);
        let quarry = LivePosition::new(Cell::new(4, 0));
        let agent = QLearningAgent::for_environment(&env, seeded(13));
        let objective = Objective::adversary(quarry.clone(), ShapedReward::default());
        agent
            .train(&env, Cell::new(0, 4), &objective, 1500, &mut no_progress(), &CancelToken::new())
            .unwrap();
        let path = agent.best_path(&env, Cell::new(0, 4), quarry.get(), 50);
        assert_eq!(path.last(), Some(&Cell::new(4, 0)));
        assert_eq!(path.len() - 1, 8);
    }

    #[test]
    fn test_reads_while_training_in_background() {
        let env = open_env(8);
        let agent = QLearningAgent::for_environment(&env, seeded(17));
        let worker = agent.clone();
        let worker_env = env.clone();
        let handle = std::thread::spawn(move || {
            let objective = Objective::navigator(worker_env.goal(), ShapedReward::default());
            worker
                .train(
                    &worker_env,
                    worker_env.navigator(),
                    &objective,
                    300,
                    &mut |_: &MetricsSnapshot| {},
                    &CancelToken::new(),
                )
                .map(|s| s.episodes_completed)
        });
        for _ in 0..200 {
            let path = agent.best_path(&env, env.navigator(), env.goal(), 64);
            assert!(!path.is_empty());
            let _ = agent.best_action(Cell::new(3, 3));
        }
        assert_eq!(handle.join().unwrap().unwrap(), 300);
    }

    #[test]
    fn test_reset_clears_table() {
        let env = open_env(4);
        let agent = QLearningAgent::for_environment(&env, seeded(19));
        let objective = Objective::navigator(env.goal(), ShapedReward::default());
        agent
            .train(&env, env.navigator(), &objective, 20, &mut no_progress(), &CancelToken::new())
            .unwrap();
        assert_ne!(agent.snapshot(), QTable::new(4, 4));
        agent.reset().unwrap();
        assert_eq!(agent.snapshot(), QTable::new(4, 4));
        assert!(!agent.is_trained());
    }
}

use std::collections::HashMap;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use crate::ai::{HeatMapPathfinder, Objective, QLearningAgent, ShapedReward};
use crate::error::TrainingError;
use crate::grid::{Cell, GridEnvironment};
use crate::training::dashboard::DashboardState;
use crate::training::dashboard_msg::{MetricsSnapshot, SessionOutcome, Trainee, TrainingUpdate};
use crate::training::session::{CancelToken, LivePosition};

struct Worker {
    handle: JoinHandle<()>,
    cancel: CancelToken,
}

/// Runs training sessions on background threads and funnels their progress
/// through a channel the interactive side drains with [`poll`](Self::poll).
///
/// At most one worker per [`Trainee`]. Nothing here blocks except
/// [`wait_all`](Self::wait_all) and drop.
pub struct TrainingOrchestrator {
    tx: mpsc::Sender<TrainingUpdate>,
    rx: mpsc::Receiver<TrainingUpdate>,
    workers: HashMap<Trainee, Worker>,
    dashboard: DashboardState,
}

impl TrainingOrchestrator {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        TrainingOrchestrator {
            tx,
            rx,
            workers: HashMap::new(),
            dashboard: DashboardState::new(),
        }
    }

    pub fn dashboard(&self) -> &DashboardState {
        &self.dashboard
    }

    pub fn is_running(&self, trainee: Trainee) -> bool {
        self.workers
            .get(&trainee)
            .is_some_and(|w| !w.handle.is_finished())
    }

    pub fn any_running(&self) -> bool {
        self.workers.values().any(|w| !w.handle.is_finished())
    }

    /// Train the navigator policy towards `goal`.
    pub fn start_navigator_training(
        &mut self,
        agent: &QLearningAgent,
        env: GridEnvironment,
        start: Cell,
        goal: Cell,
        reward: ShapedReward,
        episodes: usize,
    ) -> Result<(), TrainingError> {
        let objective = Objective::navigator(goal, reward);
        self.spawn_q_learning(Trainee::NavigatorPolicy, agent, env, start, objective, episodes)
    }

    /// Train the adversary policy to chase `quarry`, which the interactive
    /// side keeps updated while the session runs.
    pub fn start_adversary_training(
        &mut self,
        agent: &QLearningAgent,
        env: GridEnvironment,
        start: Cell,
        quarry: LivePosition,
        reward: ShapedReward,
        episodes: usize,
    ) -> Result<(), TrainingError> {
        let objective = Objective::adversary(quarry, reward);
        self.spawn_q_learning(Trainee::AdversaryPolicy, agent, env, start, objective, episodes)
    }

    fn spawn_q_learning(
        &mut self,
        trainee: Trainee,
        agent: &QLearningAgent,
        env: GridEnvironment,
        start: Cell,
        objective: Objective,
        episodes: usize,
    ) -> Result<(), TrainingError> {
        self.ensure_idle(trainee)?;
        if agent.is_training() {
            return Err(TrainingError::SessionActive(trainee.name()));
        }
        let agent = agent.clone();
        self.spawn(trainee, move |progress, cancel| {
            agent
                .train(&env, start, &objective, episodes, progress, cancel)
                .map(|s| SessionOutcome {
                    iterations_completed: s.episodes_completed,
                    cancelled: s.cancelled,
                    successes: s.successes,
                })
        })
    }

    /// Rebuild the heat map with walks that steer clear of `adversaries`.
    pub fn start_heat_map(
        &mut self,
        pathfinder: &HeatMapPathfinder,
        env: GridEnvironment,
        start: Cell,
        goal: Cell,
        iterations: usize,
        adversaries: Vec<Cell>,
    ) -> Result<(), TrainingError> {
        let trainee = Trainee::HeatMap;
        self.ensure_idle(trainee)?;
        if pathfinder.is_training() {
            return Err(TrainingError::SessionActive(trainee.name()));
        }
        let pathfinder = pathfinder.clone();
        self.spawn(trainee, move |progress, cancel| {
            pathfinder
                .train(&env, start, goal, iterations, &adversaries, progress, cancel)
                .map(|s| SessionOutcome {
                    iterations_completed: s.walks_completed,
                    cancelled: s.cancelled,
                    successes: s.successful_walks,
                })
        })
    }

    fn ensure_idle(&mut self, trainee: Trainee) -> Result<(), TrainingError> {
        if self.is_running(trainee) {
            return Err(TrainingError::SessionActive(trainee.name()));
        }
        self.reap(trainee);
        Ok(())
    }

    fn spawn<F>(&mut self, trainee: Trainee, job: F) -> Result<(), TrainingError>
    where
        F: FnOnce(&mut dyn FnMut(&MetricsSnapshot), &CancelToken) -> Result<SessionOutcome, TrainingError>
            + Send
            + 'static,
    {
        let tx = self.tx.clone();
        let cancel = CancelToken::new();
        let token = cancel.clone();

        let handle = thread::Builder::new()
            .name(format!("train-{}", trainee.name().replace(' ', "-")))
            .spawn(move || {
                let progress_tx = tx.clone();
                let mut progress = |snap: &MetricsSnapshot| {
                    let _ = progress_tx.send(TrainingUpdate::Metrics(trainee, snap.clone()));
                };
                let update = match job(&mut progress, &token) {
                    Ok(outcome) => TrainingUpdate::Finished(trainee, outcome),
                    Err(err) => TrainingUpdate::Failed(trainee, err.to_string()),
                };
                let _ = tx.send(update);
            })?;

        tracing::info!(trainee = trainee.name(), "training worker started");
        self.dashboard.mark_started(trainee);
        self.workers.insert(trainee, Worker { handle, cancel });
        Ok(())
    }

    /// Request cancellation. Takes effect at the next episode or walk
    /// boundary. Returns `false` if nothing was running.
    pub fn cancel(&self, trainee: Trainee) -> bool {
        match self.workers.get(&trainee) {
            Some(worker) if !worker.handle.is_finished() => {
                tracing::info!(trainee = trainee.name(), "cancelling training");
                worker.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn cancel_all(&self) {
        for worker in self.workers.values() {
            worker.cancel.cancel();
        }
    }

    /// Drain pending updates without blocking, apply them to the dashboard
    /// and reap finished workers. Returns the drained updates in arrival
    /// order.
    pub fn poll(&mut self) -> Vec<TrainingUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = self.rx.try_recv() {
            self.dashboard.apply(&update);
            updates.push(update);
        }
        let finished: Vec<Trainee> = self
            .workers
            .iter()
            .filter(|(_, w)| w.handle.is_finished())
            .map(|(&t, _)| t)
            .collect();
        for trainee in finished {
            if let Some(update) = self.reap(trainee) {
                updates.push(update);
            }
        }
        updates
    }

    /// Join a finished worker. A panic surfaces as a `Failed` update.
    fn reap(&mut self, trainee: Trainee) -> Option<TrainingUpdate> {
        let worker = self.workers.remove(&trainee)?;
        if worker.handle.join().is_ok() {
            return None;
        }
        tracing::warn!(trainee = trainee.name(), "training worker panicked");
        let update = TrainingUpdate::Failed(
            trainee,
            TrainingError::WorkerPanicked(trainee.name()).to_string(),
        );
        self.dashboard.apply(&update);
        Some(update)
    }

    /// Block until every worker has exited, then drain all updates.
    pub fn wait_all(&mut self) -> Vec<TrainingUpdate> {
        let trainees: Vec<Trainee> = self.workers.keys().copied().collect();
        let mut updates = Vec::new();
        for trainee in trainees {
            if let Some(update) = self.reap(trainee) {
                updates.push(update);
            }
        }
        let mut drained = self.poll();
        drained.extend(updates);
        drained
    }
}

impl Default for TrainingOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TrainingOrchestrator {
    fn drop(&mut self) {
        self.cancel_all();
        for (_, worker) in self.workers.drain() {
            let _ = worker.handle.join();
        }
    }
}

use std::collections::VecDeque;

use crate::training::dashboard_msg::{MetricsSnapshot, SessionOutcome, Trainee, TrainingUpdate};

const MAX_HISTORY: usize = 500;

/// Status of one trainee's most recent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStatus {
    Idle,
    Running,
    Finished,
    Cancelled,
    Failed,
}

/// Latest values and bounded history for one trainee.
#[derive(Debug, Clone)]
pub struct TraineePanel {
    pub status: TrainingStatus,
    pub latest: Option<MetricsSnapshot>,
    pub outcome: Option<SessionOutcome>,
    pub error: Option<String>,

    // History buffers: (iteration, value)
    pub success_history: VecDeque<(f64, f64)>,
    pub length_history: VecDeque<(f64, f64)>,
    pub reward_history: VecDeque<(f64, f64)>,
}

impl TraineePanel {
    fn new() -> Self {
        TraineePanel {
            status: TrainingStatus::Idle,
            latest: None,
            outcome: None,
            error: None,
            success_history: VecDeque::new(),
            length_history: VecDeque::new(),
            reward_history: VecDeque::new(),
        }
    }

    /// Forget the previous session and mark a new one as running.
    fn start(&mut self) {
        *self = TraineePanel::new();
        self.status = TrainingStatus::Running;
    }

    fn apply_metrics(&mut self, snap: &MetricsSnapshot) {
        let at = snap.iteration as f64;
        push_capped(&mut self.success_history, (at, snap.success_rate));
        push_capped(&mut self.length_history, (at, snap.avg_length));
        if let Some(reward) = snap.episode_reward {
            push_capped(&mut self.reward_history, (at, reward));
        }
        self.latest = Some(snap.clone());
    }

    /// Progress ratio [0.0, 1.0].
    pub fn progress(&self) -> f64 {
        match (&self.outcome, &self.latest) {
            (Some(_), _) if self.status == TrainingStatus::Finished => 1.0,
            (_, Some(snap)) if snap.total_iterations > 0 => {
                snap.iteration as f64 / snap.total_iterations as f64
            }
            _ => 0.0,
        }
    }
}

fn push_capped(buf: &mut VecDeque<(f64, f64)>, value: (f64, f64)) {
    buf.push_back(value);
    if buf.len() > MAX_HISTORY {
        buf.pop_front();
    }
}

/// What the interactive side knows about background training. Only ever
/// updated from polled messages, so it reflects the latest report rather
/// than the live tables.
#[derive(Debug, Clone)]
pub struct DashboardState {
    navigator: TraineePanel,
    adversary: TraineePanel,
    heat_map: TraineePanel,
}

impl DashboardState {
    pub fn new() -> Self {
        DashboardState {
            navigator: TraineePanel::new(),
            adversary: TraineePanel::new(),
            heat_map: TraineePanel::new(),
        }
    }

    pub fn panel(&self, trainee: Trainee) -> &TraineePanel {
        match trainee {
            Trainee::NavigatorPolicy => &self.navigator,
            Trainee::AdversaryPolicy => &self.adversary,
            Trainee::HeatMap => &self.heat_map,
        }
    }

    fn panel_mut(&mut self, trainee: Trainee) -> &mut TraineePanel {
        match trainee {
            Trainee::NavigatorPolicy => &mut self.navigator,
            Trainee::AdversaryPolicy => &mut self.adversary,
            Trainee::HeatMap => &mut self.heat_map,
        }
    }

    pub fn mark_started(&mut self, trainee: Trainee) {
        self.panel_mut(trainee).start();
    }

    /// Apply one update from a training worker.
    pub fn apply(&mut self, update: &TrainingUpdate) {
        let panel = self.panel_mut(update.trainee());
        match update {
            TrainingUpdate::Metrics(_, snap) => panel.apply_metrics(snap),
            TrainingUpdate::Finished(_, outcome) => {
                panel.status = if outcome.cancelled {
                    TrainingStatus::Cancelled
                } else {
                    TrainingStatus::Finished
                };
                panel.outcome = Some(*outcome);
            }
            TrainingUpdate::Failed(_, message) => {
                panel.status = TrainingStatus::Failed;
                panel.error = Some(message.clone());
            }
        }
    }

    pub fn latest(&self, trainee: Trainee) -> Option<&MetricsSnapshot> {
        self.panel(trainee).latest.as_ref()
    }

    pub fn status(&self, trainee: Trainee) -> TrainingStatus {
        self.panel(trainee).status
    }

    pub fn progress(&self, trainee: Trainee) -> f64 {
        self.panel(trainee).progress()
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

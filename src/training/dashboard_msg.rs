/// Which table a training session writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trainee {
    NavigatorPolicy,
    AdversaryPolicy,
    HeatMap,
}

impl Trainee {
    pub fn name(self) -> &'static str {
        match self {
            Trainee::NavigatorPolicy => "navigator policy",
            Trainee::AdversaryPolicy => "adversary policy",
            Trainee::HeatMap => "heat map",
        }
    }
}

/// Periodic metrics snapshot sent from a training worker.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub iteration: usize,
    pub total_iterations: usize,
    /// Exploration rate; `None` for heat-map walks.
    pub epsilon: Option<f64>,
    /// Cumulative reward of the most recent episode; `None` for heat-map walks.
    pub episode_reward: Option<f64>,
    pub success_rate: f64,
    pub avg_length: f64,
    pub best_length: Option<usize>,
    pub iterations_per_sec: f64,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOutcome {
    pub iterations_completed: usize,
    pub cancelled: bool,
    pub successes: usize,
}

/// Updates sent from training workers to the interactive side.
#[derive(Debug, Clone)]
pub enum TrainingUpdate {
    Metrics(Trainee, MetricsSnapshot),
    Finished(Trainee, SessionOutcome),
    Failed(Trainee, String),
}

impl TrainingUpdate {
    pub fn trainee(&self) -> Trainee {
        match self {
            TrainingUpdate::Metrics(t, _)
            | TrainingUpdate::Finished(t, _)
            | TrainingUpdate::Failed(t, _) => *t,
        }
    }
}

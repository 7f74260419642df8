//! Background training: session bookkeeping, rolling metrics, the messages
//! workers send, the dashboard state the interactive side keeps, and the
//! orchestrator that owns the worker threads.

pub mod dashboard;
pub mod dashboard_msg;
pub mod metrics;
pub mod orchestrator;
pub mod session;

pub use dashboard::{DashboardState, TraineePanel, TrainingStatus};
pub use dashboard_msg::{MetricsSnapshot, SessionOutcome, Trainee, TrainingUpdate};
pub use orchestrator::TrainingOrchestrator;
pub use session::{CancelToken, LivePosition};

mod analysis;
mod heat_map;
mod pathfinder;
mod q_learning;
mod q_table;
mod reward;

pub use analysis::{analyze, EnvironmentReport};
pub use heat_map::HeatMap;
pub use pathfinder::{HeatMapConfig, HeatMapPathfinder, HeatTrainingSummary};
pub use q_learning::{QLearningAgent, QLearningConfig, TrainingSummary};
pub use q_table::QTable;
pub use reward::{Objective, RewardFn, ShapedReward, Target};

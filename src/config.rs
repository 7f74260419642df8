use std::path::Path;

use crate::adversary::AdversaryConfig;
use crate::ai::{HeatMapConfig, QLearningConfig, ShapedReward};
use crate::error::{ConfigError, GridError};
use crate::grid::{Cell, GridEnvironment};
use crate::route::RouteConfig;
use crate::training::session::session_rng;

/// Attempts at a reachable random obstacle layout before giving up.
const SCATTER_ATTEMPTS: usize = 50;

/// Grid shape, endpoints and random obstacle density.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub width: usize,
    pub height: usize,
    pub navigator: Cell,
    pub goal: Cell,
    /// Share of free cells turned into obstacles by `build_environment`.
    pub obstacle_percentage: u8,
    pub seed: Option<u64>,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            width: 40,
            height: 30,
            navigator: Cell::new(1, 1),
            goal: Cell::new(28, 38),
            obstacle_percentage: 18,
            seed: None,
        }
    }
}

impl GridConfig {
    /// Build the environment, optionally scattering obstacles. A failed
    /// scatter leaves the grid open.
    pub fn build_environment(&self, scatter: bool) -> Result<GridEnvironment, GridError> {
        let mut env = GridEnvironment::new(self.width, self.height, self.navigator, self.goal)?;
        if scatter && self.obstacle_percentage > 0 {
            let mut rng = session_rng(self.seed, 0);
            env.scatter_obstacles(self.obstacle_percentage, &mut rng, SCATTER_ATTEMPTS);
        }
        Ok(env)
    }

    fn in_bounds(&self, cell: Cell) -> bool {
        cell.row >= 0
            && cell.col >= 0
            && (cell.row as usize) < self.height
            && (cell.col as usize) < self.width
    }
}

/// Session lengths used by the binaries.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Q-learning episodes per session.
    pub episodes: usize,
    /// Heat-map walks per session.
    pub heat_iterations: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            episodes: 5000,
            heat_iterations: 1000,
        }
    }
}

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub grid: GridConfig,
    pub q_learning: QLearningConfig,
    pub reward: ShapedReward,
    pub heat_map: HeatMapConfig,
    pub adversary: AdversaryConfig,
    pub route: RouteConfig,
    pub training: TrainingConfig,
}

fn invalid(message: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::Validation(message.into()))
}

fn in_unit_range(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let grid = &self.grid;
        if grid.width == 0 || grid.height == 0 {
            return invalid("grid.width and grid.height must be > 0");
        }
        if !grid.in_bounds(grid.navigator) {
            return invalid(format!("grid.navigator {} is outside the grid", grid.navigator));
        }
        if !grid.in_bounds(grid.goal) {
            return invalid(format!("grid.goal {} is outside the grid", grid.goal));
        }
        if grid.navigator == grid.goal {
            return invalid("grid.navigator and grid.goal must differ");
        }
        if grid.obstacle_percentage > 100 {
            return invalid("grid.obstacle_percentage must be <= 100");
        }

        let q = &self.q_learning;
        if q.learning_rate <= 0.0 {
            return invalid("q_learning.learning_rate must be > 0");
        }
        if !in_unit_range(q.discount_factor) {
            return invalid("q_learning.discount_factor must be in [0, 1]");
        }
        if !in_unit_range(q.epsilon_start) {
            return invalid("q_learning.epsilon_start must be in [0, 1]");
        }
        if !in_unit_range(q.epsilon_min) {
            return invalid("q_learning.epsilon_min must be in [0, 1]");
        }
        if q.epsilon_min > q.epsilon_start {
            return invalid("q_learning.epsilon_min must be <= q_learning.epsilon_start");
        }
        if q.epsilon_decay <= 0.0 || q.epsilon_decay > 1.0 {
            return invalid("q_learning.epsilon_decay must be in (0, 1]");
        }
        if q.report_interval == 0 {
            return invalid("q_learning.report_interval must be > 0");
        }

        let heat = &self.heat_map;
        if heat.report_interval == 0 {
            return invalid("heat_map.report_interval must be > 0");
        }
        if heat.min_step_cost <= 0.0 {
            return invalid("heat_map.min_step_cost must be > 0");
        }
        if heat.heat_weight < 0.0 {
            return invalid("heat_map.heat_weight must be >= 0");
        }
        if !in_unit_range(heat.exploration_rate) {
            return invalid("heat_map.exploration_rate must be in [0, 1]");
        }

        let adversary = &self.adversary;
        if adversary.move_ratio == 0 {
            return invalid("adversary.move_ratio must be >= 1");
        }
        if !in_unit_range(adversary.interception_bias) {
            return invalid("adversary.interception_bias must be in [0, 1]");
        }
        if let Some(entry) = adversary.roster.iter().find(|e| !grid.in_bounds(e.position)) {
            return invalid(format!(
                "adversary.roster {} at {} is outside the grid",
                entry.kind, entry.position
            ));
        }

        Ok(())
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&AppConfig::default())?)
    }
}

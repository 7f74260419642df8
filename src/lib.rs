//! # Grid Pursuit
//!
//! A navigator crosses a grid towards a goal while adversaries try to stop
//! it. Routes come from a heat map learned by stochastic
//! walks and from tabular Q-learning, both trained on background threads.
//!
//! ## Modules
//!
//! - [`grid`]: Cells, actions, the editable environment and A* search
//! - [`ai`]: Q-learning agent, heat-map pathfinder, environment analysis
//! - [`adversary`]: Move-ratio gate, adversary behaviours and the squad
//! - [`training`]: Background sessions, metrics and progress messages
//! - [`route`]: Route validation, safe recomputation and heat-map feedback
//! - [`simulation`]: The tick loop tying navigator, squad and training together
//! - [`config`]: TOML configuration loading and validation
//! - [`error`]: Structured error types

pub mod adversary;
pub mod ai;
pub mod config;
pub mod error;
pub mod grid;
pub mod route;
pub mod simulation;
pub mod training;

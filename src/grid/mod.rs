//! The shared grid: coordinates, cardinal actions, the editable environment
//! and A* search over it.

mod cell;
mod environment;
pub mod search;

pub use cell::{Action, Cell};
pub use environment::GridEnvironment;
pub use search::{is_reachable, shortest_path};

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use super::cell::{Action, Cell};
use super::search;
use crate::error::GridError;

/// The shared grid: fixed dimensions, an editable obstacle set, the goal cell
/// and the navigator's current cell.
///
/// The navigator's cell and the goal are never obstacles. Edits that would
/// break this are rejected and reported through a `false` return; editing
/// front-ends query cells speculatively, so nothing here panics or errors on a
/// bad coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct GridEnvironment {
    width: usize,
    height: usize,
    obstacles: HashSet<Cell>,
    goal: Cell,
    navigator: Cell,
}

impl GridEnvironment {
    pub fn new(width: usize, height: usize, navigator: Cell, goal: Cell) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::InvalidDimensions { width, height });
        }
        let env = GridEnvironment {
            width,
            height,
            obstacles: HashSet::new(),
            goal,
            navigator,
        };
        for cell in [navigator, goal] {
            if !env.in_bounds(cell) {
                return Err(GridError::OutOfBounds {
                    cell,
                    width,
                    height,
                });
            }
        }
        if navigator == goal {
            return Err(GridError::NavigatorOnGoal(goal));
        }
        Ok(env)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    pub fn goal(&self) -> Cell {
        self.goal
    }

    pub fn navigator(&self) -> Cell {
        self.navigator
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.row >= 0
            && cell.col >= 0
            && (cell.row as usize) < self.height
            && (cell.col as usize) < self.width
    }

    /// Row-major index of an in-bounds cell.
    pub fn index_of(&self, cell: Cell) -> Option<usize> {
        if self.in_bounds(cell) {
            Some(cell.row as usize * self.width + cell.col as usize)
        } else {
            None
        }
    }

    /// Inverse of [`index_of`](Self::index_of).
    pub fn cell_at(&self, index: usize) -> Option<Cell> {
        if index < self.cell_count() {
            Some(Cell::new(
                (index / self.width) as i32,
                (index % self.width) as i32,
            ))
        } else {
            None
        }
    }

    pub fn is_obstacle(&self, cell: Cell) -> bool {
        self.obstacles.contains(&cell)
    }

    /// In bounds and not an obstacle.
    pub fn is_valid(&self, cell: Cell) -> bool {
        self.in_bounds(cell) && !self.obstacles.contains(&cell)
    }

    /// Valid cardinal neighbours in [`Action::ALL`] order.
    pub fn neighbors(&self, cell: Cell) -> impl Iterator<Item = Cell> + '_ {
        Action::ALL
            .into_iter()
            .map(move |a| cell.step(a))
            .filter(move |&n| self.is_valid(n))
    }

    pub fn obstacles(&self) -> impl Iterator<Item = Cell> + '_ {
        self.obstacles.iter().copied()
    }

    pub fn obstacle_count(&self) -> usize {
        self.obstacles.len()
    }

    /// All valid cells in row-major order.
    pub fn open_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.cell_count())
            .filter_map(move |i| self.cell_at(i))
            .filter(move |&c| self.is_valid(c))
    }

    /// Add or remove an obstacle. Returns `false` when the edit is rejected:
    /// out of bounds, or an obstacle requested on the goal or the navigator.
    pub fn set_obstacle(&mut self, cell: Cell, present: bool) -> bool {
        if !self.in_bounds(cell) {
            return false;
        }
        if present {
            if cell == self.goal || cell == self.navigator {
                tracing::warn!(%cell, "rejected obstacle on goal or navigator");
                return false;
            }
            self.obstacles.insert(cell);
        } else {
            self.obstacles.remove(&cell);
        }
        true
    }

    /// Move the goal. Rejected for invalid cells and the navigator's cell.
    pub fn move_goal(&mut self, cell: Cell) -> bool {
        if !self.is_valid(cell) || cell == self.navigator {
            return false;
        }
        self.goal = cell;
        true
    }

    /// Move the navigator. Rejected for invalid cells; stepping onto the goal
    /// is allowed (arrival).
    pub fn move_navigator(&mut self, cell: Cell) -> bool {
        if !self.is_valid(cell) {
            return false;
        }
        self.navigator = cell;
        true
    }

    pub fn clear_obstacles(&mut self) {
        self.obstacles.clear();
    }

    /// Turn `percentage` percent of the free cells into obstacles, never the
    /// navigator or goal, retrying until the goal stays reachable.
    ///
    /// On success the previous obstacle set is replaced; if no reachable
    /// layout is found within `max_attempts` the obstacles are left untouched
    /// and `false` is returned.
    pub fn scatter_obstacles<R: Rng + ?Sized>(
        &mut self,
        percentage: u8,
        rng: &mut R,
        max_attempts: usize,
    ) -> bool {
        let mut free: Vec<Cell> = (0..self.cell_count())
            .filter_map(|i| self.cell_at(i))
            .filter(|&c| c != self.navigator && c != self.goal)
            .collect();
        let count = free.len() * usize::from(percentage.min(100)) / 100;

        for attempt in 0..max_attempts {
            free.shuffle(rng);
            let mut candidate = self.clone();
            candidate.obstacles = free[..count].iter().copied().collect();
            if search::is_reachable(&candidate, candidate.navigator, candidate.goal) {
                tracing::debug!(attempt, obstacles = count, "scattered obstacles");
                self.obstacles = candidate.obstacles;
                return true;
            }
        }
        tracing::warn!(percentage, max_attempts, "no reachable obstacle layout found");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn env5() -> GridEnvironment {
        GridEnvironment::new(5, 5, Cell::new(0, 0), Cell::new(4, 4)).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_input() {
        assert!(matches!(
            GridEnvironment::new(0, 5, Cell::new(0, 0), Cell::new(1, 1)),
            Err(GridError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            GridEnvironment::new(5, 5, Cell::new(0, 0), Cell::new(5, 1)),
            Err(GridError::OutOfBounds { .. })
        ));
        assert!(matches!(
            GridEnvironment::new(5, 5, Cell::new(2, 2), Cell::new(2, 2)),
            Err(GridError::NavigatorOnGoal(_))
        ));
    }

    #[test]
    fn test_is_valid_out_of_bounds() {
        let env = env5();
        assert!(env.is_valid(Cell::new(0, 0)));
        assert!(env.is_valid(Cell::new(4, 4)));
        assert!(!env.is_valid(Cell::new(-1, 0)));
        assert!(!env.is_valid(Cell::new(0, 5)));
        assert!(!env.is_valid(Cell::new(5, 0)));
    }

    #[test]
    fn test_neighbors_filters_edges_and_obstacles() {
        let mut env = env5();
        let corner: Vec<Cell> = env.neighbors(Cell::new(0, 0)).collect();
        assert_eq!(corner, vec![Cell::new(1, 0), Cell::new(0, 1)]);

        assert!(env.set_obstacle(Cell::new(2, 3), true));
        let middle: Vec<Cell> = env.neighbors(Cell::new(2, 2)).collect();
        assert_eq!(
            middle,
            vec![Cell::new(1, 2), Cell::new(3, 2), Cell::new(2, 1)]
        );
    }

    #[test]
    fn test_set_obstacle_rejects_goal_and_navigator() {
        let mut env = env5();
        assert!(!env.set_obstacle(Cell::new(4, 4), true));
        assert!(!env.set_obstacle(Cell::new(0, 0), true));
        assert!(!env.set_obstacle(Cell::new(9, 9), true));
        assert_eq!(env.obstacle_count(), 0);

        assert!(env.set_obstacle(Cell::new(1, 1), true));
        assert!(env.is_obstacle(Cell::new(1, 1)));
        assert!(env.set_obstacle(Cell::new(1, 1), false));
        assert!(!env.is_obstacle(Cell::new(1, 1)));
    }

    #[test]
    fn test_move_goal_rules() {
        let mut env = env5();
        env.set_obstacle(Cell::new(3, 3), true);
        assert!(!env.move_goal(Cell::new(3, 3)));
        assert!(!env.move_goal(Cell::new(0, 0)));
        assert!(!env.move_goal(Cell::new(-1, 2)));
        assert!(env.move_goal(Cell::new(2, 4)));
        assert_eq!(env.goal(), Cell::new(2, 4));
    }

    #[test]
    fn test_move_navigator_rules() {
        let mut env = env5();
        env.set_obstacle(Cell::new(1, 0), true);
        assert!(!env.move_navigator(Cell::new(1, 0)));
        assert!(env.move_navigator(Cell::new(0, 1)));
        assert_eq!(env.navigator(), Cell::new(0, 1));
        assert!(env.move_navigator(Cell::new(4, 4)));
    }

    #[test]
    fn test_index_roundtrip() {
        let env = GridEnvironment::new(7, 3, Cell::new(0, 0), Cell::new(2, 6)).unwrap();
        for i in 0..env.cell_count() {
            let cell = env.cell_at(i).unwrap();
            assert_eq!(env.index_of(cell), Some(i));
        }
        assert_eq!(env.index_of(Cell::new(3, 0)), None);
        assert_eq!(env.cell_at(21), None);
    }

    #[test]
    fn test_scatter_obstacles_keeps_goal_reachable() {
        let mut env = GridEnvironment::new(20, 15, Cell::new(1, 1), Cell::new(13, 18)).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(env.scatter_obstacles(18, &mut rng, 100));
        let free = 20 * 15 - 2;
        assert_eq!(env.obstacle_count(), free * 18 / 100);
        assert!(!env.is_obstacle(env.navigator()));
        assert!(!env.is_obstacle(env.goal()));
        assert!(search::is_reachable(&env, env.navigator(), env.goal()));
    }

    #[test]
    fn test_scatter_obstacles_gives_up_when_impossible() {
        let mut env = GridEnvironment::new(3, 3, Cell::new(0, 0), Cell::new(2, 2)).unwrap();
        env.set_obstacle(Cell::new(1, 1), true);
        let mut rng = StdRng::seed_from_u64(1);
        // Every free cell becomes an obstacle, so the goal can never be reached.
        assert!(!env.scatter_obstacles(100, &mut rng, 5));
        assert_eq!(env.obstacle_count(), 1);
    }
}

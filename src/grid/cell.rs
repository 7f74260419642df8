use serde::{Deserialize, Serialize};

/// A grid coordinate. Row 0 is the top row, column 0 the leftmost column.
///
/// Coordinates are signed so that neighbour arithmetic can step off the grid;
/// such cells are simply reported as invalid by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub row: i32,
    pub col: i32,
}

impl Cell {
    pub const fn new(row: i32, col: i32) -> Self {
        Cell { row, col }
    }

    /// Manhattan distance to another cell.
    pub fn manhattan(self, other: Cell) -> u32 {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    /// Chebyshev distance to another cell.
    pub fn chebyshev(self, other: Cell) -> u32 {
        self.row.abs_diff(other.row).max(self.col.abs_diff(other.col))
    }

    /// The cell one step away in the given direction. May lie off the grid.
    pub fn step(self, action: Action) -> Cell {
        let (dr, dc) = action.delta();
        Cell::new(self.row + dr, self.col + dc)
    }

    /// The action leading from `self` to an adjacent cell, if the two cells
    /// are cardinal neighbours.
    pub fn direction_to(self, other: Cell) -> Option<Action> {
        Action::ALL.into_iter().find(|&a| self.step(a) == other)
    }

    pub fn is_adjacent(self, other: Cell) -> bool {
        self.manhattan(other) == 1
    }
}

impl From<(i32, i32)> for Cell {
    fn from((row, col): (i32, i32)) -> Self {
        Cell::new(row, col)
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// The four cardinal moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Up,
    Down,
    Left,
    Right,
}

impl Action {
    /// Fixed enumeration order. Greedy tie-breaks pick the first maximum in
    /// this order.
    pub const ALL: [Action; 4] = [Action::Up, Action::Down, Action::Left, Action::Right];

    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        match self {
            Action::Up => 0,
            Action::Down => 1,
            Action::Left => 2,
            Action::Right => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Action> {
        Action::ALL.get(index).copied()
    }

    /// (row delta, column delta)
    pub fn delta(self) -> (i32, i32) {
        match self {
            Action::Up => (-1, 0),
            Action::Down => (1, 0),
            Action::Left => (0, -1),
            Action::Right => (0, 1),
        }
    }

    pub fn opposite(self) -> Action {
        match self {
            Action::Up => Action::Down,
            Action::Down => Action::Up,
            Action::Left => Action::Right,
            Action::Right => Action::Left,
        }
    }
}

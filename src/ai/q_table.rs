use crate::grid::{Action, Cell};

/// Dense action-value table: one row of four values per grid cell, indexed by
/// the row-major cell index.
#[derive(Debug, Clone, PartialEq)]
pub struct QTable {
    width: usize,
    height: usize,
    values: Vec<f64>,
}

impl QTable {
    pub fn new(width: usize, height: usize) -> Self {
        QTable {
            width,
            height,
            values: vec![0.0; width * height * Action::COUNT],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn base(&self, cell: Cell) -> Option<usize> {
        if cell.row < 0 || cell.col < 0 {
            return None;
        }
        let (row, col) = (cell.row as usize, cell.col as usize);
        if row >= self.height || col >= self.width {
            return None;
        }
        Some((row * self.width + col) * Action::COUNT)
    }

    /// Out-of-bounds cells read as zero.
    pub fn get(&self, cell: Cell, action: Action) -> f64 {
        self.base(cell)
            .map(|b| self.values[b + action.index()])
            .unwrap_or(0.0)
    }

    /// Writes to out-of-bounds cells are ignored.
    pub fn set(&mut self, cell: Cell, action: Action, value: f64) {
        if let Some(b) = self.base(cell) {
            self.values[b + action.index()] = value;
        }
    }

    /// All four values for a cell, in [`Action::ALL`] order.
    pub fn row(&self, cell: Cell) -> [f64; 4] {
        let mut row = [0.0; 4];
        if let Some(b) = self.base(cell) {
            row.copy_from_slice(&self.values[b..b + Action::COUNT]);
        }
        row
    }

    /// Argmax over the row; ties go to the first action in enumeration order.
    pub fn best_action(&self, cell: Cell) -> Action {
        let row = self.row(cell);
        let mut best = 0;
        for i in 1..Action::COUNT {
            if row[i] > row[best] {
                best = i;
            }
        }
        Action::ALL[best]
    }

    pub fn max_value(&self, cell: Cell) -> f64 {
        self.row(cell).into_iter().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Reset every value to zero.
    pub fn clear(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

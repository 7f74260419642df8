use crate::grid::Cell;

/// Non-negative desirability score per cell, built up by successful walks.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatMap {
    width: usize,
    height: usize,
    values: Vec<f64>,
}

impl HeatMap {
    pub fn new(width: usize, height: usize) -> Self {
        HeatMap {
            width,
            height,
            values: vec![0.0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn index(&self, cell: Cell) -> Option<usize> {
        if cell.row < 0 || cell.col < 0 {
            return None;
        }
        let (row, col) = (cell.row as usize, cell.col as usize);
        (row < self.height && col < self.width).then(|| row * self.width + col)
    }

    /// Out-of-bounds cells read as zero.
    pub fn get(&self, cell: Cell) -> f64 {
        self.index(cell).map(|i| self.values[i]).unwrap_or(0.0)
    }

    /// Add heat to a cell. The stored value never drops below zero.
    pub fn add(&mut self, cell: Cell, amount: f64) {
        if let Some(i) = self.index(cell) {
            self.values[i] = (self.values[i] + amount).max(0.0);
        }
    }

    pub fn reset(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0.0);
    }

    pub fn peak(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// True when no cell has received any heat.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    /// Heat scaled into `[0, 1]` by the current peak.
    pub fn normalized(&self, cell: Cell) -> f64 {
        let peak = self.peak();
        if peak > 0.0 {
            self.get(cell) / peak
        } else {
            0.0
        }
    }

    /// Linearly interpolated percentile (`p` in `[0, 100]`) over the cells
    /// with positive heat. `None` when the map is empty.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        let mut positive: Vec<f64> = self.values.iter().copied().filter(|&v| v > 0.0).collect();
        if positive.is_empty() {
            return None;
        }
        positive.sort_by(f64::total_cmp);
        let rank = p.clamp(0.0, 100.0) / 100.0 * (positive.len() - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        Some(positive[lo] + (positive[hi] - positive[lo]) * (rank - lo as f64))
    }

    /// Cells with positive heat, row-major.
    pub fn hot_cells(&self) -> impl Iterator<Item = (Cell, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0.0)
            .map(move |(i, &v)| {
                (
                    Cell::new((i / self.width) as i32, (i % self.width) as i32),
                    v,
                )
            })
    }
}

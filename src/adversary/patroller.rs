use crate::grid::{Cell, GridEnvironment};

use super::Scene;

/// Walks a cyclic square route around its anchor and breaks off to chase the
/// navigator only while the navigator is inside the patrol square.
#[derive(Debug)]
pub struct Patroller {
    anchor: Cell,
    radius: u32,
    waypoints: Vec<Cell>,
    next_waypoint: usize,
    chasing: bool,
}

impl Patroller {
    pub fn new(anchor: Cell, radius: u32) -> Self {
        Patroller {
            anchor,
            radius,
            waypoints: Vec::new(),
            next_waypoint: 0,
            chasing: false,
        }
    }

    pub fn anchor(&self) -> Cell {
        self.anchor
    }

    pub fn waypoints(&self) -> &[Cell] {
        &self.waypoints
    }

    pub fn is_chasing(&self) -> bool {
        self.chasing
    }

    /// Valid cells on the square perimeter of `radius` around `anchor`,
    /// clockwise from the top-left corner. Falls back to the anchor's valid
    /// neighbours when the whole perimeter is blocked or off the grid.
    pub fn patrol_route(env: &GridEnvironment, anchor: Cell, radius: u32) -> Vec<Cell> {
        let r = radius as i32;
        let mut ring = Vec::new();
        if r > 0 {
            let (top, bottom) = (anchor.row - r, anchor.row + r);
            let (left, right) = (anchor.col - r, anchor.col + r);
            ring.extend((left..right).map(|col| Cell::new(top, col)));
            ring.extend((top..bottom).map(|row| Cell::new(row, right)));
            ring.extend((left + 1..=right).rev().map(|col| Cell::new(bottom, col)));
            ring.extend((top + 1..=bottom).rev().map(|row| Cell::new(row, left)));
        }
        let route: Vec<Cell> = ring.into_iter().filter(|&c| env.is_valid(c)).collect();
        if route.is_empty() {
            env.neighbors(anchor).collect()
        } else {
            route
        }
    }

    fn navigator_in_range(&self, navigator: Cell) -> bool {
        navigator.chebyshev(self.anchor) <= self.radius
    }

    pub(super) fn next_cell(&mut self, position: Cell, scene: &Scene<'_>) -> Cell {
        if self.waypoints.is_empty() {
            self.waypoints = Self::patrol_route(scene.env, self.anchor, self.radius);
            self.next_waypoint = 0;
        }

        if self.navigator_in_range(scene.navigator) {
            if !self.chasing {
                tracing::debug!(anchor = %self.anchor, navigator = %scene.navigator, "patroller engaging");
            }
            self.chasing = true;
            return scene.step_towards(position, scene.navigator).unwrap_or(position);
        }
        if self.chasing {
            tracing::debug!(anchor = %self.anchor, "patroller resuming route");
            self.chasing = false;
        }

        // Try each waypoint at most once per tick; unreachable ones are skipped.
        for _ in 0..self.waypoints.len() {
            let target = self.waypoints[self.next_waypoint];
            if position == target {
                self.advance();
                continue;
            }
            match scene.step_towards(position, target) {
                Some(step) => return step,
                None => self.advance(),
            }
        }
        position
    }

    fn advance(&mut self) {
        self.next_waypoint = (self.next_waypoint + 1) % self.waypoints.len();
    }
}

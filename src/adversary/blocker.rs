use crate::grid::Cell;

use super::Scene;

/// Moves to cut the navigator off rather than chase it.
///
/// The navigator's position `lookahead` steps ahead is predicted from its
/// visible route, or else by extrapolating its last heading. The blocker
/// aims at the point `bias` of the way from that prediction to the goal.
#[derive(Debug)]
pub struct Blocker {
    lookahead: u32,
    bias: f64,
    last_intercept: Option<Cell>,
}

impl Blocker {
    pub fn new(lookahead: u32, bias: f64) -> Self {
        Blocker {
            lookahead,
            bias: bias.clamp(0.0, 1.0),
            last_intercept: None,
        }
    }

    /// The interception cell chosen on the most recent move.
    pub fn last_intercept(&self) -> Option<Cell> {
        self.last_intercept
    }

    /// Where the navigator is expected to be after `lookahead` steps.
    pub fn predict(&self, scene: &Scene<'_>) -> Cell {
        let ahead = self.lookahead as usize;
        if let Some(route) = scene.route {
            if let Some(i) = route.iter().position(|&c| c == scene.navigator) {
                return route[(i + ahead).min(route.len() - 1)];
            }
        }
        let mut predicted = scene.navigator;
        if let Some(heading) = scene.heading {
            for _ in 0..ahead {
                let next = predicted.step(heading);
                if !scene.env.is_valid(next) {
                    break;
                }
                predicted = next;
            }
        }
        predicted
    }

    /// Point between the prediction and the goal, snapped to the nearest
    /// free cell.
    pub fn intercept(&self, scene: &Scene<'_>) -> Cell {
        let predicted = self.predict(scene);
        let goal = scene.env.goal();
        let lerp = |from: i32, to: i32| from + (f64::from(to - from) * self.bias).round() as i32;
        let ideal = Cell::new(lerp(predicted.row, goal.row), lerp(predicted.col, goal.col));
        if scene.is_free(ideal) {
            return ideal;
        }
        scene
            .env
            .open_cells()
            .filter(|&c| scene.is_free(c))
            .min_by_key(|&c| (c.manhattan(ideal), c))
            .unwrap_or(predicted)
    }

    pub(super) fn next_cell(&mut self, position: Cell, scene: &Scene<'_>) -> Cell {
        let target = self.intercept(scene);
        if self.last_intercept != Some(target) {
            tracing::trace!(%target, "blocker retargeted");
        }
        self.last_intercept = Some(target);
        if position == target {
            return position;
        }
        scene.step_towards(position, target).unwrap_or(position)
    }
}

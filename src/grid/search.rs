use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use super::cell::Cell;
use super::environment::GridEnvironment;

/// Frontier entry ordered so that `BinaryHeap` pops the lowest `f` first.
/// Equal `f` prefers the larger `g` (deeper node), then insertion order, which
/// keeps searches deterministic.
#[derive(Debug, Clone, Copy)]
struct Frontier {
    f: f64,
    g: f64,
    seq: u64,
    cell: Cell,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| self.g.total_cmp(&other.g))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* over the environment's valid cells.
///
/// `step_cost(from, to)` must be positive. `heuristic(cell)` estimates the
/// remaining cost to `goal`. Cells for which `blocked` returns true are never
/// entered (the goal excepted). At most `max_expansions` cells are closed.
///
/// Returns the full path including `start` and `goal`, or `None`.
pub fn weighted_astar(
    env: &GridEnvironment,
    start: Cell,
    goal: Cell,
    mut step_cost: impl FnMut(Cell, Cell) -> f64,
    mut heuristic: impl FnMut(Cell) -> f64,
    blocked: impl Fn(Cell) -> bool,
    max_expansions: usize,
) -> Option<Vec<Cell>> {
    if !env.is_valid(start) || !env.is_valid(goal) {
        return None;
    }
    if start == goal {
        return Some(vec![start]);
    }

    let mut open = BinaryHeap::new();
    let mut closed: HashSet<Cell> = HashSet::new();
    let mut came_from: HashMap<Cell, Cell> = HashMap::new();
    let mut g_score: HashMap<Cell, f64> = HashMap::new();
    let mut seq = 0u64;

    g_score.insert(start, 0.0);
    open.push(Frontier {
        f: heuristic(start),
        g: 0.0,
        seq,
        cell: start,
    });

    while let Some(Frontier { cell: current, g, .. }) = open.pop() {
        if current == goal {
            return Some(reconstruct(&came_from, current));
        }
        if !closed.insert(current) {
            continue;
        }
        if closed.len() > max_expansions {
            tracing::debug!(max_expansions, "A* expansion limit reached");
            return None;
        }

        for neighbor in env.neighbors(current) {
            if closed.contains(&neighbor) || (neighbor != goal && blocked(neighbor)) {
                continue;
            }
            let tentative = g + step_cost(current, neighbor);
            if tentative < *g_score.get(&neighbor).unwrap_or(&f64::INFINITY) {
                came_from.insert(neighbor, current);
                g_score.insert(neighbor, tentative);
                seq += 1;
                open.push(Frontier {
                    f: tentative + heuristic(neighbor),
                    g: tentative,
                    seq,
                    cell: neighbor,
                });
            }
        }
    }
    None
}

fn reconstruct(came_from: &HashMap<Cell, Cell>, mut current: Cell) -> Vec<Cell> {
    let mut path = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

/// Unit-cost shortest path with a Manhattan heuristic, skipping cells for
/// which `blocked` returns true.
pub fn shortest_path(
    env: &GridEnvironment,
    start: Cell,
    goal: Cell,
    blocked: impl Fn(Cell) -> bool,
) -> Option<Vec<Cell>> {
    weighted_astar(
        env,
        start,
        goal,
        |_, _| 1.0,
        |c| c.manhattan(goal) as f64,
        blocked,
        env.cell_count(),
    )
}

pub fn is_reachable(env: &GridEnvironment, start: Cell, goal: Cell) -> bool {
    shortest_path(env, start, goal, |_| false).is_some()
}

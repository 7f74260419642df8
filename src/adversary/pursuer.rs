use crate::ai::QLearningAgent;
use crate::grid::Cell;

use super::Scene;

/// Chases the navigator but never closes to within `standoff` cells.
///
/// A trained adversary policy, when attached, is followed as long as its
/// move keeps the standoff; otherwise the pursuer steps along a shortest path.
#[derive(Debug)]
pub struct Pursuer {
    standoff: u32,
    policy: Option<QLearningAgent>,
}

impl Pursuer {
    pub fn new(standoff: u32) -> Self {
        Pursuer {
            standoff,
            policy: None,
        }
    }

    pub fn with_policy(standoff: u32, policy: QLearningAgent) -> Self {
        Pursuer {
            standoff,
            policy: Some(policy),
        }
    }

    pub fn standoff(&self) -> u32 {
        self.standoff
    }

    pub fn set_policy(&mut self, policy: QLearningAgent) {
        self.policy = Some(policy);
    }

    pub(super) fn next_cell(&mut self, position: Cell, scene: &Scene<'_>) -> Cell {
        let keeps_standoff = |cell: Cell| cell.manhattan(scene.navigator) >= self.standoff;

        if let Some(policy) = self.policy.as_ref().filter(|p| p.is_trained()) {
            let step = position.step(policy.best_action(position));
            if scene.is_free(step) && keeps_standoff(step) {
                return step;
            }
        }

        if let Some(step) = scene.step_towards(position, scene.navigator) {
            if scene.is_free(step) && keeps_standoff(step) {
                return step;
            }
        }

        self.hold_standoff(position, scene)
    }

    /// Best of staying put or a free neighbour: the closest option at or
    /// beyond the standoff, else the farthest option. Staying wins ties.
    fn hold_standoff(&self, position: Cell, scene: &Scene<'_>) -> Cell {
        let options: Vec<Cell> = std::iter::once(position)
            .chain(scene.free_neighbors(position))
            .collect();
        let distance = |cell: &Cell| cell.manhattan(scene.navigator);

        let mut best: Option<Cell> = None;
        for &cell in options.iter().filter(|c| distance(c) >= self.standoff) {
            if best.map_or(true, |b| distance(&cell) < distance(&b)) {
                best = Some(cell);
            }
        }
        if let Some(cell) = best {
            return cell;
        }

        let mut retreat = position;
        for &cell in &options {
            if distance(&cell) > distance(&retreat) {
                retreat = cell;
            }
        }
        retreat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adversary::{Adversary, Behavior};
    use crate::ai::{Objective, QLearningConfig, ShapedReward};
    use crate::grid::GridEnvironment;
    use crate::training::session::{CancelToken, LivePosition};

    fn open_env(size: usize) -> GridEnvironment {
        let last = size as i32 - 1;
        GridEnvironment::new(size, size, Cell::new(0, 0), Cell::new(last, last)).unwrap()
    }

    #[test]
    fn test_closes_to_standoff_then_plateaus() {
        let env = open_env(10);
        let navigator = Cell::new(0, 0);
        let mut adversary =
            Adversary::new(Cell::new(5, 5), 2, Behavior::Pursuer(Pursuer::new(3)));
        let scene = Scene::new(&env, navigator);

        let mut distances = vec![adversary.position().manhattan(navigator)];
        for _ in 0..40 {
            if adversary.gate().counter() + 1 >= adversary.gate().threshold() {
                adversary.get_next_move(&scene);
                distances.push(adversary.position().manhattan(navigator));
            } else {
                adversary.get_next_move(&scene);
            }
        }

        let first_standoff = distances.iter().position(|&d| d == 3).unwrap();
        for pair in distances[..=first_standoff].windows(2) {
            assert_eq!(pair[1] + 1, pair[0], "distance must fall by one per move");
        }
        assert!(distances[first_standoff..].iter().all(|&d| d == 3));
    }

    #[test]
    fn test_retreats_when_too_close() {
        let env = open_env(10);
        let mut pursuer = Pursuer::new(3);
        let scene = Scene::new(&env, Cell::new(4, 4));
        let next = pursuer.next_cell(Cell::new(4, 5), &scene);
        assert_eq!(next.manhattan(Cell::new(4, 4)), 2);
    }

    #[test]
    fn test_takes_alternative_when_path_step_is_occupied() {
        let env = open_env(10);
        let mut pursuer = Pursuer::new(1);
        let occupied = [Cell::new(5, 4)];
        let scene = Scene::new(&env, Cell::new(5, 0)).with_occupied(&occupied);
        let next = pursuer.next_cell(Cell::new(5, 5), &scene);
        assert_ne!(next, Cell::new(5, 4));
        assert!(next.is_adjacent(Cell::new(5, 5)));
    }

    #[test]
    fn test_stays_when_walled_in() {
        let mut env = open_env(5);
        for cell in [Cell::new(1, 2), Cell::new(3, 2), Cell::new(2, 1), Cell::new(2, 3)] {
            env.set_obstacle(cell, true);
        }
        let mut pursuer = Pursuer::new(3);
        let scene = Scene::new(&env, Cell::new(4, 4));
        assert_eq!(pursuer.next_cell(Cell::new(2, 2), &scene), Cell::new(2, 2));
    }

    #[test]
    fn test_follows_trained_policy() {
        let env = open_env(6);
        // The policy learned to chase (5, 5); the navigator is elsewhere, so
        // following it is distinguishable from the shortest-path fallback.
        let quarry = LivePosition::new(Cell::new(5, 5));
        let policy = QLearningAgent::for_environment(
            &env,
            QLearningConfig {
                seed: Some(4),
                ..Default::default()
            },
        );
        policy
            .train(
                &env,
                Cell::new(0, 5),
                &Objective::adversary(quarry, ShapedReward::default()),
                1500,
                &mut |_| {},
                &CancelToken::new(),
            )
            .unwrap();

        let scene = Scene::new(&env, Cell::new(0, 0));
        let mut untrained = Pursuer::new(3);
        assert_eq!(untrained.next_cell(Cell::new(0, 5), &scene), Cell::new(0, 4));
        let mut pursuer = Pursuer::with_policy(3, policy);
        assert_eq!(pursuer.next_cell(Cell::new(0, 5), &scene), Cell::new(1, 5));
    }
}

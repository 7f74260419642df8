use crate::ai::QLearningAgent;
use crate::grid::{Action, Cell, GridEnvironment};

use super::{Adversary, AdversaryConfig, AdversaryKind, Scene};

/// The adversary roster. Members never share a cell.
#[derive(Debug, Default)]
pub struct Squad {
    members: Vec<Adversary>,
}

impl Squad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the configured roster, skipping entries that cannot be placed.
    pub fn from_config(config: &AdversaryConfig, env: &GridEnvironment) -> Self {
        let mut squad = Squad::new();
        for (i, entry) in config.roster.iter().enumerate() {
            let adversary = Adversary::from_kind(entry.kind, entry.position, config, i);
            if !squad.place(adversary, env) {
                tracing::warn!(kind = %entry.kind, position = %entry.position, "skipped roster entry");
            }
        }
        squad
    }

    /// Add an adversary. Rejected on invalid cells, the navigator, the goal
    /// and cells another member holds.
    pub fn place(&mut self, adversary: Adversary, env: &GridEnvironment) -> bool {
        let cell = adversary.position();
        if !env.is_valid(cell) || cell == env.navigator() || cell == env.goal() || self.occupies(cell) {
            return false;
        }
        self.members.push(adversary);
        true
    }

    /// Remove whichever member stands on `cell`.
    pub fn remove_at(&mut self, cell: Cell) -> Option<Adversary> {
        let index = self.members.iter().position(|a| a.position() == cell)?;
        Some(self.members.remove(index))
    }

    pub fn occupies(&self, cell: Cell) -> bool {
        self.members.iter().any(|a| a.position() == cell)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Adversary> {
        self.members.iter()
    }

    pub fn positions(&self) -> Vec<Cell> {
        self.members.iter().map(Adversary::position).collect()
    }

    /// Give every pursuer the trained adversary policy. Returns how many
    /// took it.
    pub fn attach_policy(&mut self, policy: &QLearningAgent) -> usize {
        self.members
            .iter_mut()
            .filter(|a| a.kind() == AdversaryKind::Pursuer)
            .map(|a| a.attach_policy(policy.clone()))
            .filter(|&attached| attached)
            .count()
    }

    /// Give every member its move for this navigator step, in roster order.
    /// Each member sees the others' positions as already updated.
    pub fn advance(
        &mut self,
        env: &GridEnvironment,
        navigator: Cell,
        heading: Option<Action>,
        route: Option<&[Cell]>,
    ) -> Vec<Cell> {
        for i in 0..self.members.len() {
            let occupied: Vec<Cell> = self
                .members
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, a)| a.position())
                .collect();
            let scene = Scene::new(env, navigator)
                .with_heading(heading)
                .with_route(route)
                .with_occupied(&occupied);
            self.members[i].get_next_move(&scene);
        }
        self.positions()
    }

    /// True when any member stands on the navigator's cell.
    pub fn captures(&self, navigator: Cell) -> bool {
        self.occupies(navigator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adversary::{Behavior, Pursuer, RandomWalker, RosterEntry};
    use std::collections::HashSet;

    fn env() -> GridEnvironment {
        GridEnvironment::new(10, 10, Cell::new(0, 0), Cell::new(9, 9)).unwrap()
    }

    fn walker(at: Cell, seed: u64) -> Adversary {
        Adversary::new(at, 1, Behavior::RandomWalker(RandomWalker::new(Some(seed))))
    }

    #[test]
    fn test_place_rejections() {
        let mut env = env();
        env.set_obstacle(Cell::new(4, 4), true);
        let mut squad = Squad::new();
        assert!(!squad.place(walker(Cell::new(4, 4), 1), &env));
        assert!(!squad.place(walker(Cell::new(0, 0), 1), &env));
        assert!(!squad.place(walker(Cell::new(9, 9), 1), &env));
        assert!(!squad.place(walker(Cell::new(10, 0), 1), &env));
        assert!(squad.place(walker(Cell::new(5, 5), 1), &env));
        assert!(!squad.place(walker(Cell::new(5, 5), 2), &env));
        assert_eq!(squad.len(), 1);
    }

    #[test]
    fn test_members_never_collide() {
        let env = env();
        let mut squad = Squad::new();
        for (i, cell) in [Cell::new(4, 4), Cell::new(4, 5), Cell::new(5, 4), Cell::new(5, 5)]
            .into_iter()
            .enumerate()
        {
            assert!(squad.place(walker(cell, i as u64), &env));
        }
        for _ in 0..100 {
            let positions = squad.advance(&env, Cell::new(0, 0), None, None);
            let unique: HashSet<_> = positions.iter().collect();
            assert_eq!(unique.len(), positions.len());
            assert!(positions.iter().all(|&c| env.is_valid(c)));
        }
    }

    #[test]
    fn test_from_config_skips_bad_entries() {
        let env = env();
        let config = AdversaryConfig {
            roster: vec![
                RosterEntry::new(AdversaryKind::Pursuer, Cell::new(5, 5)),
                RosterEntry::new(AdversaryKind::Blocker, Cell::new(5, 5)),
                RosterEntry::new(AdversaryKind::Patroller, Cell::new(50, 5)),
                RosterEntry::new(AdversaryKind::RandomWalker, Cell::new(2, 7)),
            ],
            seed: Some(3),
            ..Default::default()
        };
        let squad = Squad::from_config(&config, &env);
        let kinds: Vec<_> = squad.iter().map(Adversary::kind).collect();
        assert_eq!(kinds, vec![AdversaryKind::Pursuer, AdversaryKind::RandomWalker]);
    }

    #[test]
    fn test_capture_and_remove() {
        let env = env();
        let mut squad = Squad::new();
        let pursuer = Adversary::new(Cell::new(0, 2), 1, Behavior::Pursuer(Pursuer::new(0)));
        assert!(squad.place(pursuer, &env));
        assert!(!squad.captures(Cell::new(0, 0)));
        squad.advance(&env, Cell::new(0, 0), None, None);
        squad.advance(&env, Cell::new(0, 0), None, None);
        assert!(squad.captures(Cell::new(0, 0)));
        assert!(squad.remove_at(Cell::new(0, 0)).is_some());
        assert!(squad.is_empty());
    }
}

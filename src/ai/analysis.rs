use std::collections::{HashSet, VecDeque};

use crate::ai::heat_map::HeatMap;
use crate::grid::{Cell, GridEnvironment};

/// Route cells with at most this many open neighbours are chokepoints.
const CHOKEPOINT_MAX_EXITS: usize = 2;
/// Safe-zone cells keep at least this Manhattan distance from the route.
const SAFE_ROUTE_CLEARANCE: u32 = 3;
/// Heat percentile under which a cell counts as low-traffic.
const LOW_TRAFFIC_PERCENTILE: f64 = 25.0;
/// Heat percentile above which a cell counts as part of the corridor.
const CORRIDOR_PERCENTILE: f64 = 75.0;
/// Suggested adversary cells keep more than this distance from the start.
const START_CLEARANCE: u32 = 3;

/// Read-only report over a trained heat surface.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvironmentReport {
    /// Route the analysis was computed against; empty if the goal is
    /// unreachable.
    pub route: Vec<Cell>,
    /// Narrow cells on the route.
    pub chokepoints: Vec<Cell>,
    /// 4-connected regions of low-heat cells far from the route.
    pub safe_zones: Vec<Vec<Cell>>,
    /// Off-route cells of moderate heat near the middle of the route, best
    /// first.
    pub suggested_adversary_cells: Vec<Cell>,
}

/// Derive the report. Pure: depends only on its arguments.
pub fn analyze(
    heat: &HeatMap,
    env: &GridEnvironment,
    start: Cell,
    goal: Cell,
    route: Option<&[Cell]>,
    adversary_count: usize,
) -> EnvironmentReport {
    let route = route.unwrap_or(&[]);
    let on_route: HashSet<Cell> = route.iter().copied().collect();
    let interior = |cell: Cell| env.is_valid(cell) && cell != start && cell != goal;

    let chokepoints = route
        .iter()
        .copied()
        .filter(|&cell| interior(cell))
        .filter(|&cell| env.neighbors(cell).count() <= CHOKEPOINT_MAX_EXITS)
        .collect();

    let low_traffic = heat.percentile(LOW_TRAFFIC_PERCENTILE).unwrap_or(0.0);
    let safe: HashSet<Cell> = env
        .open_cells()
        .filter(|&cell| interior(cell) && !on_route.contains(&cell))
        .filter(|&cell| heat.get(cell) < low_traffic)
        .filter(|&cell| route.iter().all(|&r| cell.manhattan(r) >= SAFE_ROUTE_CLEARANCE))
        .collect();
    let safe_zones = connected_regions(env, &safe);

    let suggested_adversary_cells = suggest_adversary_cells(
        heat,
        env,
        start,
        route,
        &on_route,
        interior,
        adversary_count,
    );

    EnvironmentReport {
        route: route.to_vec(),
        chokepoints,
        safe_zones,
        suggested_adversary_cells,
    }
}

/// Group `cells` into 4-connected regions, seeded in row-major order.
fn connected_regions(env: &GridEnvironment, cells: &HashSet<Cell>) -> Vec<Vec<Cell>> {
    let mut seen = HashSet::new();
    let mut regions = Vec::new();
    for seed in env.open_cells().filter(|c| cells.contains(c)) {
        if !seen.insert(seed) {
            continue;
        }
        let mut region = Vec::new();
        let mut queue = VecDeque::from([seed]);
        while let Some(cell) = queue.pop_front() {
            region.push(cell);
            for next in env.neighbors(cell) {
                if cells.contains(&next) && seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        region.sort();
        regions.push(region);
    }
    regions
}

fn suggest_adversary_cells(
    heat: &HeatMap,
    env: &GridEnvironment,
    start: Cell,
    route: &[Cell],
    on_route: &HashSet<Cell>,
    interior: impl Fn(Cell) -> bool,
    count: usize,
) -> Vec<Cell> {
    if route.is_empty() || count == 0 {
        return Vec::new();
    }
    // Middle half of the route: far enough along to intercept, not yet at
    // the goal.
    let len = route.len();
    let middle: Vec<Cell> = route[len / 4..(len * 3 / 4).max(len / 4 + 1).min(len)].to_vec();
    let corridor = heat.percentile(CORRIDOR_PERCENTILE).unwrap_or(f64::INFINITY);

    let mut candidates: Vec<(bool, u32, f64, Cell)> = env
        .open_cells()
        .filter(|&cell| interior(cell) && !on_route.contains(&cell))
        .filter(|&cell| cell.manhattan(start) > START_CLEARANCE)
        .map(|cell| {
            let distance = middle
                .iter()
                .map(|&m| cell.manhattan(m))
                .min()
                .unwrap_or(u32::MAX);
            let value = heat.get(cell);
            (value > corridor, distance, value, cell)
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.cmp(&b.1))
            .then(b.2.total_cmp(&a.2))
            .then(a.3.cmp(&b.3))
    });
    candidates.into_iter().take(count).map(|(.., cell)| cell).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::pathfinder::{HeatMapConfig, HeatMapPathfinder};
    use crate::training::session::CancelToken;

    /// 7 wide, 5 tall, with a wall down column 3 pierced at row 2.
    fn gap_env() -> GridEnvironment {
        let mut env = GridEnvironment::new(7, 5, Cell::new(2, 0), Cell::new(2, 6)).unwrap();
        for row in [0, 1, 3, 4] {
            env.set_obstacle(Cell::new(row, 3), true);
        }
        env
    }

    #[test]
    fn test_gap_is_a_chokepoint() {
        let env = gap_env();
        let route: Vec<Cell> = (0..7).map(|col| Cell::new(2, col)).collect();
        let mut heat = HeatMap::new(7, 5);
        for &cell in &route {
            heat.add(cell, 5.0);
        }
        let report = analyze(&heat, &env, env.navigator(), env.goal(), Some(route.as_slice()), 2);
        assert_eq!(report.chokepoints, vec![Cell::new(2, 3)]);
    }

    #[test]
    fn test_safe_zones_keep_clear_of_route() {
        let env = GridEnvironment::new(10, 10, Cell::new(0, 0), Cell::new(0, 9)).unwrap();
        let route: Vec<Cell> = (0..10).map(|col| Cell::new(0, col)).collect();
        let mut heat = HeatMap::new(10, 10);
        for (i, &cell) in route.iter().enumerate() {
            heat.add(cell, 10.0 - i as f64);
        }
        let report = analyze(&heat, &env, env.navigator(), env.goal(), Some(route.as_slice()), 1);
        // Every cell from row 3 down is cold and clear of row 0.
        assert_eq!(report.safe_zones.len(), 1);
        assert_eq!(report.safe_zones[0].len(), 70);
        for zone in &report.safe_zones {
            for cell in zone {
                assert!(route.iter().all(|r| cell.manhattan(*r) >= 3));
            }
        }
    }

    #[test]
    fn test_separated_safe_regions() {
        let env = GridEnvironment::new(9, 9, Cell::new(0, 4), Cell::new(8, 4)).unwrap();
        let route: Vec<Cell> = (0..9).map(|row| Cell::new(row, 4)).collect();
        let mut heat = HeatMap::new(9, 9);
        for &cell in &route {
            heat.add(cell, 1.0);
        }
        let report = analyze(&heat, &env, env.navigator(), env.goal(), Some(route.as_slice()), 0);
        // Columns 0..=1 and 7..=8 are clear of the route on either side of it.
        assert_eq!(report.safe_zones.len(), 2);
        assert_eq!(report.safe_zones[0].len(), 18);
        assert!(report.suggested_adversary_cells.is_empty());
    }

    #[test]
    fn test_suggestions_are_off_route_and_away_from_start() {
        let env = GridEnvironment::new(10, 10, Cell::new(0, 0), Cell::new(9, 9)).unwrap();
        let pf = HeatMapPathfinder::for_environment(
            &env,
            HeatMapConfig {
                seed: Some(21),
                ..Default::default()
            },
        );
        pf.train(
            &env,
            env.navigator(),
            env.goal(),
            300,
            &[],
            &mut |_| {},
            &CancelToken::new(),
        )
        .unwrap();
        let report = pf
            .analyze_environment(&env, env.navigator(), env.goal(), 3)
            .unwrap();
        assert_eq!(report.route.last(), Some(&env.goal()));
        assert_eq!(report.suggested_adversary_cells.len(), 3);
        for cell in &report.suggested_adversary_cells {
            assert!(!report.route.contains(cell));
            assert!(cell.manhattan(env.navigator()) > 3);
            assert_ne!(*cell, env.goal());
        }
    }

    #[test]
    fn test_unreachable_goal_yields_empty_route() {
        let mut env = GridEnvironment::new(5, 5, Cell::new(0, 0), Cell::new(4, 4)).unwrap();
        for row in 0..5 {
            env.set_obstacle(Cell::new(row, 2), true);
        }
        let mut heat = HeatMap::new(5, 5);
        heat.add(Cell::new(0, 0), 1.0);
        let report = analyze(&heat, &env, env.navigator(), env.goal(), None, 2);
        assert!(report.route.is_empty());
        assert!(report.chokepoints.is_empty());
        assert!(report.suggested_adversary_cells.is_empty());
    }
}

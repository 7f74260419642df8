use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use grid_pursuit::adversary::{AdversaryKind, Squad};
use grid_pursuit::ai::{EnvironmentReport, HeatMapPathfinder, QLearningAgent};
use grid_pursuit::config::AppConfig;
use grid_pursuit::grid::{Cell, GridEnvironment};
use grid_pursuit::training::{LivePosition, MetricsSnapshot, Trainee, TrainingOrchestrator, TrainingUpdate};

/// Train the navigator policy and the heat map for a configured grid.
#[derive(Parser)]
#[command(name = "train", about = "Train grid navigation policies")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override number of Q-learning episodes
    #[arg(long)]
    episodes: Option<usize>,

    /// Override number of heat-map walks
    #[arg(long)]
    iterations: Option<usize>,

    /// Seed every random source for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Scatter random obstacles over the grid
    #[arg(long)]
    obstacles: bool,

    /// Also train the adversary policy, chasing the navigator's start cell
    #[arg(long)]
    adversary: bool,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", AppConfig::default_toml().context("serializing default config")?);
        return Ok(());
    }

    // Load configuration
    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    // Apply CLI overrides
    if let Some(episodes) = cli.episodes {
        config.training.episodes = episodes;
    }
    if let Some(iterations) = cli.iterations {
        config.training.heat_iterations = iterations;
    }
    if let Some(seed) = cli.seed {
        config.grid.seed = Some(seed);
        config.q_learning.seed = Some(seed);
        config.heat_map.seed = Some(seed);
        config.adversary.seed = Some(seed);
    }
    if config.training.episodes == 0 && config.training.heat_iterations == 0 {
        bail!("nothing to train: both episodes and heat-map iterations are 0");
    }
    config.validate().context("validating configuration")?;

    let env = config
        .grid
        .build_environment(cli.obstacles)
        .context("building environment")?;
    let squad = Squad::from_config(&config.adversary, &env);

    println!(
        "Grid {}x{} | navigator {} | goal {} | obstacles {} | adversaries {}",
        env.width(),
        env.height(),
        env.navigator(),
        env.goal(),
        env.obstacle_count(),
        squad.len(),
    );
    println!("-------------------------------------------");

    let navigator_policy = QLearningAgent::for_environment(&env, config.q_learning.clone());
    let adversary_policy = QLearningAgent::for_environment(&env, config.q_learning.clone());
    let pathfinder = HeatMapPathfinder::for_environment(&env, config.heat_map.clone());
    let mut orchestrator = TrainingOrchestrator::new();

    if config.training.episodes > 0 {
        orchestrator
            .start_navigator_training(
                &navigator_policy,
                env.clone(),
                env.navigator(),
                env.goal(),
                config.reward,
                config.training.episodes,
            )
            .context("starting navigator training")?;
    }
    if config.training.heat_iterations > 0 {
        orchestrator
            .start_heat_map(
                &pathfinder,
                env.clone(),
                env.navigator(),
                env.goal(),
                config.training.heat_iterations,
                squad.positions(),
            )
            .context("starting heat-map training")?;
    }
    let pursuer_start = squad
        .iter()
        .find(|a| a.kind() == AdversaryKind::Pursuer)
        .map(|a| a.position());
    if cli.adversary && config.training.episodes > 0 {
        match pursuer_start {
            Some(start) => orchestrator
                .start_adversary_training(
                    &adversary_policy,
                    env.clone(),
                    start,
                    LivePosition::new(env.navigator()),
                    config.reward,
                    config.training.episodes,
                )
                .context("starting adversary training")?,
            None => println!("No pursuer in the roster; skipping adversary training"),
        }
    }

    let poll_interval = Duration::from_millis(100);
    let mut failures = 0;
    loop {
        for update in orchestrator.poll() {
            match update {
                TrainingUpdate::Metrics(trainee, snap) => print_progress(trainee, &snap),
                TrainingUpdate::Finished(trainee, outcome) => println!(
                    "  >> {} {} after {} iterations ({} successful)",
                    trainee.name(),
                    if outcome.cancelled { "cancelled" } else { "finished" },
                    outcome.iterations_completed,
                    outcome.successes,
                ),
                TrainingUpdate::Failed(trainee, message) => {
                    failures += 1;
                    eprintln!("  >> {} failed: {}", trainee.name(), message);
                }
            }
        }
        if !orchestrator.any_running() {
            break;
        }
        std::thread::sleep(poll_interval);
    }
    println!("-------------------------------------------");

    if failures > 0 {
        bail!("{failures} training session(s) failed");
    }

    if navigator_policy.is_trained() {
        let path = navigator_policy.best_path(&env, env.navigator(), env.goal(), env.cell_count());
        print_route("Q-learning route", &path, env.goal());
    }
    if let (Some(start), true) = (pursuer_start, adversary_policy.is_trained()) {
        let path = adversary_policy.best_path(&env, start, env.navigator(), env.cell_count());
        print_route("Adversary route", &path, env.navigator());
    }
    match pathfinder.find_path(&env, env.navigator(), env.goal()) {
        Some(path) => print_route("Heat-map route", &path, env.goal()),
        None => println!("Heat-map route: none (goal unreachable)"),
    }
    if let Some(report) = pathfinder.analyze_environment(&env, env.navigator(), env.goal(), squad.len()) {
        print_report(&report, &env);
    }
    Ok(())
}

fn print_progress(trainee: Trainee, snap: &MetricsSnapshot) {
    let mut line = format!(
        "[{}] {}/{} | success: {:.1}% | avg_len: {:.1}",
        trainee.name(),
        snap.iteration,
        snap.total_iterations,
        snap.success_rate * 100.0,
        snap.avg_length,
    );
    if let Some(epsilon) = snap.epsilon {
        line.push_str(&format!(" | eps: {epsilon:.3}"));
    }
    if let Some(best) = snap.best_length {
        line.push_str(&format!(" | best: {best}"));
    }
    line.push_str(&format!(" | {:.0} it/s", snap.iterations_per_sec));
    println!("{line}");
}

fn print_route(label: &str, path: &[Cell], target: Cell) {
    let reached = path.last() == Some(&target);
    println!(
        "{label}: {} moves{}",
        path.len().saturating_sub(1),
        if reached { "" } else { " (does not reach the target)" },
    );
}

fn print_report(report: &EnvironmentReport, env: &GridEnvironment) {
    println!("Environment analysis:");
    println!(
        "  chokepoints: {}",
        report
            .chokepoints
            .iter()
            .map(Cell::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    );
    let zone_cells: usize = report.safe_zones.iter().map(Vec::len).sum();
    println!(
        "  safe zones: {} ({} of {} open cells)",
        report.safe_zones.len(),
        zone_cells,
        env.open_cells().count(),
    );
    println!(
        "  suggested adversary cells: {}",
        report
            .suggested_adversary_cells
            .iter()
            .map(Cell::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    );
}

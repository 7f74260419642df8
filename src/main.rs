use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use grid_pursuit::adversary::Squad;
use grid_pursuit::config::AppConfig;
use grid_pursuit::simulation::{Ending, Simulation};

/// Run a headless pursuit: the navigator follows the heat-map route while
/// the configured adversaries move after every navigator step.
#[derive(Parser)]
#[command(name = "grid_pursuit", about = "Headless grid pursuit simulation")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Stop after this many navigator steps
    #[arg(long, default_value_t = 500)]
    ticks: usize,

    /// Seed every random source for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Scatter random obstacles over the grid
    #[arg(long)]
    obstacles: bool,

    /// Train the adversary policy in the background and hand it to the
    /// pursuers once it is ready
    #[arg(long)]
    adversary_policy: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(seed) = cli.seed {
        config.grid.seed = Some(seed);
        config.q_learning.seed = Some(seed);
        config.heat_map.seed = Some(seed);
        config.adversary.seed = Some(seed);
    }
    config.validate().context("validating configuration")?;

    let env = config
        .grid
        .build_environment(cli.obstacles)
        .context("building environment")?;
    let squad = Squad::from_config(&config.adversary, &env);
    let mut sim = Simulation::new(env, squad, &config);

    println!(
        "Grid {}x{} | navigator {} | goal {} | obstacles {} | adversaries {}",
        sim.env().width(),
        sim.env().height(),
        sim.env().navigator(),
        sim.env().goal(),
        sim.env().obstacle_count(),
        sim.squad().len(),
    );

    if cli.adversary_policy
        && !sim
            .start_adversary_policy(config.reward, config.training.episodes)
            .context("starting adversary training")?
    {
        println!("No pursuer in the roster; skipping adversary training");
    }

    // Initial heat map, with the roster's starting cells as danger.
    sim.retrain_heat_map();
    let routed = sim.wait_for_heat_map(|snap| {
        println!(
            "[heat map] {}/{} | success: {:.1}%",
            snap.iteration,
            snap.total_iterations,
            snap.success_rate * 100.0
        );
    });
    if !routed {
        println!("  no route from {}; holding position", sim.env().navigator());
    }
    println!("-------------------------------------------");

    let mut ending = Ending::TickLimit;
    for tick in 1..=cli.ticks {
        if let Some(end) = sim.tick() {
            ending = end;
            println!("Tick {tick}: {:?}", end);
            break;
        }
        if tick % 25 == 0 {
            println!(
                "Tick {tick}: navigator {} | adversaries {:?} | recalculations {}",
                sim.env().navigator(),
                sim.squad().positions(),
                sim.tracker().recalculations(),
            );
        }
    }

    match ending {
        Ending::Arrived => println!("Navigator reached the goal in {} moves", sim.walked().len() - 1),
        Ending::Captured => println!("Navigator captured at {}", sim.env().navigator()),
        Ending::BudgetExhausted => println!("No safe route after repeated recalculation"),
        Ending::TickLimit => println!("Tick limit reached at {}", sim.env().navigator()),
    }
    sim.finish(ending);
    println!(
        "Route feedback: {} successes, {} failures",
        sim.ledger().successes(),
        sim.ledger().failures()
    );
    Ok(())
}

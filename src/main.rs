// src/main.rs
// Entry point for the UcvNav demo: launches one simulator worker and drives it with a
// uniformly random policy for a few episodes.

// Imports dependencies and UcvNav modules.
// - clap: command line arguments.
// - env_logger: logging, level taken from RUST_LOG.
// - fastrand: random policy.
use clap::Parser;
use log::{info, warn};
use std::error::Error;
use std::path::PathBuf;
use ucv_nav::{UcvConfig, UcvEnv};

/// Random-policy rollout against an UnrealCV simulator
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Worker slot, selects the simulator binary directory
    #[arg(short, long, default_value_t = 0)]
    worker: usize,

    /// Episodes to run
    #[arg(short, long, default_value_t = 3)]
    episodes: usize,

    /// Step limit per episode
    #[arg(long, default_value_t = 200)]
    max_steps: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();
    info!("Starting UcvNav worker {}", args.worker);

    let config = UcvConfig::load(&args.config)?;
    let mut env = UcvEnv::new(&config, args.worker)?;
    let mut policy = match config.seed {
        Some(seed) => fastrand::Rng::with_seed(seed),
        None => fastrand::Rng::new(),
    };

    for episode in 0..args.episodes {
        if episode > 0 {
            env.reset()?;
        }
        let mut total = 0.0;
        let mut steps = 0;
        while steps < args.max_steps {
            let outcome = env.step(policy.usize(0..env.action_count()))?;
            total += outcome.reward;
            steps += 1;
            if outcome.info.goal_reached {
                info!("Goal reached after {} steps", steps);
            }
            if outcome.terminal {
                break;
            }
        }
        if steps == args.max_steps {
            warn!("Episode {} hit the step limit", episode + 1);
        }
        info!("Episode {}: {} steps, return {:.3}", episode + 1, steps, total);
    }

    let metrics = env.agent().metrics();
    info!(
        "Done: {} steps, {} episodes, {} collisions, {} goals, {} restarts",
        metrics.steps, metrics.episodes, metrics.collisions, metrics.goals_reached, metrics.restarts
    );
    env.close();
    Ok(())
}

// Weaknesses:
// - One worker per process; several workers need several processes with distinct slots.
// - The random policy only exercises the plumbing.

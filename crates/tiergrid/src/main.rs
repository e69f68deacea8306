//! tiergrid — elastic service tier simulator.
//!
//! Builds a `TierManager` from `tier.toml`, plays synthetic traffic
//! against it while the autoscaler resizes the pools, and reports what
//! happened.
//!
//! # Usage
//!
//! ```text
//! tiergrid simulate --config tier.toml --duration 60s --max-rps 20
//! tiergrid simulate --mode budget --seed 7
//! tiergrid plan --capacity 100 --requests 450
//! tiergrid init-config > tier.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use tiergrid_core::{
    parse_duration, plan, RandomSource, ScalingMode, SystemRandom, TierConfig, TierError,
};
use tiergrid_manager::{Factories, TierManager};

mod services;
mod simulate;

use services::{Database, Profile, WebServer};
use simulate::TrafficGenerator;

#[derive(Parser)]
#[command(
    name = "tiergrid",
    about = "TierGrid — autoscaled service tier simulator",
    version,
    propagate_version = true
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run synthetic traffic against an autoscaled tier.
    Simulate {
        /// Path to tier.toml (defaults apply when omitted).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Scaling mode: bounded or budget.
        #[arg(long)]
        mode: Option<String>,
        /// Distribution policy: round_robin or least_connections.
        #[arg(long)]
        policy: Option<String>,
        /// How long to generate traffic, e.g. "90s" or "5m".
        #[arg(long)]
        duration: Option<String>,
        /// Upper bound on requests issued per second.
        #[arg(long)]
        max_rps: Option<u32>,
        /// Maximum concurrent in-flight requests.
        #[arg(long)]
        workers: Option<usize>,
        /// Seed for traffic and scaling randomness.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Size a static pool for a known request volume.
    Plan {
        /// Requests one service can absorb.
        #[arg(long)]
        capacity: u64,
        /// Total requests to place.
        #[arg(long)]
        requests: u64,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the default tier.toml.
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Command::Simulate {
            config,
            mode,
            policy,
            duration,
            max_rps,
            workers,
            seed,
        } => {
            let mut config = match config {
                Some(path) => TierConfig::from_file(&path)?,
                None => TierConfig::default(),
            };
            if let Some(mode) = mode {
                config.tier.mode = parse_mode(&mode)?;
            }
            if let Some(policy) = policy {
                config.tier.policy = policy;
            }
            if let Some(duration) = duration {
                config.simulation.duration = duration;
            }
            if let Some(max_rps) = max_rps {
                config.simulation.max_rps = max_rps;
            }
            if let Some(workers) = workers {
                config.simulation.workers = workers;
            }
            if seed.is_some() {
                config.simulation.seed = seed;
            }
            run_simulation(config).await
        }
        Command::Plan {
            capacity,
            requests,
            seed,
        } => {
            let mut rng = random_source(seed);
            let plan = plan(capacity, requests, rng.as_mut())?;
            for (i, assigned) in plan.assignments.iter().enumerate() {
                println!("Service: {}, Capacity: {assigned}", i + 1);
            }
            Ok(())
        }
        Command::InitConfig => {
            print!("{}", TierConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn parse_mode(mode: &str) -> Result<ScalingMode, TierError> {
    match mode {
        "bounded" => Ok(ScalingMode::Bounded),
        "budget" => Ok(ScalingMode::Budget),
        other => Err(TierError::Config(format!(
            "unknown scaling mode {other:?} (expected bounded or budget)"
        ))),
    }
}

fn random_source(seed: Option<u64>) -> Box<dyn RandomSource> {
    match seed {
        Some(seed) => Box::new(SystemRandom::seeded(seed)),
        None => Box::new(SystemRandom::new()),
    }
}

async fn run_simulation(config: TierConfig) -> anyhow::Result<()> {
    config.validate()?;
    let sim = &config.simulation;
    let duration = parse_duration(&sim.duration)?;
    let profile = Profile::from_config(sim);

    let factories = match config.tier.mode {
        ScalingMode::Bounded => Factories::Bounded(WebServer::factory("service", profile)),
        ScalingMode::Budget => Factories::Budget {
            compute: WebServer::factory("web", profile),
            storage: Database::factory("db", profile),
        },
    };

    info!(
        mode = ?config.tier.mode,
        policy = %config.tier.policy,
        duration_secs = duration.as_secs(),
        max_rps = sim.max_rps,
        workers = sim.workers,
        "starting simulation"
    );

    let manager = Arc::new(
        TierManager::from_config(&config, factories, random_source(sim.seed)).await?,
    );
    let mut traffic = TrafficGenerator::new(manager.clone(), sim.workers, sim.max_rps, sim.seed);

    let report = tokio::select! {
        report = traffic.run(duration) => Some(report?),
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping traffic");
            None
        }
    };
    drop(traffic);

    for tier in manager.tiers() {
        info!(
            tier = %tier.name(),
            services = ?tier.pool().ids().await,
            "final pool"
        );
    }

    match Arc::try_unwrap(manager) {
        Ok(manager) => manager.shutdown().await,
        Err(_) => warn!("requests still in flight, stopping without draining"),
    }

    if let Some(report) = report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

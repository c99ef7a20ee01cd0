//! ballot: Raft leader election simulation and fuzzing
//!
//! # Usage
//!
//! ```bash
//! # Fuzz for 10000 iterations with fuzzer seed 42
//! ballot fuzz
//!
//! # Fuzz with a different seed, reporting as JSON
//! ballot fuzz --iterations 50000 --seed 7 --json
//!
//! # Run one simulation with explicit parameters and node logging
//! ballot run --rng-seed 1234 --nodes 5 --trace
//!
//! # Replay a failing input printed by the fuzzer
//! ballot replay 010000000596002c01320064001027
//!
//! # Run the ping cluster demo
//! ballot pinger --seed 400
//! ```

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use ballot_sim::{
    CoverageFuzzer, FuzzInput, FuzzerConfig, SimConfig, SimulationResult, fuzz_input,
    run_pinger_cluster, run_simulation_with_config,
};

// ============================================================================
// CLI Configuration
// ============================================================================

#[derive(Parser)]
#[command(name = "ballot")]
#[command(version, about = "Deterministic simulation testing for Raft leader election", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for election safety violations
    Fuzz {
        /// Number of fuzzing iterations
        #[arg(short, long, default_value_t = 10_000)]
        iterations: u64,

        /// Seed for the fuzzer's own random source
        #[arg(short, long, default_value_t = 42)]
        seed: u64,

        /// Log progress every N iterations
        #[arg(long, default_value_t = 1000)]
        progress_interval: u64,

        /// Hex-encoded input to seed the corpus with
        #[arg(long)]
        seed_input: Option<String>,

        #[command(flatten)]
        sim: SimArgs,
    },

    /// Run one simulation with explicit parameters
    Run {
        #[command(flatten)]
        params: RunParams,

        #[command(flatten)]
        sim: SimArgs,
    },

    /// Re-run an input from its hex encoding
    Replay {
        /// Input bytes as hex, as printed in a violation report
        hex: String,

        #[command(flatten)]
        sim: SimArgs,
    },

    /// Run the ping cluster demo until it drains
    Pinger {
        /// Random seed
        #[arg(short, long, default_value_t = 400)]
        seed: u64,

        /// Number of nodes
        #[arg(short, long, default_value_t = 5)]
        nodes: u8,

        /// Maximum network delay in ticks
        #[arg(long, default_value_t = 100)]
        max_delay: u64,

        #[command(flatten)]
        sim: SimArgs,
    },
}

#[derive(Args)]
struct SimArgs {
    /// Maximum scheduling jitter in ticks
    #[arg(long, default_value_t = 100)]
    jitter: u64,

    /// Cap on steps per simulation
    #[arg(long)]
    max_steps_cap: Option<u32>,

    /// Forward node and runtime logs to the console
    #[arg(long)]
    trace: bool,
}

impl SimArgs {
    fn to_config(&self) -> SimConfig {
        let mut config = SimConfig::default().with_max_task_jitter(self.jitter);
        if let Some(cap) = self.max_steps_cap {
            config = config.with_max_steps_cap(cap);
        }
        if self.trace {
            config = config.with_tracing();
        }
        config
    }
}

#[derive(Args)]
struct RunParams {
    /// Seed for the simulation's random source
    #[arg(long, default_value_t = 0)]
    rng_seed: u32,

    /// Number of nodes (clamped to 3..=7)
    #[arg(long, default_value_t = 5)]
    nodes: u8,

    #[arg(long, default_value_t = 150)]
    election_timeout_min: u16,

    #[arg(long, default_value_t = 300)]
    election_timeout_max: u16,

    #[arg(long, default_value_t = 50)]
    heartbeat_interval: u16,

    #[arg(long, default_value_t = 100)]
    max_network_delay: u16,

    #[arg(long, default_value_t = 10_000)]
    max_steps: u16,
}

impl RunParams {
    fn to_input(&self) -> FuzzInput {
        FuzzInput {
            rng_seed: self.rng_seed,
            nr_nodes: self.nodes,
            election_timeout_min: self.election_timeout_min,
            election_timeout_max: self.election_timeout_max,
            heartbeat_interval: self.heartbeat_interval,
            max_network_delay: self.max_network_delay,
            max_steps: self.max_steps,
        }
        .normalized()
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    match cli.command {
        Commands::Fuzz {
            iterations,
            seed,
            progress_interval,
            seed_input,
            sim,
        } => fuzz(iterations, seed, progress_interval, seed_input.as_deref(), &sim, cli.json),
        Commands::Run { params, sim } => {
            let bytes = params.to_input().to_bytes();
            simulate(&bytes, &sim.to_config(), cli.json)
        }
        Commands::Replay { hex, sim } => {
            let bytes = fuzz_input::from_hex(&hex)
                .with_context(|| format!("invalid hex input: {hex}"))?;
            simulate(&bytes, &sim.to_config(), cli.json)
        }
        Commands::Pinger {
            seed,
            nodes,
            max_delay,
            sim,
        } => {
            let summary = run_pinger_cluster(seed, nodes, max_delay, &sim.to_config())
                .context("pinger simulation failed")?;
            if cli.json {
                print_json(&summary)?;
            } else {
                println!("Pinger simulation finished");
                println!("  steps:    {}", summary.steps_executed);
                println!("  time:     {}", summary.final_time);
                println!("  messages: {}", summary.network.messages_sent);
                println!("  rounds:   {:?}", summary.rounds_completed);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn fuzz(
    iterations: u64,
    seed: u64,
    progress_interval: u64,
    seed_input: Option<&str>,
    sim: &SimArgs,
    json: bool,
) -> Result<ExitCode> {
    let config = FuzzerConfig::default()
        .with_seed(seed)
        .with_progress_interval(progress_interval)
        .with_sim(sim.to_config());

    info!(iterations, seed, "raft fuzzer: coverage-guided state space exploration");
    let mut fuzzer = CoverageFuzzer::new(config);

    if let Some(hex) = seed_input {
        let bytes = fuzz_input::from_hex(hex)
            .with_context(|| format!("invalid hex seed input: {hex}"))?;
        fuzzer.seed_corpus(bytes);
    }

    let report = if fuzzer.has_violation() {
        fuzzer.report()
    } else {
        fuzzer.run(iterations)
    };

    if json {
        print_json(&report)?;
    } else {
        println!();
        println!("=== Final Results ===");
        println!("Iterations: {}", report.iterations);
        println!("Coverage:   {} unique states", report.coverage);
        println!("Corpus:     {} interesting inputs", report.corpus_size);
        if let Some(violation) = &report.violation {
            println!("{}", violation.detail);
        }
    }

    Ok(if report.violation.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn simulate(bytes: &[u8], config: &SimConfig, json: bool) -> Result<ExitCode> {
    let result = run_simulation_with_config(bytes, config);

    if json {
        print_json(&result)?;
    } else {
        print_result(&result);
    }

    Ok(if result.oracle_violation {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_result(result: &SimulationResult) {
    let input = &result.input;
    println!("Simulation finished");
    println!(
        "  nodes: {}  timeouts: {}..{}  heartbeat: {}  max delay: {}",
        input.nr_nodes,
        input.election_timeout_min,
        input.election_timeout_max,
        input.heartbeat_interval,
        input.max_network_delay
    );
    println!("  steps:          {}", result.steps_executed);
    println!("  final time:     {}", result.final_time);
    println!("  unique states:  {}", result.visited_state_hashes.len());
    println!("  messages sent:  {}", result.network.messages_sent);
    for leader in &result.leaders {
        println!("  term {:>4}: leader {}", leader.term, leader.node);
    }
    match &result.error_detail {
        Some(detail) => println!("{detail}"),
        None => println!("  no violations"),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}

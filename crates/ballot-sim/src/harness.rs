//! Simulation harness.
//!
//! Turns raw fuzzer bytes into one complete, deterministic run of a Raft
//! cluster. Each step of the loop is:
//!
//! ```text
//! tick ──► route ──► run_until_blocked ──► capture + hash ──► oracle
//! ```
//!
//! The loop continues while there is queued work or an in-flight message,
//! up to `max_steps`. Any error raised inside the loop ends the run and is
//! reported as a violation; this is the only place errors become values.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::SimConfig;
use crate::error::{SimError, SimResult};
use crate::fuzz_input::{FuzzInput, to_hex};
use crate::message::{NodeId, Term};
use crate::network::NetworkStats;
use crate::node::{PingerNode, RaftNode, RaftTiming};
use crate::oracle::RaftOracle;
use crate::rng::SimRng;
use crate::router;
use crate::runtime::{Runtime, World};
use crate::state::ClusterState;

// ============================================================================
// Results
// ============================================================================

/// Leader recorded by the oracle for one term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderRecord {
    pub term: Term,
    pub node: NodeId,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Normalized parameters the run used.
    pub input: FuzzInput,
    /// Every distinct cluster state hash seen, one capture per step.
    pub visited_state_hashes: BTreeSet<u64>,
    /// True if the run ended with an error.
    pub oracle_violation: bool,
    /// One-line description of the error, if any.
    pub error_message: Option<String>,
    /// Full reproduction report, if any.
    pub error_detail: Option<String>,
    pub steps_executed: u64,
    pub final_time: u64,
    /// First leader seen for each term, ascending by term.
    pub leaders: Vec<LeaderRecord>,
    pub network: NetworkStats,
}

impl SimulationResult {
    pub fn is_ok(&self) -> bool {
        !self.oracle_violation
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// A Raft cluster wired to a runtime, oracle and coverage recorder.
pub struct Simulation {
    input: FuzzInput,
    world: World<RaftNode>,
    oracle: RaftOracle,
    visited: BTreeSet<u64>,
    steps: u64,
    max_steps: u64,
}

impl Simulation {
    /// Builds every component and enqueues each node's main loop.
    pub fn new(input: FuzzInput, config: &SimConfig) -> Self {
        let input = input.normalized();
        let timing = RaftTiming {
            election_timeout_min: u64::from(input.election_timeout_min),
            election_timeout_max: u64::from(input.election_timeout_max),
            heartbeat_interval: u64::from(input.heartbeat_interval),
        };
        let runtime = Runtime::new(
            SimRng::new(u64::from(input.rng_seed)),
            config.max_task_jitter,
            u64::from(input.max_network_delay),
        );
        let nodes = (0..input.nr_nodes)
            .map(|i| RaftNode::new(NodeId::new(i), input.nr_nodes, timing))
            .collect();

        let mut world = World::new(runtime, nodes);
        world.start_nodes();

        let max_steps = match config.max_steps_cap {
            Some(cap) => u64::from(input.max_steps).min(u64::from(cap)),
            None => u64::from(input.max_steps),
        };

        Self {
            input,
            world,
            oracle: RaftOracle::new(),
            visited: BTreeSet::new(),
            steps: 0,
            max_steps,
        }
    }

    /// Returns true while the loop condition holds.
    pub fn is_active(&self) -> bool {
        (self.world.runtime.has_work() || self.world.runtime.has_messages())
            && self.steps < self.max_steps
    }

    /// Executes one step and returns the hash of the captured state.
    pub fn step(&mut self) -> SimResult<u64> {
        self.world.runtime.tick();
        router::route(&mut self.world)?;
        self.world.run_until_blocked()?;

        let state = ClusterState::capture(&self.world.nodes);
        let hash = state.hash();
        self.visited.insert(hash);

        self.oracle
            .enforce_invariants(&self.world.nodes, self.world.runtime.get_time())?;
        self.steps += 1;
        Ok(hash)
    }

    /// Steps until the cluster goes quiet, `max_steps` is reached, or an error.
    pub fn run(&mut self) -> SimResult<()> {
        while self.is_active() {
            self.step()?;
        }
        Ok(())
    }

    pub fn input(&self) -> &FuzzInput {
        &self.input
    }

    pub fn nodes(&self) -> &[RaftNode] {
        &self.world.nodes
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn now(&self) -> u64 {
        self.world.runtime.get_time()
    }

    pub fn cluster_state(&self) -> ClusterState {
        ClusterState::capture(&self.world.nodes)
    }

    /// Packages the run into a result. `outcome` is what [`Simulation::run`] returned.
    pub fn into_result(self, outcome: SimResult<()>, raw: &[u8]) -> SimulationResult {
        let (error_message, error_detail) = match &outcome {
            Ok(()) => (None, None),
            Err(err) => (
                Some(err.to_string()),
                Some(violation_report(err, &self.input, raw)),
            ),
        };
        SimulationResult {
            input: self.input,
            oracle_violation: outcome.is_err(),
            error_message,
            error_detail,
            steps_executed: self.steps,
            final_time: self.world.runtime.get_time(),
            leaders: self
                .oracle
                .leaders()
                .iter()
                .map(|(&term, &node)| LeaderRecord { term, node })
                .collect(),
            network: self.world.runtime.network_stats(),
            visited_state_hashes: self.visited,
        }
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Runs one simulation from raw fuzzer bytes with the default configuration.
pub fn run_simulation(raw: &[u8]) -> SimulationResult {
    run_simulation_with_config(raw, &SimConfig::default())
}

/// Runs one simulation from raw fuzzer bytes.
///
/// Node and runtime logging is discarded unless `config.trace_enabled` is set.
pub fn run_simulation_with_config(raw: &[u8], config: &SimConfig) -> SimulationResult {
    if config.trace_enabled {
        simulate(raw, config)
    } else {
        tracing::subscriber::with_default(tracing::subscriber::NoSubscriber::default(), || {
            simulate(raw, config)
        })
    }
}

fn simulate(raw: &[u8], config: &SimConfig) -> SimulationResult {
    let input = FuzzInput::from_bytes(raw);
    let mut sim = Simulation::new(input, config);
    let outcome = sim.run();
    sim.into_result(outcome, raw)
}

/// Human-readable report with everything needed to reproduce a failing run.
pub fn violation_report(err: &SimError, input: &FuzzInput, raw: &[u8]) -> String {
    let title = if err.is_invariant_violation() {
        "ORACLE VIOLATION FOUND"
    } else {
        "SIMULATION ERROR"
    };
    format!(
        "\n=== {title} ===\n\
         Error: {err}\n\
         \n\
         === Reproduction Parameters ===\n\
         rng_seed:             {}\n\
         nr_nodes:             {}\n\
         election_timeout_min: {}\n\
         election_timeout_max: {}\n\
         heartbeat_interval:   {}\n\
         max_network_delay:    {}\n\
         max_steps:            {}\n\
         \n\
         === Raw Input Bytes (hex) ===\n\
         {}\n",
        input.rng_seed,
        input.nr_nodes,
        input.election_timeout_min,
        input.election_timeout_max,
        input.heartbeat_interval,
        input.max_network_delay,
        input.max_steps,
        to_hex(raw),
    )
}

// ============================================================================
// Pinger cluster
// ============================================================================

/// Summary of a pinger cluster run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingerSummary {
    pub seed: u64,
    pub nr_nodes: u8,
    pub steps_executed: u64,
    pub final_time: u64,
    /// Completed ping rounds per node, in id order.
    pub rounds_completed: Vec<u32>,
    pub network: NetworkStats,
}

/// Runs a pinger cluster until it drains.
///
/// Pinger main loops end after a fixed number of rounds, so the run always
/// terminates.
pub fn run_pinger_cluster(
    seed: u64,
    nr_nodes: u8,
    max_network_delay: u64,
    config: &SimConfig,
) -> SimResult<PingerSummary> {
    let runtime = Runtime::new(SimRng::new(seed), config.max_task_jitter, max_network_delay);
    let nodes = (0..nr_nodes)
        .map(|i| PingerNode::new(NodeId::new(i), nr_nodes))
        .collect();
    let mut world = World::new(runtime, nodes);
    world.start_nodes();

    tracing::info!(seed, nr_nodes, "pinger simulation starting");
    let mut steps = 0;
    while world.runtime.has_work() || world.runtime.has_messages() {
        world.runtime.tick();
        router::route(&mut world)?;
        world.run_until_blocked()?;
        steps += 1;
    }
    tracing::info!(steps, time = world.runtime.get_time(), "pinger simulation finished");

    Ok(PingerSummary {
        seed,
        nr_nodes,
        steps_executed: steps,
        final_time: world.runtime.get_time(),
        rounds_completed: world.nodes.iter().map(PingerNode::rounds_completed).collect(),
        network: world.runtime.network_stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_input(seed: u32) -> FuzzInput {
        FuzzInput {
            rng_seed: seed,
            nr_nodes: 3,
            max_steps: 2_000,
            ..FuzzInput::default()
        }
    }

    #[test]
    fn step_records_one_hash_per_step() {
        let mut sim = Simulation::new(small_input(1), &SimConfig::default());
        let h = sim.step().unwrap();
        assert_eq!(sim.steps(), 1);
        assert_eq!(sim.cluster_state().hash(), h);
    }

    #[test]
    fn max_steps_cap_bounds_the_run() {
        let config = SimConfig::default().with_max_steps_cap(150);
        let result = run_simulation_with_config(&small_input(7).to_bytes(), &config);
        assert!(result.is_ok());
        assert_eq!(result.steps_executed, 150);
        assert_eq!(result.final_time, 150);
    }

    #[test]
    fn a_leader_is_elected() {
        let input = FuzzInput {
            rng_seed: 3,
            nr_nodes: 3,
            ..FuzzInput::default()
        };
        let result = run_simulation(&input.to_bytes());
        assert!(result.is_ok(), "{:?}", result.error_detail);
        assert!(!result.leaders.is_empty());
        assert!(result.visited_state_hashes.len() > 1);
    }

    #[test]
    fn report_lists_every_parameter_and_hex() {
        let input = small_input(9);
        let raw = input.to_bytes();
        let err = SimError::InvariantViolation {
            invariant: "election_safety".into(),
            message: "two leaders".into(),
            time: 12,
        };
        let report = violation_report(&err, &input, &raw);
        assert!(report.contains("ORACLE VIOLATION FOUND"));
        for field in [
            "rng_seed:",
            "nr_nodes:",
            "election_timeout_min:",
            "election_timeout_max:",
            "heartbeat_interval:",
            "max_network_delay:",
            "max_steps:",
        ] {
            assert!(report.contains(field), "missing {field}");
        }
        assert!(report.contains(&to_hex(&raw)));
    }

    #[test]
    fn pinger_cluster_drains() {
        let summary = run_pinger_cluster(400, 5, 100, &SimConfig::default()).unwrap();
        assert_eq!(summary.rounds_completed, vec![crate::node::PING_ROUNDS; 5]);
        assert_eq!(summary.network.in_flight(), 0);
    }
}

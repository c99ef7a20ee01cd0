//! # ballot-sim: Deterministic Simulation Testing for Raft Leader Election
//!
//! This crate runs a Raft cluster (election only) inside a fully simulated
//! environment and searches for executions that elect two leaders in one term.

// Simulation code intentionally uses patterns that trigger pedantic lints
#![allow(clippy::cast_possible_truncation)] // Mutation arithmetic on bytes
#![allow(clippy::cast_possible_wrap)] // Mutation deltas
#![allow(clippy::module_name_repetitions)] // SimConfig, SimError, SimRng
#![allow(clippy::must_use_candidate)] // Accessors
#![allow(clippy::missing_errors_doc)] // Every error is a SimError variant
#![allow(clippy::new_without_default)] // Executor and tracker constructors
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
//!
//! ## Philosophy
//!
//! - **Reproducibility**: Same input bytes → same execution → same verdict
//! - **Time compression**: Thousands of election rounds in milliseconds
//! - **No real concurrency**: One logical thread; interleavings come from jitter
//! - **Invariant checking**: Election safety is verified after every step
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    CoverageFuzzer                                │
//! │   corpus ─► mutate ─► FuzzInput bytes ─► run_simulation ─┐      │
//! │     ▲                                                     │      │
//! │     └──────────── new state hashes ◄──────────────────────┘      │
//! └─────────────────────────────────────────────────────────────────┘
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Simulation Harness                            │
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────────────┐   │
//! │  │ SimClock    │   │ Scheduler    │   │ SimRng              │   │
//! │  │ (ticks)     │   │ (jitter)     │   │ (ChaCha8, seeded)   │   │
//! │  └─────────────┘   └──────────────┘   └─────────────────────┘   │
//! │                                                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐ │
//! │  │ World: Runtime (SimNetwork, RPC table) + RaftNode × N       │ │
//! │  └─────────────────────────────────────────────────────────────┘ │
//! │                                                                   │
//! │  ┌─────────────────────────────────────────────────────────────┐ │
//! │  │ Router ─► dispatch      ClusterState hash      RaftOracle   │ │
//! │  └─────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use ballot_sim::{FuzzInput, run_simulation};
//!
//! let input = FuzzInput { rng_seed: 7, max_steps: 500, ..FuzzInput::default() };
//! let result = run_simulation(&input.to_bytes());
//! assert!(!result.oracle_violation);
//! ```
//!
//! ## Key Concepts
//!
//! - **`SimClock`**: Virtual time, one tick per harness step
//! - **`Scheduler`**: Time-ordered task queue with random jitter
//! - **`World`**: Arena that owns the runtime and every node of a run
//! - **`RaftOracle`**: At most one leader per term, checked every step

pub mod clock;
pub mod coverage_fuzzer;
mod error;
pub mod executor;
pub mod fuzz_input;
pub mod harness;
pub mod message;
pub mod network;
pub mod node;
pub mod oracle;
pub mod rng;
pub mod router;
pub mod runtime;
pub mod scheduler;
pub mod state;

pub use clock::SimClock;
pub use coverage_fuzzer::{
    CoverageFuzzer, CoverageStats, CoverageTracker, FuzzReport, FuzzerConfig, MutationStrategy,
    StepOutcome, Violation,
};
pub use error::{SimError, SimResult};
pub use executor::TaskExecutor;
pub use fuzz_input::FuzzInput;
pub use harness::{
    LeaderRecord, PingerSummary, Simulation, SimulationResult, run_pinger_cluster,
    run_simulation, run_simulation_with_config,
};
pub use message::{Envelope, MessageId, MessageKind, NodeId, Payload, Term};
pub use network::{NetworkStats, SimNetwork};
pub use node::{Node, PingerNode, RaftNode, RaftTiming, Role};
pub use oracle::{ElectionSafetyChecker, InvariantResult, LeaderView, RaftOracle};
pub use rng::SimRng;
pub use runtime::{Runtime, World};
pub use scheduler::Scheduler;
pub use state::{ClusterState, NodeState};

// ============================================================================
// Simulation Configuration
// ============================================================================

/// Configuration shared by every run of a session.
///
/// Per-run parameters (seed, cluster size, timing) come from [`FuzzInput`];
/// this holds the knobs that are not part of the fuzzed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Upper bound on random scheduling jitter, in ticks.
    pub max_task_jitter: u64,
    /// Whether node and runtime logging reaches the installed subscriber.
    pub trace_enabled: bool,
    /// Optional ceiling on the decoded `max_steps`.
    pub max_steps_cap: Option<u32>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_task_jitter: scheduler::DEFAULT_MAX_JITTER,
            trace_enabled: false,
            max_steps_cap: None,
        }
    }
}

impl SimConfig {
    /// Sets the maximum scheduling jitter.
    pub fn with_max_task_jitter(mut self, jitter: u64) -> Self {
        self.max_task_jitter = jitter;
        self
    }

    /// Enables detailed tracing.
    pub fn with_tracing(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// Caps the number of steps any run may take.
    pub fn with_max_steps_cap(mut self, cap: u32) -> Self {
        self.max_steps_cap = Some(cap);
        self
    }
}

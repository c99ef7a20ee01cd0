//! Coverage-guided fuzzing of simulation inputs.
//!
//! The fuzzer searches the space of [`FuzzInput`] byte strings for a run that
//! breaks election safety. Coverage is the set of cluster state hashes seen
//! across every run of the session; an input that reaches a hash nobody has
//! reached before is kept in the corpus and mutated further.
//!
//! ## Mutation Strategies
//!
//! - **Bit flip**: flip one random bit
//! - **Byte replace**: overwrite one byte with a random value
//! - **Arithmetic**: add a delta in `[-17, 17]` to one byte, wrapping
//! - **Splice**: copy a random-length prefix of another corpus entry
//! - **Interesting seed**: overwrite the `rng_seed` field with a boundary value
//!
//! When coverage stalls the fuzzer stacks mutations: two passes after 100
//! fruitless iterations, three after 500.
//!
//! All fuzzer state lives in one [`CoverageFuzzer`] value, so independent
//! sessions never share coverage.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::SimConfig;
use crate::fuzz_input::FuzzInput;
use crate::harness::run_simulation_with_config;
use crate::rng::SimRng;

/// Values written into the `rng_seed` field by the interesting-seed mutation.
pub const INTERESTING_SEEDS: [u32; 5] = [0, 1, 0xFFFF_FFFF, 0x1234_5678, 0xDEAD_BEEF];

/// Stall thresholds after which mutations are stacked.
const STALL_DOUBLE: u64 = 100;
const STALL_TRIPLE: u64 = 500;

// ============================================================================
// Coverage Tracking
// ============================================================================

/// Set of cluster state hashes seen during one session.
#[derive(Debug, Clone, Default)]
pub struct CoverageTracker {
    states: HashSet<u64>,
    stats: CoverageStats,
}

/// Coverage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageStats {
    pub unique_states: usize,
    pub total_observations: usize,
}

impl CoverageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a state hash.
    ///
    /// Returns true if this is a new state.
    pub fn observe_state(&mut self, hash: u64) -> bool {
        self.stats.total_observations += 1;
        let is_new = self.states.insert(hash);
        if is_new {
            self.stats.unique_states = self.states.len();
        }
        is_new
    }

    /// Records every hash and returns how many were new.
    pub fn observe_all(&mut self, hashes: impl IntoIterator<Item = u64>) -> usize {
        hashes
            .into_iter()
            .filter(|&h| self.observe_state(h))
            .count()
    }

    pub fn contains(&self, hash: u64) -> bool {
        self.states.contains(&hash)
    }

    pub fn unique_states(&self) -> usize {
        self.states.len()
    }

    pub fn stats(&self) -> &CoverageStats {
        &self.stats
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Fuzzer session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzerConfig {
    /// Seed for the fuzzer's own random source (independent of run seeds).
    pub seed: u64,
    /// Configuration passed to every simulation run.
    #[serde(skip)]
    pub sim: SimConfig,
    /// Log progress every this many iterations (and on the first).
    pub progress_interval: u64,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            sim: SimConfig::default(),
            progress_interval: 1000,
        }
    }
}

impl FuzzerConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_sim(mut self, sim: SimConfig) -> Self {
        self.sim = sim;
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }
}

// ============================================================================
// Results
// ============================================================================

/// Mutation applied in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationStrategy {
    BitFlip,
    ByteReplace,
    Arithmetic,
    Splice,
    InterestingSeed,
}

impl MutationStrategy {
    pub const ALL: [MutationStrategy; 5] = [
        MutationStrategy::BitFlip,
        MutationStrategy::ByteReplace,
        MutationStrategy::Arithmetic,
        MutationStrategy::Splice,
        MutationStrategy::InterestingSeed,
    ];
}

/// A failing input and what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Raw bytes that reproduce the failure.
    pub input: Vec<u8>,
    /// Decoded parameters of the failing run.
    pub params: FuzzInput,
    pub message: String,
    /// Full reproduction report.
    pub detail: String,
}

/// Outcome of one fuzzing iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The input reached unseen states and joined the corpus.
    NewCoverage,
    /// Nothing new was reached.
    NoNewCoverage,
    /// The run failed; the session is over.
    Violation,
}

/// Summary of a fuzzing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzReport {
    pub seed: u64,
    pub iterations: u64,
    pub coverage: usize,
    pub corpus_size: usize,
    pub stalled_iterations: u64,
    pub violation: Option<Violation>,
}

// ============================================================================
// Coverage-Guided Fuzzer
// ============================================================================

/// One fuzzing session.
#[derive(Debug)]
pub struct CoverageFuzzer {
    config: FuzzerConfig,
    rng: SimRng,
    tracker: CoverageTracker,
    /// Inputs that reached new coverage, in discovery order.
    corpus: Vec<Vec<u8>>,
    iterations_since_new_coverage: u64,
    iterations: u64,
    violation: Option<Violation>,
}

impl CoverageFuzzer {
    pub fn new(config: FuzzerConfig) -> Self {
        Self {
            rng: SimRng::new(config.seed),
            config,
            tracker: CoverageTracker::new(),
            corpus: Vec::new(),
            iterations_since_new_coverage: 0,
            iterations: 0,
            violation: None,
        }
    }

    /// Creates a session with default settings and the given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(FuzzerConfig::default().with_seed(seed))
    }

    /// Adds `input` to the corpus unconditionally and runs it.
    ///
    /// Returns true if it reached new coverage.
    pub fn seed_corpus(&mut self, input: Vec<u8>) -> bool {
        self.corpus.push(input.clone());
        self.execute_and_update(&input)
    }

    /// Picks a corpus entry uniformly, or random bytes if the corpus is empty.
    pub fn select_from_corpus(&mut self) -> Vec<u8> {
        if self.corpus.is_empty() {
            let mut input = vec![0u8; FuzzInput::ENCODED_LEN];
            self.rng.fill_bytes(&mut input);
            return input;
        }
        let idx = self.rng.next_usize(self.corpus.len());
        self.corpus[idx].clone()
    }

    /// Number of mutation passes for the current stall level.
    pub fn mutation_passes(&self) -> usize {
        if self.iterations_since_new_coverage > STALL_TRIPLE {
            3
        } else if self.iterations_since_new_coverage > STALL_DOUBLE {
            2
        } else {
            1
        }
    }

    /// Returns a mutated copy of `input`, padded to the encoded length.
    pub fn mutate(&mut self, input: &[u8]) -> Vec<u8> {
        let mut result = input.to_vec();
        while result.len() < FuzzInput::ENCODED_LEN {
            result.push(self.rng.next_u8());
        }

        for _ in 0..self.mutation_passes() {
            let strategy = MutationStrategy::ALL[self.rng.next_usize(MutationStrategy::ALL.len())];
            self.apply(strategy, &mut result);
        }
        result
    }

    fn apply(&mut self, strategy: MutationStrategy, result: &mut [u8]) {
        match strategy {
            MutationStrategy::BitFlip => {
                let bit = self.rng.next_usize(result.len() * 8);
                result[bit / 8] ^= 1 << (bit % 8);
            }
            MutationStrategy::ByteReplace => {
                let pos = self.rng.next_usize(result.len());
                result[pos] = self.rng.next_u8();
            }
            MutationStrategy::Arithmetic => {
                let pos = self.rng.next_usize(result.len());
                let delta = self.rng.draw(0, 34) as i8 - 17;
                result[pos] = result[pos].wrapping_add_signed(delta);
            }
            MutationStrategy::Splice => {
                if self.corpus.len() > 1 {
                    let other = &self.corpus[self.rng.next_usize(self.corpus.len())];
                    let shared = result.len().min(other.len());
                    if shared > 0 {
                        let split = self.rng.next_usize(shared);
                        result[..split].copy_from_slice(&other[..split]);
                    }
                }
            }
            MutationStrategy::InterestingSeed => {
                let seed = INTERESTING_SEEDS[self.rng.next_usize(INTERESTING_SEEDS.len())];
                result[..4].copy_from_slice(&seed.to_le_bytes());
            }
        }
    }

    /// Runs `input` and merges its states into the session coverage.
    ///
    /// Returns true if any state was new. A failing run is recorded as the
    /// session's violation and contributes no coverage.
    pub fn execute_and_update(&mut self, input: &[u8]) -> bool {
        let result = run_simulation_with_config(input, &self.config.sim);

        if result.oracle_violation {
            self.violation = Some(Violation {
                input: input.to_vec(),
                params: result.input,
                message: result.error_message.unwrap_or_default(),
                detail: result.error_detail.unwrap_or_default(),
            });
            return false;
        }

        self.tracker.observe_all(result.visited_state_hashes) > 0
    }

    /// Runs one select/mutate/execute iteration.
    pub fn step(&mut self) -> StepOutcome {
        let base = self.select_from_corpus();
        let mutated = self.mutate(&base);
        let found_new = self.execute_and_update(&mutated);
        self.iterations += 1;

        if self.violation.is_some() {
            return StepOutcome::Violation;
        }
        if found_new {
            self.corpus.push(mutated);
            self.iterations_since_new_coverage = 0;
            StepOutcome::NewCoverage
        } else {
            self.iterations_since_new_coverage += 1;
            StepOutcome::NoNewCoverage
        }
    }

    /// Runs up to `iterations` iterations, stopping at the first violation.
    pub fn run(&mut self, iterations: u64) -> FuzzReport {
        tracing::info!(iterations, seed = self.config.seed, "starting fuzzing run");

        for i in 0..iterations {
            if self.step() == StepOutcome::Violation {
                tracing::warn!(iteration = i + 1, "stopping due to oracle violation");
                return self.report();
            }

            if i == 0 || (i + 1) % self.config.progress_interval == 0 {
                tracing::info!(
                    iteration = i + 1,
                    coverage = self.coverage_count(),
                    corpus = self.corpus_size(),
                    stalled = self.iterations_since_new_coverage,
                    "fuzzing progress"
                );
            }
        }

        tracing::info!(
            coverage = self.coverage_count(),
            corpus = self.corpus_size(),
            "fuzzing complete, no violations found"
        );
        self.report()
    }

    pub fn report(&self) -> FuzzReport {
        FuzzReport {
            seed: self.config.seed,
            iterations: self.iterations,
            coverage: self.coverage_count(),
            corpus_size: self.corpus_size(),
            stalled_iterations: self.iterations_since_new_coverage,
            violation: self.violation.clone(),
        }
    }

    /// Number of distinct states reached this session.
    pub fn coverage_count(&self) -> usize {
        self.tracker.unique_states()
    }

    pub fn corpus_size(&self) -> usize {
        self.corpus.len()
    }

    pub fn corpus(&self) -> &[Vec<u8>] {
        &self.corpus
    }

    pub fn stalled_iterations(&self) -> u64 {
        self.iterations_since_new_coverage
    }

    pub fn has_violation(&self) -> bool {
        self.violation.is_some()
    }

    pub fn violation(&self) -> Option<&Violation> {
        self.violation.as_ref()
    }

    pub fn tracker(&self) -> &CoverageTracker {
        &self.tracker
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_fuzzer(seed: u64) -> CoverageFuzzer {
        CoverageFuzzer::new(
            FuzzerConfig::default()
                .with_seed(seed)
                .with_sim(SimConfig::default().with_max_steps_cap(100)),
        )
    }

    #[test]
    fn coverage_tracker_observes_states() {
        let mut tracker = CoverageTracker::new();
        assert!(tracker.observe_state(1));
        assert!(tracker.observe_state(2));
        assert!(!tracker.observe_state(1));
        assert_eq!(tracker.unique_states(), 2);
        assert_eq!(tracker.stats().total_observations, 3);
        assert_eq!(tracker.observe_all([2, 3, 4]), 2);
    }

    #[test]
    fn empty_corpus_yields_encoded_length_bytes() {
        let mut fuzzer = quick_fuzzer(1);
        assert_eq!(fuzzer.select_from_corpus().len(), FuzzInput::ENCODED_LEN);
    }

    #[test]
    fn mutate_pads_short_inputs() {
        let mut fuzzer = quick_fuzzer(2);
        assert_eq!(fuzzer.mutate(&[1, 2, 3]).len(), FuzzInput::ENCODED_LEN);
        assert_eq!(fuzzer.mutate(&[0u8; 40]).len(), 40);
    }

    #[test]
    fn mutation_changes_at_most_expected_bytes() {
        let mut fuzzer = quick_fuzzer(3);
        let base = vec![0x55u8; FuzzInput::ENCODED_LEN];
        for _ in 0..200 {
            let mutated = fuzzer.mutate(&base);
            let changed = base.iter().zip(&mutated).filter(|(a, b)| a != b).count();
            // One pass touches at most the four seed bytes.
            assert!(changed <= 4, "changed {changed} bytes");
        }
    }

    #[test]
    fn interesting_seed_writes_little_endian() {
        let mut fuzzer = quick_fuzzer(4);
        let mut bytes = vec![0u8; FuzzInput::ENCODED_LEN];
        fuzzer.apply(MutationStrategy::InterestingSeed, &mut bytes);
        let seed = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert!(INTERESTING_SEEDS.contains(&seed));
    }

    #[test]
    fn splice_needs_two_corpus_entries() {
        let mut fuzzer = quick_fuzzer(5);
        fuzzer.corpus.push(vec![0xFF; FuzzInput::ENCODED_LEN]);
        let mut bytes = vec![0u8; FuzzInput::ENCODED_LEN];
        fuzzer.apply(MutationStrategy::Splice, &mut bytes);
        assert_eq!(bytes, vec![0u8; FuzzInput::ENCODED_LEN]);
    }

    #[test]
    fn stall_level_controls_passes() {
        let mut fuzzer = quick_fuzzer(6);
        assert_eq!(fuzzer.mutation_passes(), 1);
        fuzzer.iterations_since_new_coverage = 101;
        assert_eq!(fuzzer.mutation_passes(), 2);
        fuzzer.iterations_since_new_coverage = 501;
        assert_eq!(fuzzer.mutation_passes(), 3);
    }

    #[test]
    fn seeding_adds_to_corpus_and_coverage() {
        let mut fuzzer = quick_fuzzer(7);
        assert!(fuzzer.seed_corpus(FuzzInput::default().to_bytes()));
        assert_eq!(fuzzer.corpus_size(), 1);
        assert!(fuzzer.coverage_count() > 0);
    }

    #[test]
    fn same_seed_same_session() {
        let mut a = quick_fuzzer(8);
        let mut b = quick_fuzzer(8);
        assert_eq!(a.run(20), b.run(20));
    }
}

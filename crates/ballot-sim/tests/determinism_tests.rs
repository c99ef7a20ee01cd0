//! Tests for run reproducibility.
//!
//! Every run is a pure function of its input bytes and configuration. These
//! tests verify that identical inputs replay identically and that the state
//! hashes fed to the fuzzer are stable.

use ballot_sim::{FuzzInput, SimConfig, Simulation, run_simulation, run_simulation_with_config};

fn input(seed: u32, nodes: u8, max_steps: u16) -> FuzzInput {
    FuzzInput {
        rng_seed: seed,
        nr_nodes: nodes,
        max_steps,
        ..FuzzInput::default()
    }
}

#[test]
fn test_identical_bytes_produce_identical_results() {
    let bytes = input(1234, 5, 3_000).to_bytes();

    let first = run_simulation(&bytes);
    let second = run_simulation(&bytes);

    assert_eq!(first, second);
    assert_eq!(first.visited_state_hashes, second.visited_state_hashes);
    assert_eq!(first.final_time, second.final_time);
}

#[test]
fn test_replay_is_stable_across_many_runs() {
    let bytes = input(0xDEAD_BEEF, 7, 1_500).to_bytes();
    let reference = run_simulation(&bytes);

    for _ in 0..5 {
        assert_eq!(run_simulation(&bytes), reference);
    }
}

#[test]
fn test_stepwise_hashes_match_between_runs() {
    let config = SimConfig::default();
    let mut a = Simulation::new(input(77, 3, 1_000), &config);
    let mut b = Simulation::new(input(77, 3, 1_000), &config);

    while a.is_active() {
        assert!(b.is_active());
        let ha = a.step().unwrap();
        let hb = b.step().unwrap();
        assert_eq!(ha, hb, "diverged at step {}", a.steps());
    }
    assert!(!b.is_active());
    assert_eq!(a.cluster_state(), b.cluster_state());
}

#[test]
fn test_different_seeds_explore_different_states() {
    let a = run_simulation(&input(1, 5, 3_000).to_bytes());
    let b = run_simulation(&input(2, 5, 3_000).to_bytes());

    assert!(a.is_ok() && b.is_ok());
    assert_ne!(a.visited_state_hashes, b.visited_state_hashes);
}

#[test]
fn test_tracing_does_not_change_the_run() {
    let bytes = input(42, 4, 800).to_bytes();

    let quiet = run_simulation_with_config(&bytes, &SimConfig::default());
    let traced = run_simulation_with_config(&bytes, &SimConfig::default().with_tracing());

    assert_eq!(quiet, traced);
}

#[test]
fn test_result_survives_json() {
    let result = run_simulation(&input(5, 3, 500).to_bytes());

    let json = serde_json::to_string(&result).unwrap();
    let back: ballot_sim::SimulationResult = serde_json::from_str(&json).unwrap();

    assert_eq!(back, result);
}

#[test]
fn test_trailing_bytes_are_ignored() {
    let bytes = input(9, 5, 600).to_bytes();
    let mut padded = bytes.clone();
    padded.extend_from_slice(&[0xAB; 17]);

    let plain = run_simulation(&bytes);
    let with_tail = run_simulation(&padded);

    assert_eq!(plain.input, with_tail.input);
    assert_eq!(plain.visited_state_hashes, with_tail.visited_state_hashes);
    assert_eq!(plain.steps_executed, with_tail.steps_executed);
}

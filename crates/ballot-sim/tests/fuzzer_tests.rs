//! Integration tests for the coverage-guided fuzzer.

use ballot_sim::{
    CoverageFuzzer, FuzzInput, FuzzerConfig, SimConfig, StepOutcome, run_simulation_with_config,
};

fn fuzzer(seed: u64, cap: u32) -> CoverageFuzzer {
    CoverageFuzzer::new(
        FuzzerConfig::default()
            .with_seed(seed)
            .with_sim(SimConfig::default().with_max_steps_cap(cap)),
    )
}

#[test]
fn test_coverage_and_corpus_never_shrink() {
    let mut fuzzer = fuzzer(42, 150);
    assert!(fuzzer.seed_corpus(FuzzInput::default().to_bytes()));
    assert_eq!(fuzzer.corpus_size(), 1);
    let mut coverage = fuzzer.coverage_count();
    let mut corpus = fuzzer.corpus_size();

    for i in 0..1_000 {
        let outcome = fuzzer.step();
        assert_ne!(outcome, StepOutcome::Violation, "iteration {i}: {:?}", fuzzer.violation());

        assert!(fuzzer.coverage_count() >= coverage);
        assert!(fuzzer.corpus_size() >= corpus);
        match outcome {
            StepOutcome::NewCoverage => {
                assert!(fuzzer.coverage_count() > coverage);
                assert_eq!(fuzzer.corpus_size(), corpus + 1);
                assert_eq!(fuzzer.stalled_iterations(), 0);
            }
            StepOutcome::NoNewCoverage => {
                assert_eq!(fuzzer.coverage_count(), coverage);
                assert_eq!(fuzzer.corpus_size(), corpus);
            }
            StepOutcome::Violation => unreachable!(),
        }
        coverage = fuzzer.coverage_count();
        corpus = fuzzer.corpus_size();
    }

    assert!(coverage > 0);
    assert!(corpus > 0);
}

#[test]
fn test_run_reports_the_session() {
    let mut fuzzer = fuzzer(7, 100);
    let report = fuzzer.run(200);

    assert_eq!(report.seed, 7);
    assert_eq!(report.iterations, 200);
    assert_eq!(report.coverage, fuzzer.coverage_count());
    assert_eq!(report.corpus_size, fuzzer.corpus_size());
    assert!(report.violation.is_none());
}

#[test]
fn test_sessions_are_reproducible_from_their_seed() {
    let a = fuzzer(1234, 100).run(100);
    let b = fuzzer(1234, 100).run(100);
    assert_eq!(a, b);
}

#[test]
fn test_sessions_do_not_share_coverage() {
    let mut first = fuzzer(5, 100);
    first.run(50);

    let fresh = fuzzer(5, 100);
    assert_eq!(fresh.coverage_count(), 0);
    assert_eq!(fresh.corpus_size(), 0);
}

#[test]
fn test_every_corpus_entry_replays_cleanly() {
    let config = SimConfig::default().with_max_steps_cap(100);
    let mut fuzzer = fuzzer(99, 100);
    fuzzer.run(150);

    for entry in fuzzer.corpus() {
        let result = run_simulation_with_config(entry, &config);
        assert!(result.is_ok());
        assert!(
            result
                .visited_state_hashes
                .iter()
                .all(|h| fuzzer.tracker().contains(*h))
        );
    }
}

#[test]
fn test_seeded_input_leads_the_corpus() {
    let seed_input = FuzzInput {
        rng_seed: 17,
        nr_nodes: 3,
        ..FuzzInput::default()
    }
    .to_bytes();

    let mut fuzzer = fuzzer(3, 100);
    assert!(fuzzer.seed_corpus(seed_input.clone()));
    fuzzer.run(25);

    assert_eq!(fuzzer.corpus()[0], seed_input);
}

#[test]
fn test_report_serializes_to_json() {
    let report = fuzzer(11, 100).run(10);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["seed"], 11);
    assert_eq!(json["iterations"], 10);
    assert!(json["violation"].is_null());
}

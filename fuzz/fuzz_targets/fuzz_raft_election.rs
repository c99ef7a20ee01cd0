#![no_main]

use ballot_sim::{SimConfig, run_simulation_with_config};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Keep individual runs short so libFuzzer gets through many inputs.
    let config = SimConfig::default().with_max_steps_cap(5_000);
    let result = run_simulation_with_config(data, &config);
    if result.oracle_violation {
        panic!(
            "{}",
            result
                .error_detail
                .unwrap_or_else(|| "simulation failed".to_string())
        );
    }
});

//! Shared integration-test helpers: config/cell builders used across the
//! cross-component test files. Mirrors the teacher's `tests/common/` shared
//! fixture module.

use cynic_core::config::Config;
use cynic_shared::{Cell, ConsciousnessLevel, Reality, TimeDim};

pub fn test_config(data_dir: std::path::PathBuf) -> Config {
    Config {
        alpha: cynic_shared::constants::PHI_INV * 0.5,
        gamma: cynic_shared::constants::PHI_INV,
        exploration_rate: cynic_shared::constants::PHI_INV_3,
        ring_capacity: 89,
        bus_queue_capacity: 233,
        reflex_latency_ms: 50,
        micro_latency_ms: 500,
        macro_latency_ms: 5_000,
        meta_latency_ms: 30_000,
        dog_timeout_ms: 2_000,
        dog_retry_budget: 1,
        residual_min_observations: 50,
        residual_promotion_ratio: cynic_shared::constants::PHI_INV,
        daily_budget_usd: 5.0,
        data_dir,
    }
}

pub fn unique_data_dir(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("cynic-it-{label}-{}", uuid::Uuid::new_v4()))
}

pub fn code_cell(budget_usd: f64, level: ConsciousnessLevel) -> Cell {
    Cell::new(
        "def f(): pass",
        "bare function stub",
        Reality::Code,
        "QUALITY",
        TimeDim::Present,
        1,
        budget_usd,
    )
    .expect("valid cell")
    .with_level(level)
}

//! Runtime configuration, loaded once from the environment at process
//! start. Shaped after the teacher's `AppConfig::load()`: every field has a
//! sane default, every parsed numeric is range-checked immediately, and
//! invalid input fails fast with a descriptive `anyhow::Error` rather than
//! falling back silently.

use anyhow::Context;
use std::env;
use std::path::PathBuf;

/// Returns the directory containing the running executable, falling back
/// to the current working directory if it cannot be determined.
#[must_use]
pub fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(std::path::Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Q-learning rate applied to the residual-detector's online update.
    pub alpha: f64,
    /// Discount factor for future reward in the Q-learning update.
    pub gamma: f64,
    /// Thompson-sampling exploration rate, default φ⁻³.
    pub exploration_rate: f64,
    /// Capacity of the judgment ring and the pending-action FIFO.
    pub ring_capacity: usize,
    /// Bounded capacity of the event bus's per-subscriber queue.
    pub bus_queue_capacity: usize,
    /// Per-level soft latency budgets, indexed REFLEX/MICRO/MACRO/META.
    pub reflex_latency_ms: u64,
    pub micro_latency_ms: u64,
    pub macro_latency_ms: u64,
    pub meta_latency_ms: u64,
    /// Per-dog timeout before a vote is treated as a `Failed` activity.
    pub dog_timeout_ms: u64,
    /// Number of retries a dog adapter gets before the committee gives up
    /// on it for this cycle.
    pub dog_retry_budget: u8,
    /// Minimum independent observations before a residual can be promoted.
    pub residual_min_observations: u64,
    /// Fraction of the catalog's weakest dimension weight a residual's
    /// mean signal must clear to be promotable.
    pub residual_promotion_ratio: f64,
    /// Daily spend ceiling, in USD, enforced by the cost governor.
    pub daily_budget_usd: f64,
    /// Where `state.rs` persists its JSON snapshots.
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let alpha = parse_env_or("CYNIC_ALPHA", cynic_shared::constants::PHI_INV * 0.5)?;
        if !(0.0..=1.0).contains(&alpha) {
            anyhow::bail!("CYNIC_ALPHA must be between 0 and 1 (got {alpha})");
        }

        let gamma = parse_env_or("CYNIC_GAMMA", cynic_shared::constants::PHI_INV)?;
        if !(0.0..=1.0).contains(&gamma) {
            anyhow::bail!("CYNIC_GAMMA must be between 0 and 1 (got {gamma})");
        }

        let exploration_rate =
            parse_env_or("CYNIC_EXPLORATION_RATE", cynic_shared::constants::PHI_INV_3)?;
        if !(0.0..=1.0).contains(&exploration_rate) {
            anyhow::bail!(
                "CYNIC_EXPLORATION_RATE must be between 0 and 1 (got {exploration_rate})"
            );
        }

        let ring_capacity = parse_env_or("CYNIC_RING_CAPACITY", 89usize)?;
        if ring_capacity == 0 {
            anyhow::bail!("CYNIC_RING_CAPACITY must be at least 1");
        }

        let bus_queue_capacity = parse_env_or("CYNIC_BUS_QUEUE_CAPACITY", 233usize)?;
        if bus_queue_capacity == 0 {
            anyhow::bail!("CYNIC_BUS_QUEUE_CAPACITY must be at least 1");
        }

        let reflex_latency_ms = parse_env_or("CYNIC_REFLEX_LATENCY_MS", 50u64)?;
        let micro_latency_ms = parse_env_or("CYNIC_MICRO_LATENCY_MS", 500u64)?;
        let macro_latency_ms = parse_env_or("CYNIC_MACRO_LATENCY_MS", 5_000u64)?;
        let meta_latency_ms = parse_env_or("CYNIC_META_LATENCY_MS", 30_000u64)?;

        let dog_timeout_ms = parse_env_or("CYNIC_DOG_TIMEOUT_MS", 2_000u64)?;
        if dog_timeout_ms == 0 {
            anyhow::bail!("CYNIC_DOG_TIMEOUT_MS must be at least 1");
        }

        let dog_retry_budget = parse_env_or("CYNIC_DOG_RETRY_BUDGET", 1u8)?;

        let residual_min_observations = parse_env_or("CYNIC_RESIDUAL_MIN_OBSERVATIONS", 50u64)?;
        let residual_promotion_ratio =
            parse_env_or("CYNIC_RESIDUAL_PROMOTION_RATIO", cynic_shared::constants::PHI_INV)?;

        let daily_budget_usd = parse_env_or("CYNIC_DAILY_BUDGET_USD", 5.0)?;
        if daily_budget_usd <= 0.0 {
            anyhow::bail!("CYNIC_DAILY_BUDGET_USD must be positive (got {daily_budget_usd})");
        }

        let data_dir = match env::var("CYNIC_DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => exe_dir().join("data"),
        };

        Ok(Self {
            alpha,
            gamma,
            exploration_rate,
            ring_capacity,
            bus_queue_capacity,
            reflex_latency_ms,
            micro_latency_ms,
            macro_latency_ms,
            meta_latency_ms,
            dog_timeout_ms,
            dog_retry_budget,
            residual_min_observations,
            residual_promotion_ratio,
            daily_budget_usd,
            data_dir,
        })
    }
}

fn parse_env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("failed to parse {key}")),
        Err(_) => Ok(default),
    }
}

//! The seam between the committee and whatever actually looks at a cell and
//! produces dimension scores (§4.5). Shaped after `exiv_shared::Plugin`:
//! one `async_trait` a concrete scorer implements, rather than a struct the
//! committee has to special-case per dog.

use crate::catalog::Dimension;
use crate::error::CynicResult;
use crate::types::Cell;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A cooperative cancel signal threaded through every adapter call. Cloning
/// shares the same underlying flag; `cancel()` is idempotent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One dog's scoring output before it is wrapped into a `DogVote`: raw
/// per-dimension scores in `[0, 1]`, the dog's self-assessed confidence
/// (unclamped — the caller clamps to φ⁻¹ on write), plus the cost and
/// wall-clock the adapter spent producing them.
#[derive(Debug, Clone)]
pub struct AdapterOutput {
    pub scores: BTreeMap<Dimension, f64>,
    pub confidence: f64,
    pub cost_usd: f64,
    pub duration: Duration,
}

/// Implemented once per dog. The committee calls `score_dimensions` with
/// exactly the dimensions that dog is responsible for; an adapter that
/// cannot score one of them should simply omit it from the returned map
/// rather than inventing a value. Implementations that perform I/O must
/// check `cancel` between awaits and return `CynicError::Cancelled` promptly
/// once it trips.
#[async_trait]
pub trait DogAdapter: Send + Sync {
    fn dog_id(&self) -> &str;

    /// A cheap, conservative upper bound the committee/governor can check
    /// against remaining budget before even attempting the call. Heuristic
    /// (non-LLM) adapters return `0.0`.
    fn expected_cost_usd(&self) -> f64 {
        0.0
    }

    async fn score_dimensions(
        &self,
        cell: &Cell,
        dimensions: &[Dimension],
        cancel: &CancelToken,
    ) -> CynicResult<AdapterOutput>;
}

//! The dog committee (C6): a fixed registry of specialized scorers plus the
//! heuristic adapter that ships as the always-available fallback (§4.5).
//! Fan-out dispatch is grounded on the same shape as [`crate::bus`]'s
//! per-subscriber dispatch — `FuturesUnordered` + per-call `timeout` +
//! `catch_unwind` — per §4.6's explicit instruction to mirror it, itself
//! grounded on the teacher's `PluginRegistry::dispatch_event`.

use async_trait::async_trait;
use cynic_shared::{
    AdapterOutput, CancelToken, Cell, CynicError, CynicResult, Dimension, DogAdapter, DogHealth,
    DogVote,
};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One registered dog: its authoritative dimension slice and its adapter.
/// Dogs never call other dogs and hold no state of their own (§4.6) — all
/// state lives in [`crate::state::OrganismState`].
pub struct DogEntry {
    pub dog_id: String,
    pub dimensions: Vec<Dimension>,
    pub adapter: Arc<dyn DogAdapter>,
}

/// Deterministic, zero-cost scorer used as the always-available fallback
/// (§4.5: "ships one or more heuristic adapters ... suitable for tests and
/// as an always-available fallback"). Produces a stable score in `[0, 1]`
/// per dimension from the cell's content/context/analysis text — no
/// network, no randomness, so the same cell always yields the same vote.
pub struct HeuristicAdapter {
    dog_id: String,
    confidence: f64,
}

impl HeuristicAdapter {
    pub fn new(dog_id: impl Into<String>, confidence: f64) -> Self {
        Self {
            dog_id: dog_id.into(),
            confidence: confidence.clamp(0.0, cynic_shared::constants::MAX_CONFIDENCE),
        }
    }

    /// Hashes `(cell_id, dimension)` into a deterministic `[0, 1]` score.
    /// This is a placeholder signal, not a meaningful quality judgment —
    /// real discrimination comes from an LLM-backed adapter plugged into
    /// the same port; this one exists so the committee always has a vote.
    fn score_one(cell: &Cell, dimension: Dimension) -> f64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        cell.cell_id.as_hex().hash(&mut hasher);
        dimension.name().hash(&mut hasher);
        let bits = hasher.finish();
        // Fold 64 bits of hash into [0, 1] via the top 53 bits (matches an
        // f64 mantissa, avoids rounding bias from modulo on the low bits).
        ((bits >> 11) as f64) / ((1u64 << 53) as f64)
    }
}

#[async_trait]
impl DogAdapter for HeuristicAdapter {
    fn dog_id(&self) -> &str {
        &self.dog_id
    }

    async fn score_dimensions(
        &self,
        cell: &Cell,
        dimensions: &[Dimension],
        cancel: &CancelToken,
    ) -> CynicResult<AdapterOutput> {
        let start = Instant::now();
        let mut scores = BTreeMap::new();
        for &dimension in dimensions {
            if cancel.is_cancelled() {
                return Err(CynicError::Cancelled {
                    reason: format!("{} cancelled mid-scoring", self.dog_id),
                });
            }
            scores.insert(dimension, Self::score_one(cell, dimension));
        }
        Ok(AdapterOutput {
            scores,
            confidence: self.confidence,
            cost_usd: 0.0,
            duration: start.elapsed(),
        })
    }
}

/// The committee's fixed membership (target 11, minimum 2, per §4.6).
/// Dimensions overlap at axiom boundaries so losing one dog never zeroes
/// out an axiom's score entirely (DESIGN.md open-question #9).
pub fn default_dogs() -> Vec<DogEntry> {
    use Dimension::*;
    let dog = |dog_id: &str, dims: &[Dimension], confidence: f64| DogEntry {
        dog_id: dog_id.to_string(),
        dimensions: dims.to_vec(),
        adapter: Arc::new(HeuristicAdapter::new(dog_id, confidence)),
    };
    let c = cynic_shared::constants::PHI_INV;
    vec![
        dog("dog.phi.alpha", &[Coherence, Harmony, Structure, Elegance], c),
        dog("dog.phi.beta", &[Completeness, Precision, Proportion], c),
        dog(
            "dog.verify.alpha",
            &[Accuracy, Verifiability, Transparency, Reproducibility],
            c,
        ),
        dog("dog.verify.beta", &[Provenance, Integrity, Consistency], c),
        dog(
            "dog.culture.alpha",
            &[Authenticity, Relevance, Novelty, Alignment],
            c,
        ),
        dog("dog.culture.beta", &[Impact, Resonance, Belonging], c),
        dog(
            "dog.burn.alpha",
            &[Utility, Sustainability, Efficiency, ValueCreation],
            c,
        ),
        dog("dog.burn.beta", &[NonExtractive, Contribution, Regeneration], c),
        dog(
            "dog.fidelity.alpha",
            &[Commitment, Attunement, Candor, Revision],
            c,
        ),
        dog("dog.fidelity.beta", &[Restraint, Witness, Tikkun], c),
        // Overlap dog: one dimension per axiom, so a single specialist
        // dropping out still leaves every axiom with two voters.
        dog(
            "dog.generalist",
            &[Structure, Consistency, Belonging, Regeneration, Tikkun],
            c,
        ),
    ]
}

/// One dog's outcome from a fan-out round: either a vote, or the reason it
/// did not produce one (§4.9: "its absence does not fail the cycle").
pub enum DogOutcome {
    Voted(DogVote),
    Failed { dog_id: String, reason: String },
}

pub struct Committee {
    dogs: Vec<DogEntry>,
}

impl Committee {
    pub fn new(dogs: Vec<DogEntry>) -> Self {
        Self { dogs }
    }

    pub fn dog_ids(&self) -> Vec<String> {
        self.dogs.iter().map(|d| d.dog_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.dogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dogs.is_empty()
    }

    /// Every dimension at least one dog authoritatively covers.
    pub fn covered_dimensions(&self) -> Vec<Dimension> {
        let mut seen = std::collections::BTreeSet::new();
        for dog in &self.dogs {
            seen.extend(dog.dimensions.iter().copied());
        }
        seen.into_iter().collect()
    }

    /// Selects the dogs that together cover `dimensions`, preferring fewer
    /// dogs when a dog's slice is a subset of what's still needed (greedy
    /// set cover — good enough at N=11, not claimed optimal).
    pub fn dogs_for(&self, dimensions: &[Dimension]) -> Vec<&DogEntry> {
        let mut remaining: std::collections::BTreeSet<Dimension> =
            dimensions.iter().copied().collect();
        let mut chosen = Vec::new();
        let mut candidates: Vec<&DogEntry> = self.dogs.iter().collect();
        while !remaining.is_empty() && !candidates.is_empty() {
            candidates.sort_by_key(|d| {
                std::cmp::Reverse(d.dimensions.iter().filter(|dim| remaining.contains(dim)).count())
            });
            let best = candidates.remove(0);
            let covers = best.dimensions.iter().any(|d| remaining.contains(d));
            if !covers {
                break;
            }
            for d in &best.dimensions {
                remaining.remove(d);
            }
            chosen.push(best);
        }
        chosen
    }

    /// Selects by explicit dog id subset (used by the learning loop's
    /// Thompson-sampled routing, which names dogs rather than dimensions).
    pub fn dogs_named<'a>(&'a self, ids: &[String]) -> Vec<&'a DogEntry> {
        self.dogs
            .iter()
            .filter(|d| ids.iter().any(|id| id == &d.dog_id))
            .collect()
    }

    pub fn all_dogs(&self) -> &[DogEntry] {
        &self.dogs
    }

    /// Invokes `selected` concurrently (one task per dog, individually
    /// timed out and shielded from panics), applying `dog_retry_budget`
    /// retries per dog on transient `AdapterError`. Rejoined once every
    /// task has finished, timed out, or panicked — matching §4.6 exactly.
    pub async fn invoke(
        &self,
        selected: &[&DogEntry],
        cell: &Cell,
        dog_timeout: Duration,
        retry_budget: u8,
        cancel: &CancelToken,
    ) -> Vec<DogOutcome> {
        let mut futures = FuturesUnordered::new();
        for dog in selected {
            let dog_id = dog.dog_id.clone();
            let dims = dog.dimensions.clone();
            let adapter = dog.adapter.clone();
            let cell = cell.clone();
            let cancel = cancel.clone();
            futures.push(tokio::spawn(async move {
                run_one_dog(dog_id, dims, adapter, cell, dog_timeout, retry_budget, cancel).await
            }));
        }

        let mut outcomes = Vec::with_capacity(selected.len());
        while let Some(joined) = futures.next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    tracing::error!(error = %join_err, "dog task failed to join");
                }
            }
        }
        outcomes
    }
}

async fn run_one_dog(
    dog_id: String,
    dims: Vec<Dimension>,
    adapter: Arc<dyn DogAdapter>,
    cell: Cell,
    dog_timeout: Duration,
    retry_budget: u8,
    cancel: CancelToken,
) -> DogOutcome {
    let mut last_reason = String::from("no attempts made");
    for attempt in 0..=retry_budget {
        if cancel.is_cancelled() {
            return DogOutcome::Failed {
                dog_id,
                reason: "cancelled".to_string(),
            };
        }
        let attempt_cell = cell.clone();
        let attempt_dims = dims.clone();
        let attempt_adapter = adapter.clone();
        let attempt_cancel = cancel.clone();
        let call = async move {
            std::panic::AssertUnwindSafe(attempt_adapter.score_dimensions(
                &attempt_cell,
                &attempt_dims,
                &attempt_cancel,
            ))
            .catch_unwind()
            .await
        };
        match tokio::time::timeout(dog_timeout, call).await {
            Ok(Ok(Ok(output))) => {
                return match DogVote::new(
                    dog_id.clone(),
                    output.scores,
                    output.confidence,
                    output.cost_usd,
                    output.duration.as_millis() as u64,
                ) {
                    Ok(vote) => DogOutcome::Voted(vote),
                    Err(e) => DogOutcome::Failed {
                        dog_id,
                        reason: e.to_string(),
                    },
                };
            }
            Ok(Ok(Err(e))) => {
                last_reason = e.to_string();
            }
            Ok(Err(_panic)) => {
                last_reason = "dog adapter panicked".to_string();
            }
            Err(_elapsed) => {
                last_reason = format!("timed out after {dog_timeout:?}");
            }
        }
        if attempt < retry_budget {
            let backoff = Duration::from_millis(10 * 2u64.pow(attempt as u32));
            tokio::time::sleep(backoff).await;
        }
    }
    DogOutcome::Failed {
        dog_id,
        reason: last_reason,
    }
}

/// Maps a `DogOutcome::Failed` dog to the `DogHealth` the committee records
/// for it — used by callers updating the state registry after a round.
pub fn health_after_failure(consecutive_failures: u32) -> DogHealth {
    if consecutive_failures >= 2 {
        DogHealth::Silent
    } else {
        DogHealth::Degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cynic_shared::{Reality, TimeDim};

    fn sample_cell() -> Cell {
        Cell::new(
            "fn add(a: i32, b: i32) -> i32 { a + b }",
            "utility module",
            Reality::Code,
            "QUALITY",
            TimeDim::Present,
            1,
            0.05,
        )
        .unwrap()
    }

    #[test]
    fn default_dogs_cover_every_scored_dimension() {
        let committee = Committee::new(default_dogs());
        let covered = committee.covered_dimensions();
        for dim in Dimension::ALL {
            if dim == Dimension::TheUnnameable {
                continue;
            }
            assert!(covered.contains(&dim), "{dim} uncovered");
        }
    }

    #[test]
    fn committee_has_at_least_eleven_dogs() {
        let committee = Committee::new(default_dogs());
        assert_eq!(committee.len(), 11);
    }

    #[test]
    fn every_axiom_boundary_dimension_has_two_voters() {
        let committee = Committee::new(default_dogs());
        for dim in [
            Dimension::Structure,
            Dimension::Consistency,
            Dimension::Belonging,
            Dimension::Regeneration,
            Dimension::Tikkun,
        ] {
            let voters = committee
                .all_dogs()
                .iter()
                .filter(|d| d.dimensions.contains(&dim))
                .count();
            assert!(voters >= 2, "{dim} has only {voters} voter(s)");
        }
    }

    #[tokio::test]
    async fn heuristic_adapter_is_deterministic_for_same_cell() {
        let adapter = HeuristicAdapter::new("dog.test", 0.5);
        let cell = sample_cell();
        let cancel = CancelToken::new();
        let a = adapter
            .score_dimensions(&cell, &[Dimension::Coherence], &cancel)
            .await
            .unwrap();
        let b = adapter
            .score_dimensions(&cell, &[Dimension::Coherence], &cancel)
            .await
            .unwrap();
        assert_eq!(a.scores[&Dimension::Coherence], b.scores[&Dimension::Coherence]);
    }

    #[tokio::test]
    async fn invoke_collects_votes_from_all_selected_dogs() {
        let committee = Committee::new(default_dogs());
        let selected: Vec<&DogEntry> = committee.all_dogs().iter().collect();
        let cell = sample_cell();
        let cancel = CancelToken::new();
        let outcomes = committee
            .invoke(&selected, &cell, Duration::from_millis(500), 1, &cancel)
            .await;
        assert_eq!(outcomes.len(), 11);
        let votes = outcomes
            .iter()
            .filter(|o| matches!(o, DogOutcome::Voted(_)))
            .count();
        assert_eq!(votes, 11);
    }

    #[tokio::test]
    async fn invoke_honors_pre_tripped_cancel_token() {
        let committee = Committee::new(default_dogs());
        let selected: Vec<&DogEntry> = committee.all_dogs().iter().take(2).collect();
        let cell = sample_cell();
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcomes = committee
            .invoke(&selected, &cell, Duration::from_millis(500), 0, &cancel)
            .await;
        for outcome in outcomes {
            assert!(matches!(outcome, DogOutcome::Failed { .. }));
        }
    }

    #[test]
    fn dogs_for_selects_a_small_cover_of_requested_dimensions() {
        let committee = Committee::new(default_dogs());
        let wanted = [Dimension::Coherence, Dimension::Accuracy];
        let chosen = committee.dogs_for(&wanted);
        assert!(!chosen.is_empty());
        let covered: std::collections::BTreeSet<_> =
            chosen.iter().flat_map(|d| d.dimensions.iter().copied()).collect();
        for dim in wanted {
            assert!(covered.contains(&dim));
        }
    }
}

//! The consensus engine (C7, §4.7): pure, synchronous aggregation from a
//! cell's dog votes into per-dimension scores plus a dissent measure. No
//! I/O, no session/timeout state machine — every vote for a cycle is
//! already in hand by the time this runs, unlike a multi-round LLM-synthesis
//! consensus. This replaces the teacher's `ConsensusOrchestrator`
//! (`plugins/moderator`-backed proposal collection + synthesizer-engine
//! selection) outright: that session/round bookkeeping has no counterpart
//! here, since C7's input is already a complete batch of votes.

use cynic_shared::constants::PHI_INV;
use cynic_shared::{Dimension, DogVote, Verdict};
use std::collections::BTreeMap;

/// The aggregate output of one consensus round (§4.7 steps 1-4).
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusResult {
    /// Weight-mean score per dimension any dog voted on.
    pub per_dimension: BTreeMap<Dimension, f64>,
    /// Sum of weighted dissent across dimensions, clamped to `[0, 1]`.
    pub residual_variance: f64,
    pub consensus_reached: bool,
    /// Fraction of the full committee that voted this round.
    pub fraction_voting: f64,
    pub unnameable_detected: bool,
    /// Present only when `unnameable_detected`; a stable signature for the
    /// residual-dimension detector (C10) to accumulate observations under.
    pub residual_signature: Option<String>,
}

/// Aggregates `votes` against a committee of `committee_size` dogs. Fewer
/// than two votes never sets `consensus_reached` or `unnameable_detected`
/// (§4.7 edge case), but still returns whatever per-dimension aggregation
/// is possible from the votes in hand.
pub fn aggregate(votes: &[DogVote], committee_size: usize) -> ConsensusResult {
    let fraction_voting = if committee_size == 0 {
        0.0
    } else {
        votes.len() as f64 / committee_size as f64
    };

    let mut scores_by_dim: BTreeMap<Dimension, Vec<(f64, f64)>> = BTreeMap::new();
    for vote in votes {
        for (&dim, &score) in &vote.scores {
            scores_by_dim
                .entry(dim)
                .or_default()
                .push((score, vote.confidence * dim.weight()));
        }
    }

    let mut per_dimension = BTreeMap::new();
    let mut dissent_by_dim: BTreeMap<Dimension, f64> = BTreeMap::new();
    for (&dim, entries) in &scores_by_dim {
        let weight_sum: f64 = entries.iter().map(|(_, w)| w).sum();
        let mean = if weight_sum > 0.0 {
            entries.iter().map(|(s, w)| s * w).sum::<f64>() / weight_sum
        } else {
            entries.iter().map(|(s, _)| s).sum::<f64>() / entries.len() as f64
        };
        per_dimension.insert(dim, mean);

        let variance = if entries.len() < 2 {
            0.0
        } else {
            entries.iter().map(|(s, _)| (s - mean).powi(2)).sum::<f64>() / entries.len() as f64
        };
        dissent_by_dim.insert(dim, variance);
    }

    let dim_weight_sum: f64 = scores_by_dim.keys().map(|d| d.weight()).sum();
    let residual_variance = if dim_weight_sum > 0.0 {
        dissent_by_dim
            .iter()
            .map(|(d, v)| v * d.weight() / dim_weight_sum)
            .sum::<f64>()
            .clamp(0.0, 1.0)
    } else {
        0.0
    };

    let consensus_reached =
        votes.len() >= 2 && fraction_voting >= PHI_INV && residual_variance <= PHI_INV;

    let (unnameable_detected, residual_signature) = if votes.len() < 2 {
        (false, None)
    } else {
        detect_unnameable(residual_variance, &dissent_by_dim)
    };

    ConsensusResult {
        per_dimension,
        residual_variance,
        consensus_reached,
        fraction_voting,
        unnameable_detected,
        residual_signature,
    }
}

/// `unnameable_detected` fires when overall dissent is high (> φ⁻¹) but no
/// single dimension dominates it — i.e. the disagreement is diffuse rather
/// than concentrated in one known dimension, which is read here as the
/// signature of "the dogs are disagreeing about something the catalog
/// doesn't name" (§4.7 step 4). "Dominates" is one dimension accounting for
/// more than φ⁻¹ of the total weighted dissent (DESIGN.md open question
/// #10); the residual signature is the sorted list of above-average-dissent
/// dimensions, hashed into a short hex tag so two cells producing the same
/// dissent shape collide into the same residual bucket.
fn detect_unnameable(
    residual_variance: f64,
    dissent_by_dim: &BTreeMap<Dimension, f64>,
) -> (bool, Option<String>) {
    if residual_variance <= PHI_INV || dissent_by_dim.is_empty() {
        return (false, None);
    }
    let total: f64 = dissent_by_dim.values().sum();
    if total <= 0.0 {
        return (false, None);
    }
    let dominates = dissent_by_dim.values().any(|v| v / total > PHI_INV);
    if dominates {
        return (false, None);
    }

    let mean = total / dissent_by_dim.len() as f64;
    let mut contributors: Vec<&'static str> = dissent_by_dim
        .iter()
        .filter(|(_, v)| **v > mean)
        .map(|(d, _)| d.name())
        .collect();
    contributors.sort_unstable();
    let joined = contributors.join(",");

    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    let digest = hasher.finalize();
    let signature = format!("residual.{}", hex::encode(&digest[..8]));
    (true, Some(signature))
}

/// Counts how many votes' own implied verdict (derived from the mean of
/// that dog's own scores) matches `majority_verdict`. Computed after the
/// judgment engine (C8) settles the final verdict, per §4.7's note that
/// `consensus_votes` is "computed after §4.8."
pub fn count_consensus_votes(votes: &[DogVote], majority_verdict: Verdict) -> usize {
    votes
        .iter()
        .filter(|v| {
            if v.scores.is_empty() {
                return false;
            }
            let mean = v.scores.values().sum::<f64>() / v.scores.len() as f64;
            cynic_shared::catalog::verdict_of(cynic_shared::constants::round_q_score(mean * 100.0))
                == majority_verdict
        })
        .count()
}

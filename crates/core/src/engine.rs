//! The judgment engine (C8, §4.8): pure value-to-value computation from
//! aggregated per-dimension scores to a final `Judgment`. Given identical
//! inputs it always produces the identical output — no I/O, no randomness,
//! no lock acquisition. Side effects (emitting the φ-bound violation events
//! this module only *detects*) are the orchestrator's job, which is why
//! `judge` returns the violations alongside the judgment rather than
//! emitting them itself.

use cynic_shared::constants::{round_q_score, PHI_INV, PHI_INV_2};
use cynic_shared::{
    Axiom, AxiomContribution, AxiomStatus, CellId, ConsciousnessLevel, CynicResult, Dimension,
    DogVote, Judgment,
};
use std::collections::BTreeMap;

/// A φ-bound clamp firing on one dimension or one axiom (§4.8 step 2):
/// "any value > φ⁻¹ is recorded as a FIDELITY/RESTRAINT violation event and
/// clamped to φ⁻¹ before aggregation."
#[derive(Debug, Clone, PartialEq)]
pub enum PhiBoundViolation {
    Dimension { dimension: Dimension, raw: f64 },
    Axiom { axiom: Axiom, raw: f64 },
}

/// Everything the engine needs from the consensus stage and the cycle
/// context, gathered so `judge` stays a single pure function call.
pub struct JudgeInput<'a> {
    pub cell_id: CellId,
    pub per_dimension: &'a BTreeMap<Dimension, f64>,
    pub votes: &'a [DogVote],
    pub consensus_reached: bool,
    pub consensus_votes: usize,
    pub residual_variance: f64,
    pub unnameable_detected: bool,
    pub level_used: ConsciousnessLevel,
    pub cost_usd: f64,
    pub llm_calls: u32,
    pub duration_ms: u64,
}

/// Runs steps 1-6 of §4.8 against `input`, returning the finished judgment
/// plus any φ-bound clamps that fired along the way.
pub fn judge(input: JudgeInput<'_>) -> CynicResult<(Judgment, Vec<PhiBoundViolation>)> {
    let mut violations = Vec::new();

    // Step 1 + 2: group by axiom, clamp each dimension to phi^-1 first.
    let mut by_axiom: BTreeMap<Axiom, Vec<f64>> = BTreeMap::new();
    for (&dim, &raw) in input.per_dimension {
        let Some(axiom) = dim.axiom() else {
            continue; // TheUnnameable is never scored directly.
        };
        let clamped = if raw > PHI_INV {
            violations.push(PhiBoundViolation::Dimension { dimension: dim, raw });
            PHI_INV
        } else {
            raw
        };
        by_axiom.entry(axiom).or_default().push(clamped);
    }

    let mut axioms = BTreeMap::new();
    for axiom in Axiom::ALL {
        let scores = by_axiom.get(&axiom);
        let raw_score = match scores {
            Some(values) if !values.is_empty() => {
                values.iter().sum::<f64>() / values.len() as f64
            }
            _ => f64::NAN,
        };
        let axiom_score_unclamped = if raw_score.is_finite() {
            raw_score.clamp(0.0, 1.0)
        } else {
            f64::NAN
        };
        let (axiom_score, clamped) = if axiom_score_unclamped.is_finite() && axiom_score_unclamped > PHI_INV {
            violations.push(PhiBoundViolation::Axiom {
                axiom,
                raw: axiom_score_unclamped,
            });
            (PHI_INV, true)
        } else {
            (axiom_score_unclamped, false)
        };
        let status = axiom_maturity_tier(axiom_score);
        axioms.insert(
            axiom,
            AxiomContribution {
                axiom_score: if axiom_score.is_finite() { axiom_score } else { 0.0 },
                status,
                clamped,
            },
        );
    }

    // Step 3: geometric mean over the 5 axioms. Missing/NaN axioms default
    // to phi^-2 so one absent axiom doesn't collapse the product to zero.
    let k = Axiom::ALL.len() as f64;
    let product: f64 = Axiom::ALL
        .iter()
        .map(|axiom| {
            let score = axioms[axiom].axiom_score;
            if score.is_finite() && score > 0.0 {
                score
            } else {
                PHI_INV_2
            }
        })
        .product();
    let q_score_raw = product.powf(1.0 / k);

    // Step 4.
    let q_score_pct = (100.0 * q_score_raw).clamp(0.0, 100.0);

    // Step 6: weighted mean of dog confidences (equal weight per dog — the
    // catalog weight is already folded into the per-dimension aggregation
    // upstream in C7), scaled by the consensus factor.
    let confidence_raw = if input.votes.is_empty() {
        0.0
    } else {
        input.votes.iter().map(|v| v.confidence).sum::<f64>() / input.votes.len() as f64
    };
    let consensus_factor = if input.consensus_reached { 1.0 } else { PHI_INV };
    let confidence = (confidence_raw * consensus_factor).min(PHI_INV);

    let judgment = Judgment::new(
        input.cell_id,
        round_q_score(q_score_pct),
        confidence,
        input.level_used,
        input.votes.to_vec(),
        axioms,
        input.residual_variance,
        input.consensus_reached,
        input.consensus_votes,
        input.unnameable_detected,
        input.cost_usd,
        input.llm_calls,
        input.duration_ms,
    )?;

    Ok((judgment, violations))
}

/// Maps one axiom's clamped score to a maturity tier. This is a per-judgment
/// read, distinct from the organism-wide `AxiomStatusRecord` the state
/// manager accumulates across many judgments (§4.3) — a single low-scoring
/// judgment does not retroactively mark a long-mature axiom dormant.
fn axiom_maturity_tier(axiom_score: f64) -> AxiomStatus {
    if !axiom_score.is_finite() || axiom_score < PHI_INV_2 {
        AxiomStatus::Dormant
    } else if axiom_score < PHI_INV {
        AxiomStatus::Awakening
    } else {
        AxiomStatus::Mature
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cynic_shared::Reality;

    fn cell_id() -> CellId {
        CellId::derive("content", "context", Reality::Code.as_str(), "QUALITY")
    }

    fn full_scores(value: f64) -> BTreeMap<Dimension, f64> {
        Dimension::ALL
            .into_iter()
            .filter(|d| *d != Dimension::TheUnnameable)
            .map(|d| (d, value))
            .collect()
    }

    fn sample_vote(confidence: f64) -> DogVote {
        let mut scores = BTreeMap::new();
        scores.insert(Dimension::Coherence, 0.5);
        DogVote::new("dog.test", scores, confidence, 0.0, 1).unwrap()
    }

    #[test]
    fn uniform_high_scores_yield_high_q_score_and_howl() {
        let per_dimension = full_scores(0.9);
        let votes = vec![sample_vote(PHI_INV), sample_vote(PHI_INV)];
        let input = JudgeInput {
            cell_id: cell_id(),
            per_dimension: &per_dimension,
            votes: &votes,
            consensus_reached: true,
            consensus_votes: 2,
            residual_variance: 0.01,
            unnameable_detected: false,
            level_used: ConsciousnessLevel::Macro,
            cost_usd: 0.0,
            llm_calls: 0,
            duration_ms: 5,
        };
        let (judgment, violations) = judge(input).unwrap();
        // 0.9 clamps to phi^-1 (~0.618) per dimension/axiom, so q_score
        // should land exactly at the clamp ceiling, not at 90.
        assert!(judgment.q_score < 70.0);
        assert!(!violations.is_empty());
    }

    #[test]
    fn missing_axiom_defaults_to_phi_inv_squared_not_zero() {
        let mut per_dimension = BTreeMap::new();
        per_dimension.insert(Dimension::Coherence, 0.5); // PHI axiom only
        let votes = vec![sample_vote(PHI_INV)];
        let input = JudgeInput {
            cell_id: cell_id(),
            per_dimension: &per_dimension,
            votes: &votes,
            consensus_reached: false,
            consensus_votes: 0,
            residual_variance: 0.0,
            unnameable_detected: false,
            level_used: ConsciousnessLevel::Reflex,
            cost_usd: 0.0,
            llm_calls: 0,
            duration_ms: 1,
        };
        let (judgment, _) = judge(input).unwrap();
        assert!(judgment.q_score > 0.0);
    }

    #[test]
    fn confidence_never_exceeds_phi_inv_bound() {
        let per_dimension = full_scores(0.3);
        let votes = vec![sample_vote(PHI_INV), sample_vote(PHI_INV)];
        let input = JudgeInput {
            cell_id: cell_id(),
            per_dimension: &per_dimension,
            votes: &votes,
            consensus_reached: true,
            consensus_votes: 2,
            residual_variance: 0.1,
            unnameable_detected: false,
            level_used: ConsciousnessLevel::Macro,
            cost_usd: 0.0,
            llm_calls: 0,
            duration_ms: 5,
        };
        let (judgment, _) = judge(input).unwrap();
        assert!(judgment.confidence <= PHI_INV + 1e-9);
    }

    #[test]
    fn non_consensus_applies_phi_inv_confidence_penalty() {
        let per_dimension = full_scores(0.3);
        let votes = vec![sample_vote(PHI_INV)];
        let reached = JudgeInput {
            cell_id: cell_id(),
            per_dimension: &per_dimension,
            votes: &votes,
            consensus_reached: true,
            consensus_votes: 1,
            residual_variance: 0.1,
            unnameable_detected: false,
            level_used: ConsciousnessLevel::Macro,
            cost_usd: 0.0,
            llm_calls: 0,
            duration_ms: 5,
        };
        let not_reached = JudgeInput {
            consensus_reached: false,
            ..reached_copy(&per_dimension, &votes)
        };
        let (with_consensus, _) = judge(reached).unwrap();
        let (without_consensus, _) = judge(not_reached).unwrap();
        assert!(without_consensus.confidence < with_consensus.confidence);
    }

    fn reached_copy<'a>(per_dimension: &'a BTreeMap<Dimension, f64>, votes: &'a [DogVote]) -> JudgeInput<'a> {
        JudgeInput {
            cell_id: cell_id(),
            per_dimension,
            votes,
            consensus_reached: true,
            consensus_votes: 1,
            residual_variance: 0.1,
            unnameable_detected: false,
            level_used: ConsciousnessLevel::Macro,
            cost_usd: 0.0,
            llm_calls: 0,
            duration_ms: 5,
        }
    }
}

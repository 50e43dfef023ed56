//! §8 scenario 6 ("confidence bound"): every dog reporting confidence 1.0
//! must still yield a `Judgment.confidence <= phi^-1`, and a score of 1.0
//! must be clamped (FIDELITY/RESTRAINT-style violation) before it reaches
//! the axiom aggregation. Driven through `consensus::aggregate` +
//! `engine::judge` together, the same two stages the orchestrator chains.

mod common;

use cynic_core::consensus;
use cynic_core::engine::{self, JudgeInput, PhiBoundViolation};
use cynic_shared::{CellId, ConsciousnessLevel, Dimension, DogVote};
use std::collections::BTreeMap;

fn overconfident_vote(dog_id: &str, dims: &[Dimension]) -> DogVote {
    let mut scores = BTreeMap::new();
    for &d in dims {
        scores.insert(d, 1.0);
    }
    // DogVote::new clamps confidence to phi^-1 at construction, so this
    // directly exercises the per-dog confidence bound too.
    DogVote::new(dog_id, scores, 1.0, 0.0, 1).unwrap()
}

#[tokio::test]
async fn all_dogs_reporting_maximal_confidence_still_bounds_judgment_confidence() {
    let votes = vec![
        overconfident_vote("dog.a", &[Dimension::Coherence, Dimension::Harmony]),
        overconfident_vote("dog.b", &[Dimension::Coherence, Dimension::Structure]),
        overconfident_vote("dog.c", &[Dimension::Accuracy, Dimension::Integrity]),
    ];

    for vote in &votes {
        assert!(vote.confidence <= cynic_shared::constants::MAX_CONFIDENCE);
    }

    let consensus_result = consensus::aggregate(&votes, 11);
    let judge_input = JudgeInput {
        cell_id: CellId::derive("x", "", "CODE", "QUALITY"),
        per_dimension: &consensus_result.per_dimension,
        votes: &votes,
        consensus_reached: consensus_result.consensus_reached,
        consensus_votes: 0,
        residual_variance: consensus_result.residual_variance,
        unnameable_detected: consensus_result.unnameable_detected,
        level_used: ConsciousnessLevel::Macro,
        cost_usd: 0.0,
        llm_calls: 0,
        duration_ms: 1,
    };

    let (judgment, violations) = engine::judge(judge_input).unwrap();
    assert!(judgment.confidence <= cynic_shared::constants::MAX_CONFIDENCE);
    assert!(
        !violations.is_empty(),
        "a raw score of 1.0 must trip at least one phi-bound violation"
    );
    assert!(violations
        .iter()
        .any(|v| matches!(v, PhiBoundViolation::Dimension { raw, .. } if *raw > cynic_shared::constants::PHI_INV)));
}

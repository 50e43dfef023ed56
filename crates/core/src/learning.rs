//! The learning loop (C10, §4.10): three event-driven sub-mechanisms —
//! Q-learning reward propagation, Thompson-sampled dog routing, and the
//! residual-dimension promotion detector. All three write through
//! [`crate::state::OrganismState`]'s single lock; none hold state of their
//! own. The Beta-posterior sampling is grounded on the `rand_distr` usage
//! pattern common across this stack's scoring/ranking code, generalized
//! here from a single draw to a per-dog independent draw per routing call.

use crate::committee::Committee;
use crate::config::Config;
use crate::state::OrganismState;
use cynic_shared::{Cell, ProposedAction};
use rand::Rng;
use rand_distr::Distribution;
use std::cmp::Ordering;

/// A coarse state signature grouping cells the routing/Q-table should
/// generalize across: reality, time horizon, and level of detail. Two
/// cells with the same signature are treated as "the same situation" for
/// both the Q-table and the posterior table.
pub fn state_signature(cell: &Cell) -> String {
    format!("{}:{}:{}", cell.reality, cell.time_dim, cell.lod)
}

/// `q(s,a) <- q(s,a) + alpha * (reward + gamma * max_a' q(s',a') - q(s,a))`,
/// per §4.10. `next_state_signature` is the signature the *next* cycle
/// would route under — for a terminal action (no further cycle followed
/// from it) callers pass the same signature back, which makes the
/// bootstrap term a no-op-ish self-reference rather than requiring a
/// sentinel "no next state" case.
pub async fn q_update(
    state: &OrganismState,
    config: &Config,
    state_signature: &str,
    action_id: &str,
    reward: f64,
    next_state_signature: &str,
) -> f64 {
    let reward = reward.clamp(-1.0, 1.0);
    let key = (state_signature.to_string(), action_id.to_string());
    let current = state.qtable_get(&key).await;
    let max_next = state
        .qtable_actions_for_state(next_state_signature)
        .await
        .into_iter()
        .map(|(_, v)| v)
        .fold(0.0_f64, f64::max);
    let updated = current + config.alpha * (reward * 100.0 + config.gamma * max_next - current);
    state.qtable_set(key, updated).await;
    updated.clamp(0.0, 100.0)
}

/// Feeds a resolved action's reward into the Q-table, using the action's
/// own payload as the action-id component of the Q-key (so repeated
/// instances of "the same move" in the same situation accumulate value).
pub async fn learn_from_action(
    state: &OrganismState,
    config: &Config,
    state_signature: &str,
    action: &ProposedAction,
) -> Option<f64> {
    let reward = action.reward()?;
    Some(q_update(state, config, state_signature, &action.payload, reward, state_signature).await)
}

/// One candidate dog and its drawn posterior sample, kept together so the
/// ranking and tie-break logic has both in hand.
struct Draw {
    dog_id: String,
    sample: f64,
}

/// Samples each candidate dog's Beta(α, β) posterior and returns the
/// top-`k` ids by drawn value, with fixed-order tie-breaks (by `dog_id`,
/// per §4.10's "breaks ties by a fixed, documented order — name, not
/// insertion order"). With probability φ⁻³ (~23.6%), swaps the lowest
/// surviving pick for the next-best excluded candidate — the "falsification
/// experiment" exploration step.
pub async fn route(
    state: &OrganismState,
    config: &Config,
    committee: &Committee,
    cell_signature: &str,
    top_k: usize,
) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut draws = Vec::with_capacity(committee.len());
    for dog_id in committee.dog_ids() {
        let (alpha, beta) = state.posterior(cell_signature, &dog_id).await;
        let dist = rand_distr::Beta::new(alpha.max(1e-6), beta.max(1e-6))
            .expect("alpha/beta are clamped positive above");
        let sample = dist.sample(&mut rng);
        draws.push(Draw { dog_id, sample });
    }

    draws.sort_by(|a, b| {
        b.sample
            .partial_cmp(&a.sample)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.dog_id.cmp(&b.dog_id))
    });

    let k = top_k.min(draws.len());
    let mut chosen: Vec<Draw> = draws.drain(..k).collect();
    let excluded = draws;

    if !excluded.is_empty() && !chosen.is_empty() && rng.gen_bool(config.exploration_rate) {
        chosen.pop();
        let mut excluded = excluded;
        excluded.sort_by(|a, b| a.dog_id.cmp(&b.dog_id));
        chosen.push(excluded.into_iter().next().expect("checked non-empty above"));
    }

    chosen.into_iter().map(|d| d.dog_id).collect()
}

/// Updates the routed dog's posterior by the observed binary outcome, per
/// §4.10's "on outcome, update α or β by the binary success signal."
pub async fn record_routing_outcome(
    state: &OrganismState,
    cell_signature: &str,
    dog_id: &str,
    success: bool,
) {
    state.update_posterior(cell_signature, dog_id, success).await;
}

/// Only the strongest dissent signals cast a promotion vote. Every call
/// into `observe_unnameable` already cleared the detection threshold φ⁻¹
/// (§4.7 step 4), so gating the vote on that same value would pin
/// `votes_for_promotion` at `observation_count` the instant a signature is
/// first observed — the ratio invariant (§3: "promoted only when
/// `votes_for_promotion/observation_count >= φ⁻¹`") would never be able to
/// fail. Requiring the variance to clear a second, stricter cut further
/// into the `[φ⁻¹, 1.0]` band — the point φ⁻² of the way through the
/// remaining span — makes the vote a real function of how decisively this
/// particular cell's dissent reads as unnameable, not a constant.
fn votes_for_promotion(residual_variance: f64) -> bool {
    use cynic_shared::constants::{PHI_INV, PHI_INV_2};
    let vote_threshold = PHI_INV + (1.0 - PHI_INV) * PHI_INV_2;
    residual_variance > vote_threshold
}

/// The residual-dimension promotion detector (§4.10 third mechanism): call
/// once per judgment that set `unnameable_detected`, passing that cycle's
/// `residual_variance` so the promotion vote reflects how strong this
/// particular observation's dissent was. Returns `Some` with the staged
/// proposal the first time the signature crosses both thresholds — the
/// not-promotable -> promotable transition recorded in state — never on
/// subsequent cycles that still satisfy the (now permanently true) ratio
/// (§8 scenario 4: "exactly one AXIOM_ACTIVATED event fired at the 50th
/// observation"). Staging never mutates the catalog in-process, it only
/// surfaces the candidate for human confirmation (the event payload the
/// caller emits).
pub async fn observe_unnameable(
    state: &OrganismState,
    config: &Config,
    signature: &str,
    residual_variance: f64,
) -> Option<ResidualPromotion> {
    let promotion_vote = votes_for_promotion(residual_variance);
    let residual = state
        .observe_residual(signature, residual_variance, promotion_vote)
        .await;
    if !residual.is_promotable(config.residual_min_observations, config.residual_promotion_ratio) {
        return None;
    }
    if !state.mark_promoted_if_new(signature).await {
        return None;
    }
    Some(ResidualPromotion {
        signature: signature.to_string(),
        observation_count: residual.observation_count,
        votes_for_promotion: residual.votes_for_promotion,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidualPromotion {
    pub signature: String,
    pub observation_count: u64,
    pub votes_for_promotion: u64,
}

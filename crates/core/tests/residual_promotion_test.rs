//! §8 scenario 4 ("residual promotion"): feeding the same residual
//! signature observations until the promotion ratio clears φ⁻¹ at 50
//! observations must surface exactly one promotion, and not before, and
//! never again once the not-promotable -> promotable edge has fired.

mod common;

use common::test_config;
use cynic_core::learning::observe_unnameable;
use cynic_core::state::OrganismState;
use cynic_shared::constants::PHI_INV;

// Only variance past this stricter cut (see `learning::votes_for_promotion`)
// casts a promotion vote; anything at or below still accrues observations
// but never votes yes.
const STRONG_DISSENT: f64 = 1.0;
const WEAK_DISSENT: f64 = PHI_INV + 0.01;

#[tokio::test]
async fn promotion_fires_once_at_the_transition_once_ratio_clears() {
    let config = test_config(common::unique_data_dir("residual-promotion"));
    let state = OrganismState::new(config.data_dir.clone());

    let mut promotions = Vec::new();
    // ~40 of 60 planned observations carry strong dissent (and so vote to
    // promote); interleaved with weak ones so the ratio only clears phi^-1
    // partway through, not immediately.
    for i in 0..60u64 {
        let variance = if i % 3 != 0 { STRONG_DISSENT } else { WEAK_DISSENT };
        if let Some(promotion) =
            observe_unnameable(&state, &config, "residual.same.signature", variance).await
        {
            promotions.push(promotion);
        }
    }

    assert_eq!(
        promotions.len(),
        1,
        "the not-promotable -> promotable edge should surface exactly once"
    );

    // Further observations of the same already-promoted signature must not
    // re-surface a promotion, however strong their dissent.
    for _ in 0..10 {
        assert!(
            observe_unnameable(&state, &config, "residual.same.signature", STRONG_DISSENT)
                .await
                .is_none()
        );
    }

    let residual_after = state
        .residual("residual.same.signature")
        .await
        .expect("residual recorded");
    assert_eq!(residual_after.observation_count, 70);
}

#[tokio::test]
async fn promotion_never_fires_below_minimum_observations() {
    let config = test_config(common::unique_data_dir("residual-promotion-early"));
    let state = OrganismState::new(config.data_dir.clone());

    let mut promotions = Vec::new();
    for _ in 0..config.residual_min_observations - 1 {
        if let Some(p) =
            observe_unnameable(&state, &config, "residual.too.early", STRONG_DISSENT).await
        {
            promotions.push(p);
        }
    }
    assert!(promotions.is_empty());
}

#[tokio::test]
async fn low_promotion_ratio_never_promotes_even_past_threshold() {
    let config = test_config(common::unique_data_dir("residual-promotion-low-ratio"));
    let state = OrganismState::new(config.data_dir.clone());

    let mut promotions = Vec::new();
    for i in 0..200u64 {
        // Only 1 in 5 observations carries strong enough dissent to vote
        // yes: the ratio settles around 0.2, well under phi^-1 (~0.618), so
        // this signature should never promote however many observations it
        // accrues.
        let variance = if i % 5 == 0 { STRONG_DISSENT } else { WEAK_DISSENT };
        if let Some(p) =
            observe_unnameable(&state, &config, "residual.mostly.noise", variance).await
        {
            promotions.push(p);
        }
    }
    let residual = state.residual("residual.mostly.noise").await.expect("residual recorded");
    assert!(!residual.is_promotable(config.residual_min_observations, config.residual_promotion_ratio));
    assert!(promotions.is_empty());
}

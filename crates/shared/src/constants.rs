//! Golden-ratio constants and verdict thresholds shared by every scoring
//! component. Pure arithmetic, no I/O.

/// φ = (1 + √5) / 2.
pub const PHI: f64 = 1.618_033_988_749_895;

/// φ⁻¹ ≈ 0.618, the value every `Judgment.confidence` is bounded by.
/// Computed once from `(√5 − 1) / 2` in double precision per the external
/// numeric-semantics contract.
pub const PHI_INV: f64 = 0.618_033_988_749_895;

/// φ⁻².
pub const PHI_INV_2: f64 = PHI_INV * PHI_INV;

/// φ⁻³. Used as the Thompson-routing exploration rate (~23.6%).
pub const PHI_INV_3: f64 = PHI_INV_2 * PHI_INV;

/// The hard ceiling every `Judgment.confidence` must respect.
pub const MAX_CONFIDENCE: f64 = PHI_INV;

/// Capacity shared by the judgment ring and the pending-actions FIFO (F(11)).
pub const RING_CAPACITY: usize = 89;

/// Suggested event-bus bounded-queue capacity (F(13)).
pub const BUS_QUEUE_CAPACITY: usize = 233;

/// `verdict_of` thresholds, compared against the *rounded* q_score per the
/// numeric-semantics contract.
pub const BARK_CEILING: f64 = 38.0;
pub const GROWL_CEILING: f64 = 50.0;
pub const WAG_CEILING: f64 = 82.0;

/// Rounds `q_score` to 3 decimals and `confidence` to 4, matching the
/// bit-exact write contract.
pub fn round_q_score(q_score: f64) -> f64 {
    (q_score * 1_000.0).round() / 1_000.0
}

pub fn round_confidence(confidence: f64) -> f64 {
    (confidence * 10_000.0).round() / 10_000.0
}

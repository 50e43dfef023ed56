//! The value model (§3): `Cell` in, `Judgment` out, plus the supporting
//! records a judgment cycle produces or consumes along the way. Every
//! constructor here enforces the invariant at creation time rather than
//! leaving it to callers to remember — the same posture as
//! `exiv_shared`'s validated newtypes.

use crate::catalog::{Axiom, ConsciousnessLevel, Dimension, Verdict};
use crate::constants::{round_confidence, round_q_score, MAX_CONFIDENCE};
use crate::error::{CynicError, CynicResult};
use crate::ids::{new_action_id, new_judgment_id, new_residual_id, CellId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The seven realities a cell can originate from, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reality {
    Code,
    Solana,
    Market,
    Social,
    Human,
    #[serde(rename = "SELF")]
    SelfReality,
    Cosmos,
}

impl Reality {
    pub fn as_str(self) -> &'static str {
        match self {
            Reality::Code => "CODE",
            Reality::Solana => "SOLANA",
            Reality::Market => "MARKET",
            Reality::Social => "SOCIAL",
            Reality::Human => "HUMAN",
            Reality::SelfReality => "SELF",
            Reality::Cosmos => "COSMOS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CODE" => Some(Reality::Code),
            "SOLANA" => Some(Reality::Solana),
            "MARKET" => Some(Reality::Market),
            "SOCIAL" => Some(Reality::Social),
            "HUMAN" => Some(Reality::Human),
            "SELF" => Some(Reality::SelfReality),
            "COSMOS" => Some(Reality::Cosmos),
            _ => None,
        }
    }
}

impl std::fmt::Display for Reality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeDim {
    Past,
    Present,
    Future,
}

impl TimeDim {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeDim::Past => "PAST",
            TimeDim::Present => "PRESENT",
            TimeDim::Future => "FUTURE",
        }
    }
}

impl std::fmt::Display for TimeDim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of judgment. `content` is the thing being judged, `context` the
/// surrounding circumstance, `reality`/`analysis` select which dogs and
/// which axiom weighting apply. `lod` (level of detail, 0..=3) and
/// `budget_usd` flow through to the orchestrator and governor unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub cell_id: CellId,
    pub content: String,
    pub context: String,
    pub reality: Reality,
    pub analysis: String,
    pub time_dim: TimeDim,
    pub lod: u8,
    pub budget_usd: f64,
    pub level: Option<ConsciousnessLevel>,
    pub created_at: DateTime<Utc>,
}

/// Bounds the `content`/`context` strings can't exceed — "bounded string or
/// blob" per §3. 256 KiB is generous for a code snippet or a social post and
/// keeps a single cell from monopolizing an LLM adapter's context window.
pub const MAX_CONTENT_BYTES: usize = 256 * 1024;
pub const MAX_CONTEXT_BYTES: usize = 64 * 1024;

impl Cell {
    /// `content` must be non-empty — an empty cell has nothing for any dog
    /// to score, so it is rejected at construction rather than producing a
    /// vacuous judgment later. `lod` is clamped into `0..=3` and
    /// `budget_usd` must be non-negative.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        content: impl Into<String>,
        context: impl Into<String>,
        reality: Reality,
        analysis: impl Into<String>,
        time_dim: TimeDim,
        lod: u8,
        budget_usd: f64,
    ) -> CynicResult<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(CynicError::InvalidInput {
                reason: "cell content must not be empty".into(),
            });
        }
        if content.len() > MAX_CONTENT_BYTES {
            return Err(CynicError::InvalidInput {
                reason: format!("cell content exceeds {MAX_CONTENT_BYTES} bytes"),
            });
        }
        let context = context.into();
        if context.len() > MAX_CONTEXT_BYTES {
            return Err(CynicError::InvalidInput {
                reason: format!("cell context exceeds {MAX_CONTEXT_BYTES} bytes"),
            });
        }
        if !budget_usd.is_finite() || budget_usd < 0.0 {
            return Err(CynicError::InvalidInput {
                reason: format!("budget_usd must be non-negative, got {budget_usd}"),
            });
        }
        let analysis = analysis.into();
        let cell_id = CellId::derive(&content, &context, reality.as_str(), &analysis);
        Ok(Self {
            cell_id,
            content,
            context,
            reality,
            analysis,
            time_dim,
            lod: lod.min(3),
            budget_usd,
            level: None,
            created_at: Utc::now(),
        })
    }

    /// Builder-style level override, used by callers that want a specific
    /// consciousness level rather than auto-selection.
    #[must_use]
    pub fn with_level(mut self, level: ConsciousnessLevel) -> Self {
        self.level = Some(level);
        self
    }
}

/// One dog's opinion on one cell: a score per dimension it is responsible
/// for (each in `[0, 1]`, per §4.5), the dog's self-reported confidence
/// (clamped to φ⁻¹ on construction, per §4.6), plus the cost and wall-clock
/// it took to produce them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DogVote {
    pub dog_id: String,
    pub scores: BTreeMap<Dimension, f64>,
    pub confidence: f64,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

impl DogVote {
    /// Every score must land in `[0, 1]` — out-of-range votes are rejected
    /// immediately rather than silently skewing the weighted mean.
    /// Confidence above φ⁻¹ is clamped rather than rejected: a dog's
    /// overconfidence is an expected occurrence the system bounds, not a
    /// construction error.
    pub fn new(
        dog_id: impl Into<String>,
        scores: BTreeMap<Dimension, f64>,
        confidence: f64,
        cost_usd: f64,
        duration_ms: u64,
    ) -> CynicResult<Self> {
        for &score in scores.values() {
            if !score.is_finite() || !(0.0..=1.0).contains(&score) {
                return Err(CynicError::ScoreOutOfRange { value: score });
            }
        }
        let confidence = confidence.clamp(0.0, MAX_CONFIDENCE);
        Ok(Self {
            dog_id: dog_id.into(),
            scores,
            confidence,
            cost_usd,
            duration_ms,
        })
    }
}

/// A dog's per-cycle health, as tracked by the committee. Distinct from
/// `cynic_core::state::DogStatus`, which is the richer observable-state
/// record (§3's `DogStatus` entity: activity, last verdict, ...) the state
/// manager keeps in its MEMORY-layer dog registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DogHealth {
    Active,
    Degraded,
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxiomStatus {
    Dormant,
    Awakening,
    Mature,
}

/// A single axiom's contribution to the aggregate judgment: its weighted
/// mean score across its seven dimensions, plus whether the φ-bound clamp
/// fired for any dimension feeding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxiomContribution {
    pub axiom_score: f64,
    pub status: AxiomStatus,
    pub clamped: bool,
}

/// The aggregated verdict on a cell (§3, C8). `confidence` is bounded by
/// `MAX_CONFIDENCE` — never absolute certainty, per the φ-bound invariant.
/// `axiom_scores`/`dog_votes` are the flattened maps the spec's external
/// contract names directly; `axioms`/`votes` carry the richer structured
/// form the engine/consensus stages actually compute from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    pub judgment_id: Uuid,
    pub cell_id: CellId,
    pub verdict: Verdict,
    pub q_score: f64,
    pub confidence: f64,
    pub axiom_scores: BTreeMap<Axiom, f64>,
    pub dog_votes: BTreeMap<String, f64>,
    pub consensus_reached: bool,
    pub consensus_votes: usize,
    pub residual_variance: f64,
    pub unnameable_detected: bool,
    pub cost_usd: f64,
    pub llm_calls: u32,
    pub duration_ms: u64,
    pub level_used: ConsciousnessLevel,
    pub axioms: BTreeMap<Axiom, AxiomContribution>,
    pub votes: Vec<DogVote>,
    pub created_at: DateTime<Utc>,
}

impl Judgment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cell_id: CellId,
        q_score_raw: f64,
        confidence: f64,
        level_used: ConsciousnessLevel,
        votes: Vec<DogVote>,
        axioms: BTreeMap<Axiom, AxiomContribution>,
        residual_variance: f64,
        consensus_reached: bool,
        consensus_votes: usize,
        unnameable_detected: bool,
        cost_usd: f64,
        llm_calls: u32,
        duration_ms: u64,
    ) -> CynicResult<Self> {
        if !q_score_raw.is_finite() || !(0.0..=100.0).contains(&q_score_raw) {
            return Err(CynicError::ScoreOutOfRange { value: q_score_raw });
        }
        if !confidence.is_finite() || confidence > MAX_CONFIDENCE || confidence < 0.0 {
            return Err(CynicError::ConfidenceOutOfBounds {
                value: confidence,
                bound: MAX_CONFIDENCE,
            });
        }
        let q_score = round_q_score(q_score_raw);
        let confidence = round_confidence(confidence);
        let verdict = crate::catalog::verdict_of(q_score);
        let axiom_scores = axioms.iter().map(|(a, c)| (*a, c.axiom_score)).collect();
        let dog_votes = votes
            .iter()
            .flat_map(|v| {
                let mean = if v.scores.is_empty() {
                    0.0
                } else {
                    v.scores.values().sum::<f64>() / v.scores.len() as f64
                };
                std::iter::once((v.dog_id.clone(), mean))
            })
            .collect();
        Ok(Self {
            judgment_id: new_judgment_id(),
            cell_id,
            verdict,
            q_score,
            confidence,
            axiom_scores,
            dog_votes,
            consensus_reached,
            consensus_votes,
            residual_variance,
            unnameable_detected,
            cost_usd,
            llm_calls,
            duration_ms,
            level_used,
            axioms,
            votes,
            created_at: Utc::now(),
        })
    }

    /// A degraded judgment produced when a REFLEX-level cycle times out
    /// (§4.9): fixed verdict GROWL, confidence φ⁻², full residual variance,
    /// no votes.
    pub fn degraded_timeout(cell_id: CellId, duration_ms: u64) -> Self {
        use crate::constants::PHI_INV_2;
        Self {
            judgment_id: new_judgment_id(),
            cell_id,
            verdict: Verdict::Growl,
            q_score: round_q_score(45.0),
            confidence: round_confidence(PHI_INV_2),
            axiom_scores: BTreeMap::new(),
            dog_votes: BTreeMap::new(),
            consensus_reached: false,
            consensus_votes: 0,
            residual_variance: 1.0,
            unnameable_detected: false,
            cost_usd: 0.0,
            llm_calls: 0,
            duration_ms,
            level_used: ConsciousnessLevel::Reflex,
            axioms: BTreeMap::new(),
            votes: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    Success,
    Failure,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    Investigate,
    Refactor,
    Alert,
    Monitor,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Investigate => "INVESTIGATE",
            ActionType::Refactor => "REFACTOR",
            ActionType::Alert => "ALERT",
            ActionType::Monitor => "MONITOR",
        }
    }
}

/// A downstream instruction emitted from a judgment (§3), and (once
/// observed) the outcome used to shape the learning-loop reward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedAction {
    pub action_id: Uuid,
    pub action_type: ActionType,
    pub priority: u8,
    pub source_judgment_id: Uuid,
    pub payload: String,
    pub outcome: Option<ActionOutcome>,
    pub quality: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl ProposedAction {
    /// `priority` is clamped into `1..=4` per §3's `ProposedAction` range.
    pub fn new(
        source_judgment_id: Uuid,
        action_type: ActionType,
        priority: u8,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            action_id: new_action_id(),
            action_type,
            priority: priority.clamp(1, 4),
            source_judgment_id,
            payload: payload.into(),
            outcome: None,
            quality: None,
            created_at: Utc::now(),
        }
    }

    /// Records the observed outcome. `quality` is clamped into `[0, 1]`
    /// rather than rejected — a caller reporting 1.3 almost certainly means
    /// "very good," not an error worth failing the whole action over.
    pub fn resolve(&mut self, outcome: ActionOutcome, quality: f64) {
        self.outcome = Some(outcome);
        self.quality = Some(quality.clamp(0.0, 1.0));
    }

    /// `reward = base(outcome) * quality`, per the learning-loop shaping
    /// rule (DESIGN.md open-question #7). `None` until the action has been
    /// resolved.
    pub fn reward(&self) -> Option<f64> {
        let outcome = self.outcome?;
        let quality = self.quality?;
        let base = match outcome {
            ActionOutcome::Success => 1.0,
            ActionOutcome::Failure => -1.0,
            ActionOutcome::Neutral => 0.0,
        };
        Some(base * quality)
    }
}

/// A dimension the catalog does not yet name, surfaced once it has
/// accumulated enough independent observations to be worth promoting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Residual {
    pub residual_id: Uuid,
    pub signature: String,
    pub variance: f64,
    pub observation_count: u64,
    pub votes_for_promotion: u64,
    pub first_seen: DateTime<Utc>,
}

impl Residual {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            residual_id: new_residual_id(),
            signature: signature.into(),
            variance: 0.0,
            observation_count: 0,
            votes_for_promotion: 0,
            first_seen: Utc::now(),
        }
    }

    /// Incremental mean-variance update — avoids keeping every raw
    /// observation around just to recompute an average.
    pub fn observe(&mut self, variance: f64, promotion_vote: bool) {
        self.observation_count += 1;
        let n = self.observation_count as f64;
        self.variance += (variance - self.variance) / n;
        if promotion_vote {
            self.votes_for_promotion += 1;
        }
    }

    /// Promotion invariant from §3: `votes_for_promotion / observation_count
    /// >= φ⁻¹`, once `observation_count` has cleared `min_observations`.
    pub fn is_promotable(&self, min_observations: u64, promotion_ratio: f64) -> bool {
        if self.observation_count < min_observations || self.observation_count == 0 {
            return false;
        }
        let ratio = self.votes_for_promotion as f64 / self.observation_count as f64;
        ratio >= promotion_ratio
    }
}

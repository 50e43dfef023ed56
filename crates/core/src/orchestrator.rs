//! The consciousness orchestrator (C9, §4.9): runs one cell through
//! PERCEIVE → ROUTE → SCORE → AGGREGATE → JUDGE → COMMIT to a stored
//! `Judgment`, honoring cooperative cancellation and budget-driven level
//! downgrades along the way. This is the seam where C2 (bus), C3 (state),
//! C6 (committee), C7 (consensus), C8 (engine), C10 (learning), and C11
//! (governor) all meet — grounded on the teacher's `run_kernel` as "the one
//! place that wires every subsystem together," though the HTTP server loop
//! itself has no counterpart here (replaced by `perceive()` as a direct
//! async call, per DESIGN.md open question #3).

use crate::bus::EventBus;
use crate::committee::{Committee, DogEntry, DogOutcome};
use crate::config::Config;
use crate::consensus;
use crate::engine::{self, JudgeInput, PhiBoundViolation};
use crate::governor::{CycleLedger, Governor};
use crate::learning::{self, state_signature};
use crate::state::{DogStatus, OrganismState};
use cynic_shared::{
    Cell, CancelToken, ConsciousnessLevel, CynicError, CynicEvent, CynicResult, DogActivityKind,
    EventPayload, Judgment,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Orchestrator {
    committee: Committee,
    governor: Arc<Governor>,
    config: Config,
}

impl Orchestrator {
    pub fn new(committee: Committee, governor: Arc<Governor>, config: Config) -> Self {
        Self {
            committee,
            governor,
            config,
        }
    }

    pub fn committee(&self) -> &Committee {
        &self.committee
    }

    fn level_latency_ms(&self, level: ConsciousnessLevel) -> u64 {
        match level {
            ConsciousnessLevel::Reflex => self.config.reflex_latency_ms,
            ConsciousnessLevel::Micro => self.config.micro_latency_ms,
            ConsciousnessLevel::Macro => self.config.macro_latency_ms,
            ConsciousnessLevel::Meta => self.config.meta_latency_ms,
            ConsciousnessLevel::Auto => self.config.micro_latency_ms,
        }
    }

    /// Resolves `AUTO` by signal: a cell with an explicit budget below one
    /// dog's worth of heuristic cost and no stated urgency runs REFLEX;
    /// otherwise MICRO is the routine default (§4.9's table — MACRO/META
    /// are opt-in only, never auto-selected, since they are materially more
    /// expensive).
    fn resolve_level(&self, requested: ConsciousnessLevel, cell: &Cell) -> ConsciousnessLevel {
        if requested.is_schedulable() {
            return requested;
        }
        if cell.budget_usd <= 0.0 {
            ConsciousnessLevel::Reflex
        } else {
            ConsciousnessLevel::Micro
        }
    }

    async fn select_dogs_for_level<'a>(
        &'a self,
        level: ConsciousnessLevel,
        state: &OrganismState,
        signature: &str,
    ) -> Vec<&'a DogEntry> {
        match level {
            ConsciousnessLevel::Reflex => {
                // Cheapest dogs win ties by id, so REFLEX always lands on
                // free heuristic adapters when the committee has them rather
                // than on whichever costly adapter happens to sort first.
                // Two, not one: §4.9 still requires >=2 votes for quorum even
                // at the emergency level, so "single fastest dog" alone
                // would guarantee InsufficientQuorum whenever REFLEX is the
                // terminal level.
                let mut entries: Vec<&DogEntry> = self.committee.all_dogs().iter().collect();
                entries.sort_by(|a, b| {
                    a.adapter
                        .expected_cost_usd()
                        .partial_cmp(&b.adapter.expected_cost_usd())
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.dog_id.cmp(&b.dog_id))
                });
                entries.truncate(2);
                entries
            }
            ConsciousnessLevel::Micro => {
                let chosen = learning::route(state, &self.config, &self.committee, signature, 3).await;
                self.committee.dogs_named(&chosen)
            }
            ConsciousnessLevel::Macro | ConsciousnessLevel::Meta => {
                self.committee.all_dogs().iter().collect()
            }
            ConsciousnessLevel::Auto => {
                self.committee.all_dogs().iter().collect()
            }
        }
    }

    /// Runs a full judgment cycle for `cell`. See module docs for the step
    /// breakdown; failure semantics match §4.9 exactly.
    pub async fn run_cycle(
        &self,
        state: &OrganismState,
        bus: &Arc<EventBus>,
        cell: Cell,
        cancel: CancelToken,
    ) -> CynicResult<Judgment> {
        let start = Instant::now();
        let cell_id = cell.cell_id;
        let requested_level = cell.level.unwrap_or(ConsciousnessLevel::Auto);
        let mut level = self.resolve_level(requested_level, &cell);
        if self.governor.force_reflex() && level != ConsciousnessLevel::Reflex {
            let from = level;
            level = ConsciousnessLevel::Reflex;
            let event = CynicEvent::root(
                "orchestrator",
                EventPayload::ConsciousnessLevelChanged {
                    from: from.as_str().to_string(),
                    to: level.as_str().to_string(),
                    reason: "budget".to_string(),
                },
            );
            if let Err(e) = bus.emit(event).await {
                tracing::warn!(error = %e, "level-change event dropped");
            }
        }

        // PERCEIVE
        check_cancelled(&cancel, bus, "perceive").await?;
        let perceive_event = CynicEvent::root(
            "orchestrator",
            EventPayload::PerceiveRequested {
                cell_id: cell_id.as_hex(),
            },
        );
        if let Err(e) = bus.emit(perceive_event).await {
            tracing::warn!(error = %e, "perceive event dropped");
        }

        // ROUTE
        check_cancelled(&cancel, bus, "route").await?;
        let signature = state_signature(&cell);
        let mut selected = self.select_dogs_for_level(level, state, &signature).await;

        // SCORE, with an in-flight downgrade if the budget can't sustain
        // even the cheapest subset (§4.9: MACRO -> MICRO -> REFLEX).
        check_cancelled(&cancel, bus, "score").await?;
        let cycle_ledger = CycleLedger::new(cell.budget_usd);
        let dog_timeout = Duration::from_millis(self.level_latency_ms(level).min(self.config.dog_timeout_ms).max(1));

        loop {
            let affordable: Vec<&DogEntry> = selected
                .iter()
                .copied()
                .filter(|dog| !self.governor.should_skip(&cycle_ledger, dog.adapter.expected_cost_usd()))
                .collect();
            for dog in &selected {
                if !affordable.iter().any(|d| d.dog_id == dog.dog_id) {
                    emit_dog_activity(bus, &dog.dog_id, DogActivityKind::Skipped, Some("budget")).await;
                }
            }
            if affordable.len() >= 2 || level == ConsciousnessLevel::Reflex {
                selected = affordable;
                break;
            }
            let downgraded = level.downgrade();
            if downgraded == level {
                selected = affordable;
                break;
            }
            let from = level;
            level = downgraded;
            let event = CynicEvent::root(
                "orchestrator",
                EventPayload::ConsciousnessLevelChanged {
                    from: from.as_str().to_string(),
                    to: level.as_str().to_string(),
                    reason: "budget".to_string(),
                },
            );
            if let Err(e) = bus.emit(event).await {
                tracing::warn!(error = %e, "level-change event dropped");
            }
            selected = self.select_dogs_for_level(level, state, &signature).await;
        }

        let score_fut = self.committee.invoke(
            &selected,
            &cell,
            dog_timeout,
            self.config.dog_retry_budget,
            &cancel,
        );

        let outcomes = if level == ConsciousnessLevel::Reflex {
            match tokio::time::timeout(Duration::from_millis(self.config.reflex_latency_ms), score_fut).await {
                Ok(outcomes) => outcomes,
                Err(_elapsed) => {
                    let judgment = Judgment::degraded_timeout(cell_id, start.elapsed().as_millis() as u64);
                    commit(state, bus, judgment.clone()).await?;
                    return Ok(judgment);
                }
            }
        } else {
            score_fut.await
        };

        let mut votes = Vec::new();
        for outcome in outcomes {
            match outcome {
                DogOutcome::Voted(vote) => {
                    self.governor.debit(&cycle_ledger, vote.cost_usd);
                    update_dog_status(state, &vote).await;
                    emit_dog_activity(bus, &vote.dog_id, DogActivityKind::Succeeded, None).await;
                    votes.push(vote);
                }
                DogOutcome::Failed { dog_id, reason } => {
                    emit_dog_activity(bus, &dog_id, DogActivityKind::Failed, Some(&reason)).await;
                }
            }
        }

        if votes.len() < 2 {
            let err = CynicError::InsufficientQuorum { votes: votes.len() };
            let event = CynicEvent::root(
                "orchestrator",
                EventPayload::Error {
                    where_: "orchestrator::score".to_string(),
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                },
            );
            if let Err(e) = bus.emit(event).await {
                tracing::warn!(error = %e, "insufficient-quorum event dropped");
            }
            return Err(err);
        }

        // AGGREGATE
        check_cancelled(&cancel, bus, "aggregate").await?;
        let consensus_result = consensus::aggregate(&votes, self.committee.len());
        if let Some(signature) = &consensus_result.residual_signature {
            if let Some(promotion) = learning::observe_unnameable(
                state,
                &self.config,
                signature,
                consensus_result.residual_variance,
            )
            .await
            {
                let activated = CynicEvent::root(
                    "learning",
                    EventPayload::AxiomActivated {
                        axiom_id: promotion.signature.clone(),
                        signal_count: promotion.observation_count,
                        maturity: promotion.votes_for_promotion as f64
                            / promotion.observation_count.max(1) as f64,
                    },
                );
                if let Err(e) = bus.emit_with_retry(activated).await {
                    tracing::warn!(error = %e, "axiom activation event dropped");
                }
            }
        }

        // JUDGE
        check_cancelled(&cancel, bus, "judge").await?;
        let judge_input = JudgeInput {
            cell_id,
            per_dimension: &consensus_result.per_dimension,
            votes: &votes,
            consensus_reached: consensus_result.consensus_reached,
            consensus_votes: 0,
            residual_variance: consensus_result.residual_variance,
            unnameable_detected: consensus_result.unnameable_detected,
            level_used: level,
            cost_usd: votes.iter().map(|v| v.cost_usd).sum(),
            llm_calls: 0,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        let (mut judgment, violations) = engine::judge(judge_input)?;
        judgment.consensus_votes = consensus::count_consensus_votes(&votes, judgment.verdict);
        emit_phi_violations(bus, cell_id.as_hex(), &violations).await;

        // COMMIT
        check_cancelled(&cancel, bus, "commit").await?;
        commit(state, bus, judgment.clone()).await?;

        Ok(judgment)
    }
}

async fn check_cancelled(cancel: &CancelToken, bus: &Arc<EventBus>, step: &str) -> CynicResult<()> {
    if !cancel.is_cancelled() {
        return Ok(());
    }
    let event = CynicEvent::root(
        "orchestrator",
        EventPayload::Error {
            where_: format!("orchestrator::{step}"),
            kind: "Cancelled".to_string(),
            message: format!("cycle cancelled at {step}"),
        },
    );
    if let Err(e) = bus.emit(event).await {
        tracing::warn!(error = %e, "cancellation event dropped");
    }
    Err(CynicError::Cancelled {
        reason: format!("cycle cancelled at {step}"),
    })
}

async fn commit(state: &OrganismState, bus: &Arc<EventBus>, judgment: Judgment) -> CynicResult<()> {
    state.add_judgment(judgment.clone()).await;
    let event = CynicEvent::root(
        "orchestrator",
        EventPayload::JudgmentCreated {
            judgment_id: judgment.judgment_id,
            cell_id: judgment.cell_id.as_hex(),
            verdict: judgment.verdict,
            q_score: judgment.q_score,
        },
    );
    bus.emit_with_retry(event).await
}

async fn update_dog_status(state: &OrganismState, vote: &cynic_shared::DogVote) {
    let mean = if vote.scores.is_empty() {
        0.0
    } else {
        vote.scores.values().sum::<f64>() / vote.scores.len() as f64
    };
    let q = cynic_shared::constants::round_q_score(mean * 100.0);
    state
        .update_dog_status(DogStatus {
            dog_id: vote.dog_id.clone(),
            activity: crate::state::DogActivity::Idle,
            last_q_score: Some(q),
            last_verdict: Some(cynic_shared::catalog::verdict_of(q).to_string()),
            last_confidence: Some(vote.confidence),
            updated_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        })
        .await;
}

async fn emit_dog_activity(bus: &Arc<EventBus>, dog_id: &str, kind: DogActivityKind, reason: Option<&str>) {
    let event = CynicEvent::root(
        "committee",
        EventPayload::DogActivity {
            dog_id: dog_id.to_string(),
            kind,
            reason: reason.map(str::to_string),
        },
    );
    if let Err(e) = bus.emit(event).await {
        tracing::warn!(error = %e, dog_id, "dog activity event dropped");
    }
}

async fn emit_phi_violations(bus: &Arc<EventBus>, cell_id_hex: String, violations: &[PhiBoundViolation]) {
    for violation in violations {
        let message = match violation {
            PhiBoundViolation::Dimension { dimension, raw } => {
                format!("dimension {dimension} exceeded phi^-1 (raw={raw:.4}), clamped")
            }
            PhiBoundViolation::Axiom { axiom, raw } => {
                format!("axiom {axiom} exceeded phi^-1 (raw={raw:.4}), clamped")
            }
        };
        let event = CynicEvent::root(
            "engine",
            EventPayload::Error {
                where_: format!("engine::phi_bound::{cell_id_hex}"),
                kind: "PhiBoundViolation".to_string(),
                message,
            },
        );
        if let Err(e) = bus.emit(event).await {
            tracing::warn!(error = %e, "phi-bound violation event dropped");
        }
    }
}

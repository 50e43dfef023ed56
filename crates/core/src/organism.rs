//! The bootstrap handle (§1, §6): the thing a caller actually holds. Shaped
//! after the teacher's `run_kernel`/`AppState` assembly in `lib.rs` — wiring
//! config, the event bus, organism state, the dog committee, and the cost
//! governor into one `Arc`-friendly struct — minus the axum server, since
//! nothing in the spec calls for one (DESIGN.md open question #3).
//!
//! Two operations: [`Organism::perceive`] runs one cell through a judgment
//! cycle, [`Organism::snapshot`] reads the current organism state without
//! mutating it. Both are plain async methods rather than HTTP handlers —
//! the caller (a CLI, a test, an embedding application) decides how cells
//! arrive.

use crate::bus::EventBus;
use crate::committee::{default_dogs, Committee};
use crate::config::Config;
use crate::governor::Governor;
use crate::learning;
use crate::orchestrator::Orchestrator;
use crate::state::{OrganismState, StateSnapshot};
use cynic_shared::{
    ActionOutcome, ActionType, CancelToken, Cell, CynicResult, EventType, Judgment, ProposedAction,
};
use std::sync::Arc;
use std::time::Duration;

/// Everything one running organism needs, held behind `Arc`s its callers
/// can clone cheaply. Construct with [`Organism::bootstrap`].
pub struct Organism {
    pub state: Arc<OrganismState>,
    pub bus: Arc<EventBus>,
    pub governor: Arc<Governor>,
    orchestrator: Orchestrator,
    config: Config,
}

impl Organism {
    /// Loads config from the environment, spawns the event bus, builds the
    /// default eleven-dog committee, and attempts to recover persisted
    /// state from `config.data_dir`. Recovery failures are logged and fall
    /// back to a fresh organism rather than aborting startup (§6: "a
    /// corrupted or missing checkpoint is not a fatal condition").
    pub async fn bootstrap() -> anyhow::Result<Self> {
        let config = Config::load()?;
        Self::with_config(config).await
    }

    pub async fn with_config(config: Config) -> anyhow::Result<Self> {
        let bus = EventBus::spawn(
            config.bus_queue_capacity,
            Duration::from_millis(config.dog_timeout_ms),
        );
        let state = Arc::new(OrganismState::new(config.data_dir.clone()));
        if let Err(e) = state.recover().await {
            tracing::warn!(error = %e, "state recovery failed; continuing with a fresh organism");
        }

        let committee = Committee::new(default_dogs());
        let governor = Arc::new(Governor::new(config.daily_budget_usd));
        let orchestrator = Orchestrator::new(committee, governor.clone(), config.clone());

        subscribe_learning_loop(&bus, state.clone(), config.clone()).await;

        Ok(Self {
            state,
            bus,
            governor,
            orchestrator,
            config,
        })
    }

    /// Runs one judgment cycle for `cell`, end to end. See
    /// [`crate::orchestrator::Orchestrator::run_cycle`] for the step
    /// breakdown and failure semantics.
    pub async fn perceive(&self, cell: Cell) -> CynicResult<Judgment> {
        let cancel = CancelToken::new();
        self.orchestrator
            .run_cycle(&self.state, &self.bus, cell, cancel)
            .await
    }

    /// Same as `perceive`, but the caller supplies its own cancel token so
    /// it can trip cancellation from another task mid-cycle.
    pub async fn perceive_cancellable(&self, cell: Cell, cancel: CancelToken) -> CynicResult<Judgment> {
        self.orchestrator
            .run_cycle(&self.state, &self.bus, cell, cancel)
            .await
    }

    /// A read-only view of organism state, for status reporting.
    pub async fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot().await
    }

    /// Persists the PERSISTENT/CHECKPOINT layers to `config.data_dir`
    /// (§6). Callers typically run this on a timer or at shutdown.
    pub async fn persist(&self) -> CynicResult<()> {
        self.state.persist().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn committee(&self) -> &Committee {
        self.orchestrator.committee()
    }
}

/// Closes the C10 feedback loop (§4.10/§6): ACT_COMPLETED feeds the
/// Q-table through `learn_from_action`, and a LEARNING_SIGNAL naming a
/// `dog_id` feeds that dog's routing posterior through
/// `record_routing_outcome`. Without these two subscriptions the learning
/// loop only ran from unit tests calling the functions directly — never
/// from a live organism.
async fn subscribe_learning_loop(bus: &Arc<EventBus>, state: Arc<OrganismState>, config: Config) {
    let act_state = state.clone();
    let act_config = config.clone();
    bus.subscribe(
        EventType::ActCompleted,
        Arc::new(move |event| {
            let state = act_state.clone();
            let config = act_config.clone();
            Box::pin(async move {
                if let cynic_shared::EventPayload::ActCompleted {
                    action_id,
                    outcome,
                    quality,
                    state_signature,
                } = event.payload
                {
                    let mut action =
                        ProposedAction::new(action_id, ActionType::Monitor, 1, action_id.to_string());
                    action.resolve(parse_outcome(&outcome), quality);
                    let _ = learning::learn_from_action(&state, &config, &state_signature, &action).await;
                }
                Ok(())
            })
        }),
    )
    .await;

    bus.subscribe(
        EventType::LearningSignal,
        Arc::new(move |event| {
            let state = state.clone();
            Box::pin(async move {
                if let cynic_shared::EventPayload::LearningSignal {
                    dog_id: Some(dog_id),
                    reward,
                    state_signature,
                    ..
                } = event.payload
                {
                    learning::record_routing_outcome(&state, &state_signature, &dog_id, reward > 0.0)
                        .await;
                }
                Ok(())
            })
        }),
    )
    .await;
}

/// External actuators report completion as a free-form string; anything
/// other than an exact "success"/"failure" is treated as neutral rather
/// than rejected, since a malformed inbound signal should degrade the
/// reward to zero, not fail the subscription.
fn parse_outcome(outcome: &str) -> ActionOutcome {
    match outcome.to_ascii_lowercase().as_str() {
        "success" => ActionOutcome::Success,
        "failure" => ActionOutcome::Failure,
        _ => ActionOutcome::Neutral,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cynic_shared::{ConsciousnessLevel, Reality, TimeDim};

    fn test_config(data_dir: std::path::PathBuf) -> Config {
        Config {
            alpha: cynic_shared::constants::PHI_INV * 0.5,
            gamma: cynic_shared::constants::PHI_INV,
            exploration_rate: cynic_shared::constants::PHI_INV_3,
            ring_capacity: 89,
            bus_queue_capacity: 233,
            reflex_latency_ms: 50,
            micro_latency_ms: 500,
            macro_latency_ms: 5_000,
            meta_latency_ms: 30_000,
            dog_timeout_ms: 2_000,
            dog_retry_budget: 1,
            residual_min_observations: 50,
            residual_promotion_ratio: cynic_shared::constants::PHI_INV,
            daily_budget_usd: 5.0,
            data_dir,
        }
    }

    #[tokio::test]
    async fn bootstrap_then_perceive_produces_a_judgment() {
        let data_dir = std::env::temp_dir().join("cynic-test-organism-bootstrap");
        let organism = Organism::with_config(test_config(data_dir)).await.unwrap();
        let cell = Cell::new(
            "fn id<T>(x: T) -> T { x }",
            "generic identity helper",
            Reality::Code,
            "QUALITY",
            TimeDim::Present,
            1,
            1.0,
        )
        .unwrap()
        .with_level(ConsciousnessLevel::Macro);

        let judgment = organism.perceive(cell).await.unwrap();
        assert!(judgment.q_score >= 0.0 && judgment.q_score <= 100.0);

        let snapshot = organism.snapshot().await;
        assert_eq!(snapshot.judgment_count, 1);
    }

    #[tokio::test]
    async fn act_completed_event_feeds_the_q_table() {
        let data_dir = std::env::temp_dir().join("cynic-test-organism-act-completed");
        let organism = Organism::with_config(test_config(data_dir)).await.unwrap();
        let action_id = uuid::Uuid::new_v4();
        let event = cynic_shared::CynicEvent::root(
            "actuator",
            cynic_shared::EventPayload::ActCompleted {
                action_id,
                outcome: "success".to_string(),
                quality: 1.0,
                state_signature: "code:present:1".to_string(),
            },
        );
        organism.bus.emit_sync(event).await.unwrap();

        let learned = organism
            .state
            .qtable_actions_for_state("code:present:1")
            .await;
        assert_eq!(learned.len(), 1);
        assert!(learned[0].1 > 0.0);
    }

    #[tokio::test]
    async fn learning_signal_with_dog_id_updates_routing_posterior() {
        let data_dir = std::env::temp_dir().join("cynic-test-organism-learning-signal");
        let organism = Organism::with_config(test_config(data_dir)).await.unwrap();
        let event = cynic_shared::CynicEvent::root(
            "outcome-source",
            cynic_shared::EventPayload::LearningSignal {
                kind: "routing".to_string(),
                judgment_id: uuid::Uuid::new_v4(),
                reward: 1.0,
                state_signature: "code:present:1".to_string(),
                dog_id: Some("dog.phi.alpha".to_string()),
            },
        );
        organism.bus.emit_sync(event).await.unwrap();

        let (alpha, beta) = organism.state.posterior("code:present:1", "dog.phi.alpha").await;
        assert_eq!(alpha, 2.0);
        assert_eq!(beta, 1.0);
    }

    #[tokio::test]
    async fn persist_then_recover_round_trips_through_bootstrap() {
        let data_dir = std::env::temp_dir().join("cynic-test-organism-persist");
        let organism = Organism::with_config(test_config(data_dir.clone())).await.unwrap();
        organism.persist().await.unwrap();

        let reborn = Organism::with_config(test_config(data_dir)).await.unwrap();
        let snapshot = reborn.snapshot().await;
        assert_eq!(snapshot.consciousness_level, organism.snapshot().await.consciousness_level);
    }
}

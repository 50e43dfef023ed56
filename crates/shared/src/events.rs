//! The closed event-type catalog (§4.2) and the event envelope that carries
//! genealogy for loop prevention. Shaped after `exiv_shared::{ExivEvent,
//! ExivEventData}`: a `serde`-tagged payload enum plus an envelope holding
//! id/parents/timestamp, but with CYNIC's own closed catalog rather than the
//! teacher's open plugin-event set.

use crate::catalog::Verdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    PerceiveRequested,
    JudgmentCreated,
    DogActivity,
    AxiomActivated,
    ConsciousnessLevelChanged,
    LearningSignal,
    ActCompleted,
    Error,
}

impl EventType {
    /// Events the orchestrator must retry once under `BusFull` rather than
    /// silently drop, per §5's backpressure policy.
    pub fn is_critical(self) -> bool {
        matches!(self, EventType::JudgmentCreated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DogActivityKind {
    Judging,
    Succeeded,
    Failed,
    Skipped,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EventPayload {
    PerceiveRequested {
        cell_id: String,
    },
    JudgmentCreated {
        judgment_id: Uuid,
        cell_id: String,
        verdict: Verdict,
        q_score: f64,
    },
    DogActivity {
        dog_id: String,
        kind: DogActivityKind,
        reason: Option<String>,
    },
    AxiomActivated {
        axiom_id: String,
        signal_count: u64,
        maturity: f64,
    },
    ConsciousnessLevelChanged {
        from: String,
        to: String,
        reason: String,
    },
    LearningSignal {
        kind: String,
        judgment_id: Uuid,
        reward: f64,
        /// The routing/Q-table state bucket this signal applies to (§4.10's
        /// `state_signature`), and, when this is a per-dog routing-outcome
        /// report rather than a plain outcome/feedback signal, the dog it
        /// was routed to.
        state_signature: String,
        dog_id: Option<String>,
    },
    ActCompleted {
        action_id: Uuid,
        outcome: String,
        /// Caller-provided quality multiplier for the reward shaping
        /// decision (DESIGN.md open question #7), and the state bucket the
        /// action was proposed under, both supplied by the actuator
        /// reporting completion since the core does not retain them once
        /// the action left its pending queue.
        quality: f64,
        state_signature: String,
    },
    Error {
        where_: String,
        kind: String,
        message: String,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::PerceiveRequested { .. } => EventType::PerceiveRequested,
            EventPayload::JudgmentCreated { .. } => EventType::JudgmentCreated,
            EventPayload::DogActivity { .. } => EventType::DogActivity,
            EventPayload::AxiomActivated { .. } => EventType::AxiomActivated,
            EventPayload::ConsciousnessLevelChanged { .. } => {
                EventType::ConsciousnessLevelChanged
            }
            EventPayload::LearningSignal { .. } => EventType::LearningSignal,
            EventPayload::ActCompleted { .. } => EventType::ActCompleted,
            EventPayload::Error { .. } => EventType::Error,
        }
    }
}

/// The envelope every event travels in. `parents` carries the genealogy used
/// for loop detection: emitting an event whose ancestry already contains an
/// identical `(type, source)` pair is refused with `LoopDetected`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CynicEvent {
    pub event_id: Uuid,
    pub source: String,
    pub parents: Vec<Uuid>,
    pub ts: DateTime<Utc>,
    pub payload: EventPayload,
}

impl CynicEvent {
    pub fn root(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            source: source.into(),
            parents: Vec::new(),
            ts: Utc::now(),
            payload,
        }
    }

    /// Builds a child event, extending the genealogy with this event's id.
    pub fn caused_by(&self, source: impl Into<String>, payload: EventPayload) -> Self {
        let mut parents = self.parents.clone();
        parents.push(self.event_id);
        Self {
            event_id: Uuid::new_v4(),
            source: source.into(),
            parents,
            ts: Utc::now(),
            payload,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

//! Pure value model shared by every crate in the workspace: constants, the
//! axiom/dimension catalog, the error taxonomy, identity generation, the
//! event envelope, and the `Cell`/`Judgment`/... record types. Nothing in
//! this crate holds state or talks to the outside world — that lives in
//! `cynic_core`, which depends on this crate rather than the other way
//! around.

pub mod adapter;
pub mod catalog;
pub mod constants;
pub mod error;
pub mod events;
pub mod ids;
pub mod types;

pub use adapter::{AdapterOutput, CancelToken, DogAdapter};
pub use catalog::{Axiom, ConsciousnessLevel, Dimension, Verdict};
pub use error::{CynicError, CynicResult};
pub use events::{CynicEvent, DogActivityKind, EventPayload, EventType};
pub use ids::CellId;
pub use types::{
    ActionOutcome, ActionType, AxiomContribution, AxiomStatus, Cell, DogHealth, DogVote, Judgment,
    ProposedAction, Reality, Residual, TimeDim,
};

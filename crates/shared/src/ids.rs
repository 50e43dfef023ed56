//! Identity generation (§4.4). `CellId` is a deterministic content digest;
//! everything else that needs an identity (judgments, events, actions,
//! residuals) is a fresh random `Uuid`, mirroring `exiv_shared::ExivId`'s
//! `new()` constructor.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// `hash(content ‖ context ‖ reality ‖ analysis)`. Two cells built from the
/// same four fields always produce the same id, in this process or any
/// other — a property a namespaced UUID would only give us incidentally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellId([u8; 32]);

impl CellId {
    pub fn derive(content: &str, context: &str, reality: &str, analysis: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hasher.update(b"\0");
        hasher.update(context.as_bytes());
        hasher.update(b"\0");
        hasher.update(reality.as_bytes());
        hasher.update(b"\0");
        hasher.update(analysis.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_hex())
    }
}

/// `judgment_id` — a fresh uuid, per §4.4.
pub fn new_judgment_id() -> Uuid {
    Uuid::new_v4()
}

pub fn new_event_id() -> Uuid {
    Uuid::new_v4()
}

pub fn new_action_id() -> Uuid {
    Uuid::new_v4()
}

pub fn new_residual_id() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_id_is_deterministic() {
        let a = CellId::derive("def f(): pass", "", "CODE", "QUALITY");
        let b = CellId::derive("def f(): pass", "", "CODE", "QUALITY");
        assert_eq!(a, b);
    }

    #[test]
    fn cell_id_distinguishes_field_boundaries() {
        // Without a separator, ("ab", "c") and ("a", "bc") would collide.
        let a = CellId::derive("ab", "c", "CODE", "QUALITY");
        let b = CellId::derive("a", "bc", "CODE", "QUALITY");
        assert_ne!(a, b);
    }

    #[test]
    fn judgment_ids_are_not_reused() {
        assert_ne!(new_judgment_id(), new_judgment_id());
    }
}

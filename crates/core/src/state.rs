//! The unified organism state (C3, §4.3): a single-writer, many-reader
//! three-layer store. Grounded on the teacher's `PluginRegistry` (lock
//! shape: `RwLock<HashMap<...>>` per collection, `managers/registry.rs`)
//! and `SystemMetrics` (atomic counters for cheap observability fields).
//! Persistence is newly authored against §6's explicit one-JSON-file-per-key
//! contract — the teacher's `sqlx`/SQLite persistence has no equivalent
//! shape here (see DESIGN.md open question #1).
//!
//! All mutation methods take `&self` and acquire the single internal write
//! lock; there is exactly one lock guarding every collection below, so two
//! mutations can never interleave partially. Readers (`snapshot`, the
//! `get_*` methods) take the same lock for read and return owned copies —
//! "readers hold no lock" in the wall-clock sense once the call returns.

use cynic_shared::{
    Axiom, ConsciousnessLevel, CynicError, CynicResult, Dimension, Judgment, ProposedAction,
    Residual,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// The richer per-dog observable record from §3's `DogStatus` entity — not
/// to be confused with `cynic_shared::DogHealth`, the committee's per-cycle
/// health tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DogActivity {
    Idle,
    Judging,
    Learning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DogStatus {
    pub dog_id: String,
    pub activity: DogActivity,
    pub last_q_score: Option<f64>,
    pub last_verdict: Option<String>,
    pub last_confidence: Option<f64>,
    pub updated_at: f64,
}

impl DogStatus {
    pub fn idle(dog_id: impl Into<String>) -> Self {
        Self {
            dog_id: dog_id.into(),
            activity: DogActivity::Idle,
            last_q_score: None,
            last_verdict: None,
            last_confidence: None,
            updated_at: now_unix(),
        }
    }
}

/// §3's `AxiomStatus` entity: per-axiom activation counters, distinct from
/// `cynic_shared::AxiomStatus`, the tier marker embedded in one judgment's
/// `AxiomContribution`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxiomStatusRecord {
    pub axiom: Axiom,
    pub active: bool,
    pub signal_count: u64,
    pub maturity: f64,
}

impl AxiomStatusRecord {
    fn dormant(axiom: Axiom) -> Self {
        Self {
            axiom,
            active: false,
            signal_count: 0,
            maturity: 0.0,
        }
    }

    /// Maturity grows with `signal_count`; activation threshold is φ⁻¹ per
    /// §4.3's `AxiomStatus` description. Modeled as a saturating curve so a
    /// single outlier signal can't flip `active` on its own.
    fn record_signal(&mut self) {
        self.signal_count += 1;
        let n = self.signal_count as f64;
        self.maturity = n / (n + 10.0);
        if self.maturity >= cynic_shared::constants::PHI_INV {
            self.active = true;
        }
    }
}

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// `(state_signature, action_id)` — the Q-table key from §3.
pub type QKey = (String, String);

/// `(cell_signature, dog_id)` — the Thompson-sampling posterior key.
pub type PosteriorKey = (String, String);

struct MemoryLayer {
    qtable: HashMap<QKey, f64>,
    dogs: HashMap<String, DogStatus>,
    residuals: HashMap<String, Residual>,
    promoted_residuals: HashSet<String>,
    judgments: VecDeque<Judgment>,
    posteriors: HashMap<PosteriorKey, (f64, f64)>,
}

impl MemoryLayer {
    fn new() -> Self {
        Self {
            qtable: HashMap::new(),
            dogs: HashMap::new(),
            residuals: HashMap::new(),
            promoted_residuals: HashSet::new(),
            judgments: VecDeque::new(),
            posteriors: HashMap::new(),
        }
    }
}

struct PersistentLayer {
    consciousness_level: ConsciousnessLevel,
    pending_actions: VecDeque<ProposedAction>,
    axiom_statuses: BTreeMap<Axiom, AxiomStatusRecord>,
}

impl PersistentLayer {
    fn new() -> Self {
        let mut axiom_statuses = BTreeMap::new();
        for axiom in Axiom::ALL {
            axiom_statuses.insert(axiom, AxiomStatusRecord::dormant(axiom));
        }
        Self {
            consciousness_level: ConsciousnessLevel::Reflex,
            pending_actions: VecDeque::new(),
            axiom_statuses,
        }
    }
}

struct CheckpointLayer {
    version: u64,
    last_sync: f64,
}

struct StateInner {
    memory: MemoryLayer,
    persistent: PersistentLayer,
    checkpoint: CheckpointLayer,
}

/// The frozen record `snapshot()` returns (§4.3): cheap to compute, no
/// internal references, safe to hand to an arbitrary number of readers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateSnapshot {
    pub timestamp: f64,
    pub consciousness_level: String,
    pub judgment_count: usize,
    pub dog_count: usize,
    pub qtable_entries: usize,
    pub residuals_count: usize,
    pub pending_actions_count: usize,
    pub last_error: Option<ErrorRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorRecord {
    pub kind: String,
    pub where_: String,
    pub message: String,
    pub at: f64,
}

/// Capacity shared by the judgment ring and the pending-actions FIFO. Kept
/// as a constant here (rather than only in config) because eviction
/// behavior is a hard invariant of this module, not a tunable knob — see
/// §8's boundary test "exactly 89 + one add -> oldest evicted".
pub const RING_CAPACITY: usize = cynic_shared::constants::RING_CAPACITY;

/// An eviction notice, surfaced so the caller can emit the informational
/// event §4.3 requires ("never fail the caller").
pub struct Evicted<T> {
    pub item: T,
}

pub struct OrganismState {
    inner: RwLock<StateInner>,
    last_error: RwLock<Option<ErrorRecord>>,
    data_dir: PathBuf,
}

impl OrganismState {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: RwLock::new(StateInner {
                memory: MemoryLayer::new(),
                persistent: PersistentLayer::new(),
                checkpoint: CheckpointLayer {
                    version: 0,
                    last_sync: 0.0,
                },
            }),
            last_error: RwLock::new(None),
            data_dir: data_dir.into(),
        }
    }

    // ---- MEMORY layer -------------------------------------------------

    /// Inserts a judgment at the ring's head, evicting the oldest if the
    /// ring is already at `RING_CAPACITY`. Returns the evicted judgment, if
    /// any, so the caller can emit the informational eviction event.
    pub async fn add_judgment(&self, judgment: Judgment) -> Option<Evicted<Judgment>> {
        let mut inner = self.inner.write().await;
        inner.memory.judgments.push_front(judgment);
        if inner.memory.judgments.len() > RING_CAPACITY {
            inner
                .memory
                .judgments
                .pop_back()
                .map(|item| Evicted { item })
        } else {
            None
        }
    }

    pub async fn judgment_count(&self) -> usize {
        self.inner.read().await.memory.judgments.len()
    }

    pub async fn recent_judgments(&self, limit: usize) -> Vec<Judgment> {
        let inner = self.inner.read().await;
        inner.memory.judgments.iter().take(limit).cloned().collect()
    }

    pub async fn update_dog_status(&self, status: DogStatus) {
        let mut inner = self.inner.write().await;
        inner.memory.dogs.insert(status.dog_id.clone(), status);
    }

    pub async fn dog_status(&self, dog_id: &str) -> Option<DogStatus> {
        self.inner.read().await.memory.dogs.get(dog_id).cloned()
    }

    pub async fn dog_count(&self) -> usize {
        self.inner.read().await.memory.dogs.len()
    }

    pub async fn qtable_get(&self, key: &QKey) -> f64 {
        self.inner
            .read()
            .await
            .memory
            .qtable
            .get(key)
            .copied()
            .unwrap_or(0.0)
            .clamp(0.0, 100.0)
    }

    /// `q(s,a) <- value`, clamped into `[0, 100]` per §4.10's invariant.
    pub async fn qtable_set(&self, key: QKey, value: f64) {
        let mut inner = self.inner.write().await;
        inner.memory.qtable.insert(key, value.clamp(0.0, 100.0));
    }

    pub async fn qtable_entries(&self) -> usize {
        self.inner.read().await.memory.qtable.len()
    }

    /// All `(action_id, value)` pairs for one state signature — the
    /// argmax source for the Q-learning update's `max_a' q(s', a')` term.
    pub async fn qtable_actions_for_state(&self, state_signature: &str) -> Vec<(String, f64)> {
        let inner = self.inner.read().await;
        inner
            .memory
            .qtable
            .iter()
            .filter(|((s, _), _)| s == state_signature)
            .map(|((_, a), v)| (a.clone(), *v))
            .collect()
    }

    /// The Beta(α, β) posterior for one (cell-signature, dog) pair, seeded
    /// with an uninformative `(1.0, 1.0)` prior on first sight (§4.10's
    /// "informed priors" are supplied by the caller via `seed_posterior`
    /// for dogs with known starting reliability; anything unseeded falls
    /// back to the uniform prior here).
    pub async fn posterior(&self, cell_signature: &str, dog_id: &str) -> (f64, f64) {
        self.inner
            .read()
            .await
            .memory
            .posteriors
            .get(&(cell_signature.to_string(), dog_id.to_string()))
            .copied()
            .unwrap_or((1.0, 1.0))
    }

    pub async fn seed_posterior(&self, cell_signature: &str, dog_id: &str, alpha: f64, beta: f64) {
        let mut inner = self.inner.write().await;
        inner
            .memory
            .posteriors
            .insert((cell_signature.to_string(), dog_id.to_string()), (alpha, beta));
    }

    /// Updates the posterior by one binary outcome observation: `α += 1` on
    /// success, `β += 1` on failure.
    pub async fn update_posterior(&self, cell_signature: &str, dog_id: &str, success: bool) {
        let mut inner = self.inner.write().await;
        let entry = inner
            .memory
            .posteriors
            .entry((cell_signature.to_string(), dog_id.to_string()))
            .or_insert((1.0, 1.0));
        if success {
            entry.0 += 1.0;
        } else {
            entry.1 += 1.0;
        }
    }

    pub async fn residual(&self, signature: &str) -> Option<Residual> {
        self.inner
            .read()
            .await
            .memory
            .residuals
            .get(signature)
            .cloned()
    }

    pub async fn residuals_count(&self) -> usize {
        self.inner.read().await.memory.residuals.len()
    }

    /// Records one observation against the named residual signature,
    /// creating it on first sight. Returns the post-update record so the
    /// caller can check `is_promotable` without a second lock round-trip.
    pub async fn observe_residual(
        &self,
        signature: &str,
        variance: f64,
        promotion_vote: bool,
    ) -> Residual {
        let mut inner = self.inner.write().await;
        let residual = inner
            .memory
            .residuals
            .entry(signature.to_string())
            .or_insert_with(|| Residual::new(signature));
        residual.observe(variance, promotion_vote);
        residual.clone()
    }

    /// Records the not-promotable -> promotable transition for `signature`,
    /// exactly once. Returns `true` only the first time this signature
    /// crosses the promotion gate, so callers can fire AXIOM_ACTIVATED on
    /// the edge rather than on every subsequent cycle that still satisfies
    /// the (permanently-true-once-crossed) ratio (§8 scenario 4: "exactly
    /// one AXIOM_ACTIVATED event fired at the 50th observation").
    pub async fn mark_promoted_if_new(&self, signature: &str) -> bool {
        let mut inner = self.inner.write().await;
        inner.memory.promoted_residuals.insert(signature.to_string())
    }

    // ---- PERSISTENT layer ----------------------------------------------

    pub async fn consciousness_level(&self) -> ConsciousnessLevel {
        self.inner.read().await.persistent.consciousness_level
    }

    /// Validates against the closed schedulable set `{REFLEX, MICRO, MACRO,
    /// META}`; `AUTO` or any unknown token fails with `InvalidLevel` per
    /// §4.3.
    pub async fn set_consciousness_level(&self, level: ConsciousnessLevel) -> CynicResult<()> {
        if !level.is_schedulable() {
            return Err(CynicError::InvalidLevel {
                value: level.as_str().to_string(),
            });
        }
        let mut inner = self.inner.write().await;
        inner.persistent.consciousness_level = level;
        Ok(())
    }

    /// Pushes a proposed action onto the FIFO, evicting the oldest past
    /// `RING_CAPACITY`.
    pub async fn add_action(&self, action: ProposedAction) -> Option<Evicted<ProposedAction>> {
        let mut inner = self.inner.write().await;
        inner.persistent.pending_actions.push_back(action);
        if inner.persistent.pending_actions.len() > RING_CAPACITY {
            inner
                .persistent
                .pending_actions
                .pop_front()
                .map(|item| Evicted { item })
        } else {
            None
        }
    }

    /// Removes and returns the oldest pending action, if any.
    pub async fn remove_action(&self) -> Option<ProposedAction> {
        let mut inner = self.inner.write().await;
        inner.persistent.pending_actions.pop_front()
    }

    pub async fn pending_actions(&self) -> Vec<ProposedAction> {
        self.inner
            .read()
            .await
            .persistent
            .pending_actions
            .iter()
            .cloned()
            .collect()
    }

    pub async fn pending_actions_count(&self) -> usize {
        self.inner.read().await.persistent.pending_actions.len()
    }

    pub async fn axiom_status(&self, axiom: Axiom) -> AxiomStatusRecord {
        self.inner
            .read()
            .await
            .persistent
            .axiom_statuses
            .get(&axiom)
            .cloned()
            .unwrap_or_else(|| AxiomStatusRecord::dormant(axiom))
    }

    pub async fn record_axiom_signal(&self, axiom: Axiom) -> AxiomStatusRecord {
        let mut inner = self.inner.write().await;
        let entry = inner
            .persistent
            .axiom_statuses
            .entry(axiom)
            .or_insert_with(|| AxiomStatusRecord::dormant(axiom));
        entry.record_signal();
        entry.clone()
    }

    // ---- Observability ---------------------------------------------------

    pub async fn record_error(&self, kind: impl Into<String>, where_: impl Into<String>, message: impl Into<String>) {
        let mut last_error = self.last_error.write().await;
        *last_error = Some(ErrorRecord {
            kind: kind.into(),
            where_: where_.into(),
            message: message.into(),
            at: now_unix(),
        });
    }

    /// Idempotent and pure: two snapshots with no intervening mutation are
    /// equal (§8).
    pub async fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.read().await;
        let last_error = self.last_error.read().await.clone();
        StateSnapshot {
            timestamp: now_unix(),
            consciousness_level: inner.persistent.consciousness_level.as_str().to_string(),
            judgment_count: inner.memory.judgments.len(),
            dog_count: inner.memory.dogs.len(),
            qtable_entries: inner.memory.qtable.len(),
            residuals_count: inner.memory.residuals.len(),
            pending_actions_count: inner.persistent.pending_actions.len(),
            last_error,
        }
    }

    // ---- Persistence (§6) -------------------------------------------------

    /// Atomically writes the PERSISTENT layer's three JSON files under
    /// `data_dir`: write `name.tmp.<rand>`, `sync_all`, `rename`.
    pub async fn persist(&self) -> CynicResult<()> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| CynicError::StateWriteError {
                reason: format!("create_dir_all {}: {e}", self.data_dir.display()),
            })?;

        let (consciousness_doc, actions_doc, version) = {
            let mut inner = self.inner.write().await;
            inner.checkpoint.version += 1;
            inner.checkpoint.last_sync = now_unix();
            let consciousness_doc = ConsciousnessDoc {
                level: inner.persistent.consciousness_level.as_str().to_string(),
                timestamp: inner.checkpoint.last_sync,
            };
            let actions_doc: Vec<ActionDoc> = inner
                .persistent
                .pending_actions
                .iter()
                .map(ActionDoc::from)
                .collect();
            (consciousness_doc, actions_doc, inner.checkpoint.version)
        };

        write_json_atomic(&self.data_dir.join("consciousness.json"), &consciousness_doc).await?;
        write_json_atomic(&self.data_dir.join("actions.json"), &actions_doc).await?;
        let checkpoint_doc = CheckpointDoc {
            version,
            last_sync: now_unix(),
        };
        write_json_atomic(&self.data_dir.join("checkpoint.json"), &checkpoint_doc).await?;
        Ok(())
    }

    /// Reads checkpoint + persistent files back from `data_dir`. On
    /// corruption or a missing file, logs and falls back to defaults
    /// (REFLEX level, empty queues) per §4.3 — recovery never fails the
    /// caller, it degrades.
    pub async fn recover(&self) -> CynicResult<()> {
        let consciousness: Option<ConsciousnessDoc> =
            read_json(&self.data_dir.join("consciousness.json")).await;
        let actions: Option<Vec<ActionDoc>> = read_json(&self.data_dir.join("actions.json")).await;
        let checkpoint: Option<CheckpointDoc> =
            read_json(&self.data_dir.join("checkpoint.json")).await;

        let mut inner = self.inner.write().await;

        let now = now_unix();
        match checkpoint {
            Some(doc) if doc.last_sync <= now => {
                inner.checkpoint.version = doc.version;
                inner.checkpoint.last_sync = doc.last_sync;
            }
            Some(doc) => {
                tracing::warn!(
                    last_sync = doc.last_sync,
                    now,
                    "checkpoint timestamp is in the future; falling back to defaults"
                );
            }
            None => {
                tracing::info!("no checkpoint found; starting from defaults");
            }
        }

        match consciousness {
            Some(doc) => match ConsciousnessLevel::parse_schedulable(&doc.level) {
                Some(level) => inner.persistent.consciousness_level = level,
                None => {
                    tracing::warn!(level = %doc.level, "corrupt consciousness level in checkpoint; falling back to REFLEX");
                    inner.persistent.consciousness_level = ConsciousnessLevel::Reflex;
                }
            },
            None => inner.persistent.consciousness_level = ConsciousnessLevel::Reflex,
        }

        match actions {
            Some(docs) => {
                inner.persistent.pending_actions =
                    docs.into_iter().filter_map(|d| d.try_into_action().ok()).collect();
            }
            None => inner.persistent.pending_actions = VecDeque::new(),
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct ConsciousnessDoc {
    level: String,
    timestamp: f64,
}

#[derive(Serialize, Deserialize)]
struct CheckpointDoc {
    version: u64,
    last_sync: f64,
}

#[derive(Serialize, Deserialize)]
struct ActionDoc {
    action_id: uuid::Uuid,
    action_type: String,
    priority: u8,
    source_judgment_id: uuid::Uuid,
    payload: String,
}

impl From<&ProposedAction> for ActionDoc {
    fn from(a: &ProposedAction) -> Self {
        Self {
            action_id: a.action_id,
            action_type: a.action_type.as_str().to_string(),
            priority: a.priority,
            source_judgment_id: a.source_judgment_id,
            payload: a.payload.clone(),
        }
    }
}

impl ActionDoc {
    fn try_into_action(self) -> Result<ProposedAction, ()> {
        let action_type = match self.action_type.as_str() {
            "INVESTIGATE" => cynic_shared::ActionType::Investigate,
            "REFACTOR" => cynic_shared::ActionType::Refactor,
            "ALERT" => cynic_shared::ActionType::Alert,
            "MONITOR" => cynic_shared::ActionType::Monitor,
            _ => return Err(()),
        };
        let mut action =
            ProposedAction::new(self.source_judgment_id, action_type, self.priority, self.payload);
        action.action_id = self.action_id;
        Ok(action)
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> CynicResult<()> {
    let data = serde_json::to_vec_pretty(value).map_err(|e| CynicError::StateWriteError {
        reason: format!("serialize {}: {e}", path.display()),
    })?;
    let rand_suffix: u64 = {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::Relaxed) ^ (now_unix().to_bits())
    };
    let tmp_path = path.with_extension(format!("tmp.{rand_suffix}"));
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(|e| CynicError::StateWriteError {
            reason: format!("create {}: {e}", tmp_path.display()),
        })?;
    use tokio::io::AsyncWriteExt;
    file.write_all(&data)
        .await
        .map_err(|e| CynicError::StateWriteError {
            reason: format!("write {}: {e}", tmp_path.display()),
        })?;
    file.sync_all()
        .await
        .map_err(|e| CynicError::StateWriteError {
            reason: format!("fsync {}: {e}", tmp_path.display()),
        })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| CynicError::StateWriteError {
            reason: format!("rename {} -> {}: {e}", tmp_path.display(), path.display()),
        })?;
    Ok(())
}

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt state file; ignoring");
            None
        }
    }
}

/// Every dimension referenced by a dog vote must belong to the catalog —
/// trivially true here since `Dimension` is a closed enum, but kept as a
/// named check so callers constructing ad hoc maps have one place to assert
/// it (§3: "every dog referenced in `dog_votes` must exist in the registry
/// at evaluation time" generalizes to dimensions too).
pub fn assert_known_dimension(_dimension: Dimension) {}

#[cfg(test)]
mod tests {
    use super::*;
    use cynic_shared::{ActionType, CellId};
    use uuid::Uuid;

    fn sample_judgment() -> Judgment {
        Judgment::degraded_timeout(CellId::derive("x", "", "CODE", "QUALITY"), 5)
    }

    #[tokio::test]
    async fn judgment_ring_evicts_oldest_past_capacity() {
        let state = OrganismState::new(std::env::temp_dir().join("cynic-test-ring"));
        for _ in 0..RING_CAPACITY {
            assert!(state.add_judgment(sample_judgment()).await.is_none());
        }
        assert_eq!(state.judgment_count().await, RING_CAPACITY);
        let evicted = state.add_judgment(sample_judgment()).await;
        assert!(evicted.is_some());
        assert_eq!(state.judgment_count().await, RING_CAPACITY);
    }

    #[tokio::test]
    async fn action_fifo_evicts_oldest_and_preserves_order() {
        let state = OrganismState::new(std::env::temp_dir().join("cynic-test-fifo"));
        for i in 0..RING_CAPACITY {
            state
                .add_action(ProposedAction::new(
                    Uuid::new_v4(),
                    ActionType::Monitor,
                    1,
                    format!("action-{i}"),
                ))
                .await;
        }
        let evicted = state
            .add_action(ProposedAction::new(
                Uuid::new_v4(),
                ActionType::Monitor,
                1,
                "action-last",
            ))
            .await;
        assert!(evicted.is_some());
        assert_eq!(evicted.unwrap().item.payload, "action-0");
        let remaining = state.pending_actions().await;
        assert_eq!(remaining.len(), RING_CAPACITY);
        assert_eq!(remaining.first().unwrap().payload, "action-1");
        assert_eq!(remaining.last().unwrap().payload, "action-last");
    }

    #[tokio::test]
    async fn invalid_consciousness_level_is_rejected() {
        let state = OrganismState::new(std::env::temp_dir().join("cynic-test-level"));
        let err = state
            .set_consciousness_level(ConsciousnessLevel::Auto)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidLevel");
    }

    #[tokio::test]
    async fn snapshot_is_idempotent_without_intervening_mutation() {
        let state = OrganismState::new(std::env::temp_dir().join("cynic-test-snapshot"));
        let a = state.snapshot().await;
        let b = state.snapshot().await;
        assert_eq!(a.consciousness_level, b.consciousness_level);
        assert_eq!(a.judgment_count, b.judgment_count);
        assert_eq!(a.dog_count, b.dog_count);
    }

    #[tokio::test]
    async fn persist_then_recover_restores_level_and_actions() {
        let dir = std::env::temp_dir().join(format!("cynic-test-persist-{}", Uuid::new_v4()));
        let state = OrganismState::new(&dir);
        state
            .set_consciousness_level(ConsciousnessLevel::Macro)
            .await
            .unwrap();
        for i in 0..10 {
            state
                .add_action(ProposedAction::new(
                    Uuid::new_v4(),
                    ActionType::Investigate,
                    2,
                    format!("todo-{i}"),
                ))
                .await;
        }
        state.persist().await.unwrap();

        let recovered = OrganismState::new(&dir);
        recovered.recover().await.unwrap();
        assert_eq!(
            recovered.consciousness_level().await,
            ConsciousnessLevel::Macro
        );
        let actions = recovered.pending_actions().await;
        assert_eq!(actions.len(), 10);
        assert_eq!(actions[0].payload, "todo-0");
        assert_eq!(actions[9].payload, "todo-9");
        // MEMORY layer is lost: qtable/dog registry start empty.
        assert_eq!(recovered.qtable_entries().await, 0);
        assert_eq!(recovered.dog_count().await, 0);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn recover_without_checkpoint_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("cynic-test-recover-empty-{}", Uuid::new_v4()));
        let state = OrganismState::new(&dir);
        state.recover().await.unwrap();
        assert_eq!(state.consciousness_level().await, ConsciousnessLevel::Reflex);
        assert_eq!(state.pending_actions_count().await, 0);
    }

    #[tokio::test]
    async fn concurrent_add_judgment_keeps_ring_bounded() {
        let state = std::sync::Arc::new(OrganismState::new(
            std::env::temp_dir().join("cynic-test-concurrent"),
        ));
        let mut handles = Vec::new();
        for _ in 0..150 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                state.add_judgment(sample_judgment()).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(state.judgment_count().await, RING_CAPACITY);
    }
}

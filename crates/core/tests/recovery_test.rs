//! §8 scenario 5 ("recovery"): set MACRO, enqueue actions, persist, build a
//! fresh `Organism` over the same data directory, recover. The MEMORY layer
//! (q-table, dog registry) must come back empty; PERSISTENT must round-trip.

mod common;

use common::{test_config, unique_data_dir};
use cynic_core::Organism;
use cynic_shared::ConsciousnessLevel;

#[tokio::test]
async fn persist_and_recover_round_trips_persistent_layer_only() {
    let data_dir = unique_data_dir("recovery");

    let first = Organism::with_config(test_config(data_dir.clone())).await.unwrap();
    first.state.set_consciousness_level(ConsciousnessLevel::Macro).await.unwrap();
    for i in 0..10 {
        first
            .state
            .add_action(cynic_shared::ProposedAction::new(
                uuid::Uuid::new_v4(),
                cynic_shared::ActionType::Investigate,
                2,
                format!("action-{i}"),
            ))
            .await;
    }
    first.persist().await.unwrap();

    let second = Organism::with_config(test_config(data_dir.clone())).await.unwrap();
    let snapshot = second.snapshot().await;
    assert_eq!(snapshot.consciousness_level, "MACRO");
    assert_eq!(snapshot.pending_actions_count, 10);
    // MEMORY layer never persists: a freshly recovered organism has an
    // empty q-table even though its committee (constructed fresh each
    // bootstrap, not persisted) still has all eleven dogs.
    assert_eq!(snapshot.qtable_entries, 0);

    let actions = second.state.pending_actions().await;
    assert_eq!(actions[0].payload, "action-0");
    assert_eq!(actions[9].payload, "action-9");

    let _ = tokio::fs::remove_dir_all(&data_dir).await;
}

#[tokio::test]
async fn recover_on_a_fresh_directory_falls_back_to_reflex_defaults() {
    let data_dir = unique_data_dir("recovery-fresh");
    let organism = Organism::with_config(test_config(data_dir.clone())).await.unwrap();
    let snapshot = organism.snapshot().await;
    assert_eq!(snapshot.consciousness_level, "REFLEX");
    assert_eq!(snapshot.pending_actions_count, 0);
}

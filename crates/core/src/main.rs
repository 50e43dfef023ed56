//! `cynic_demo`: a minimal binary exercising one organism end to end —
//! bootstrap, feed a handful of sample cells across different realities and
//! levels, print the resulting judgments, then print a final snapshot.
//! Grounded on the teacher's `main.rs` (`.env` loading + `tracing_subscriber`
//! init), minus the axum server it used to hand off to.

use cynic_core::Organism;
use cynic_shared::{Cell, ConsciousnessLevel, Reality, TimeDim};

fn sample_cells() -> Vec<Cell> {
    vec![
        Cell::new(
            "fn divide(a: i32, b: i32) -> i32 { a / b }",
            "utility function, no bounds check on b",
            Reality::Code,
            "QUALITY",
            TimeDim::Present,
            2,
            0.50,
        )
        .expect("valid cell")
        .with_level(ConsciousnessLevel::Macro),
        Cell::new(
            "proposal: raise validator commission cap to 100%",
            "governance vote currently in progress",
            Reality::Solana,
            "SECURITY",
            TimeDim::Future,
            3,
            1.00,
        )
        .expect("valid cell")
        .with_level(ConsciousnessLevel::Macro),
        Cell::new(
            "quick sanity check on a one-line config diff",
            "CI pre-merge gate",
            Reality::Code,
            "QUALITY",
            TimeDim::Present,
            1,
            0.02,
        )
        .expect("valid cell")
        .with_level(ConsciousnessLevel::Reflex),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenvy::dotenv().is_err() {
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
    tracing_subscriber::fmt::init();

    tracing::info!("+---------------------------------------+");
    tracing::info!("|              CYNIC Organism             |");
    tracing::info!(
        "|             Version {:<10}      |",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("+---------------------------------------+");

    let organism = Organism::bootstrap().await?;
    tracing::info!(
        dogs = organism.committee().len(),
        "committee assembled"
    );

    for cell in sample_cells() {
        let cell_id = cell.cell_id;
        match organism.perceive(cell).await {
            Ok(judgment) => {
                tracing::info!(
                    cell_id = %cell_id.as_hex(),
                    verdict = ?judgment.verdict,
                    q_score = judgment.q_score,
                    confidence = judgment.confidence,
                    level = ?judgment.level_used,
                    "judgment committed"
                );
            }
            Err(e) => {
                tracing::warn!(cell_id = %cell_id.as_hex(), error = %e, "cycle failed");
            }
        }
    }

    organism.persist().await?;
    let snapshot = organism.snapshot().await;
    tracing::info!(
        judgments = snapshot.judgment_count,
        consciousness_level = %snapshot.consciousness_level,
        qtable_entries = snapshot.qtable_entries,
        "final snapshot"
    );

    Ok(())
}

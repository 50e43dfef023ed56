//! The cost/budget governor (C11, §4.11): per-cycle budget plus a global
//! daily ledger, both tracked as fixed-point USD-cents atomics — the same
//! posture as the teacher's `SystemMetrics` request/episode counters
//! (`managers/registry.rs`), chosen over floating-point accumulation so
//! millions of small debits across a day don't drift (DESIGN.md open
//! question #4, which also records why the teacher's `governor` token-bucket
//! crate doesn't fit: this is cost accounting, not rate limiting).

use chrono::{Datelike, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

fn usd_to_cents(usd: f64) -> u64 {
    (usd.max(0.0) * 100.0).round() as u64
}

fn cents_to_usd(cents: u64) -> f64 {
    cents as f64 / 100.0
}

/// One judgment cycle's remaining per-cell budget. Dog calls within a
/// cycle run concurrently, so this is an atomic counter, not a plain `f64`.
pub struct CycleLedger {
    remaining_cents: AtomicU64,
}

impl CycleLedger {
    pub fn new(budget_usd: f64) -> Self {
        Self {
            remaining_cents: AtomicU64::new(usd_to_cents(budget_usd)),
        }
    }

    pub fn remaining_usd(&self) -> f64 {
        cents_to_usd(self.remaining_cents.load(Ordering::Relaxed))
    }

    fn debit_cents(&self, cents: u64) {
        let _ = self
            .remaining_cents
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                Some(cur.saturating_sub(cents))
            });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetLevel {
    Normal,
    Low,
    Exhausted,
}

/// The global daily ledger. `daily_budget_usd` resets the spent counter
/// whenever access crosses a UTC day boundary — checked lazily on every
/// read/debit rather than via a background timer, per §4.11: a debit is
/// already happening on every call, so a dedicated timer is one more
/// moving part for no added correctness.
pub struct Governor {
    daily_budget_cents: u64,
    spent_today_cents: AtomicU64,
    day_ordinal: AtomicU64,
}

impl Governor {
    pub fn new(daily_budget_usd: f64) -> Self {
        Self {
            daily_budget_cents: usd_to_cents(daily_budget_usd),
            spent_today_cents: AtomicU64::new(0),
            day_ordinal: AtomicU64::new(Self::today_ordinal()),
        }
    }

    fn today_ordinal() -> u64 {
        Utc::now().date_naive().num_days_from_ce() as u64
    }

    /// Resets the daily spend counter exactly once per UTC day, the first
    /// time any call observes the boundary has passed.
    fn roll_day_if_needed(&self) {
        let today = Self::today_ordinal();
        let previous = self.day_ordinal.swap(today, Ordering::AcqRel);
        if previous != today {
            self.spent_today_cents.store(0, Ordering::Release);
        }
    }

    pub fn global_remaining_usd(&self) -> f64 {
        self.roll_day_if_needed();
        let spent = self.spent_today_cents.load(Ordering::Acquire);
        cents_to_usd(self.daily_budget_cents.saturating_sub(spent))
    }

    /// `remaining = min(cell_remaining, global_remaining)`, per §4.11.
    pub fn remaining_usd(&self, cycle: &CycleLedger) -> f64 {
        cycle.remaining_usd().min(self.global_remaining_usd())
    }

    /// True when the call should be skipped (budget pre-check before the
    /// dog runs): `remaining < adapter.expected_cost`.
    pub fn should_skip(&self, cycle: &CycleLedger, expected_cost_usd: f64) -> bool {
        self.remaining_usd(cycle) < expected_cost_usd
    }

    /// Debits the actual reported cost from both the cycle and the global
    /// ledger, on call completion.
    pub fn debit(&self, cycle: &CycleLedger, actual_cost_usd: f64) {
        self.roll_day_if_needed();
        let cents = usd_to_cents(actual_cost_usd);
        cycle.debit_cents(cents);
        let _ = self
            .spent_today_cents
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                Some((cur + cents).min(self.daily_budget_cents))
            });
    }

    /// `Exhausted` forces REFLEX for subsequent cycles (§4.11); `Low` is an
    /// observability signal only, not itself a forcing condition.
    pub fn level(&self) -> BudgetLevel {
        let remaining = self.global_remaining_usd();
        if remaining <= 0.0 {
            BudgetLevel::Exhausted
        } else if remaining < cents_to_usd(self.daily_budget_cents) * (1.0 - cynic_shared::constants::PHI_INV) {
            BudgetLevel::Low
        } else {
            BudgetLevel::Normal
        }
    }

    pub fn force_reflex(&self) -> bool {
        matches!(self.level(), BudgetLevel::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_ledger_tracks_remaining_after_debit() {
        let governor = Governor::new(10.0);
        let cycle = CycleLedger::new(0.05);
        assert_eq!(cycle.remaining_usd(), 0.05);
        governor.debit(&cycle, 0.02);
        assert!((cycle.remaining_usd() - 0.03).abs() < 1e-9);
    }

    #[test]
    fn should_skip_when_expected_cost_exceeds_remaining() {
        let governor = Governor::new(10.0);
        let cycle = CycleLedger::new(0.01);
        assert!(!governor.should_skip(&cycle, 0.005));
        assert!(governor.should_skip(&cycle, 0.02));
    }

    #[test]
    fn global_ledger_is_shared_across_cycles() {
        let governor = Governor::new(0.05);
        let a = CycleLedger::new(1.0);
        let b = CycleLedger::new(1.0);
        governor.debit(&a, 0.03);
        governor.debit(&b, 0.03);
        assert!(governor.global_remaining_usd() <= 0.0);
        assert_eq!(governor.level(), BudgetLevel::Exhausted);
        assert!(governor.force_reflex());
    }

    #[test]
    fn debit_never_underflows_cycle_ledger() {
        let governor = Governor::new(10.0);
        let cycle = CycleLedger::new(0.01);
        governor.debit(&cycle, 5.0);
        assert_eq!(cycle.remaining_usd(), 0.0);
    }

    #[test]
    fn normal_level_when_daily_budget_is_untouched() {
        let governor = Governor::new(5.0);
        assert_eq!(governor.level(), BudgetLevel::Normal);
        assert!(!governor.force_reflex());
    }
}

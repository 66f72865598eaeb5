//! In-process counters for the economy and the request guards.
//! One instance lives in the application state; `/api/health` reports a snapshot.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::anticheat::Rejection;

#[derive(Debug, Default)]
pub struct EconomyMetrics {
    auth_rejected: AtomicU64,
    auth_bypassed: AtomicU64,
    players_created: AtomicU64,
    runs_recorded: AtomicU64,
    runs_rejected_score: AtomicU64,
    runs_rejected_distance: AtomicU64,
    runs_rejected_multiplier: AtomicU64,
    purchases_committed: AtomicU64,
    purchases_refused: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub auth_rejected: u64,
    pub auth_bypassed: u64,
    pub players_created: u64,
    pub runs_recorded: u64,
    pub runs_rejected_score: u64,
    pub runs_rejected_distance: u64,
    pub runs_rejected_multiplier: u64,
    pub purchases_committed: u64,
    pub purchases_refused: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl EconomyMetrics {
    pub fn inc_auth_rejected(&self) {
        bump(&self.auth_rejected);
    }

    pub fn inc_auth_bypassed(&self) {
        bump(&self.auth_bypassed);
    }

    pub fn inc_players_created(&self) {
        bump(&self.players_created);
    }

    pub fn inc_runs_recorded(&self) {
        bump(&self.runs_recorded);
    }

    pub fn inc_run_rejected(&self, rejection: Rejection) {
        match rejection {
            Rejection::ScoreTooHighForDuration => bump(&self.runs_rejected_score),
            Rejection::DistanceTooLowForScore => bump(&self.runs_rejected_distance),
            Rejection::InvalidMultiplier => bump(&self.runs_rejected_multiplier),
        }
    }

    pub fn inc_purchases_committed(&self) {
        bump(&self.purchases_committed);
    }

    pub fn inc_purchases_refused(&self) {
        bump(&self.purchases_refused);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            auth_rejected: read(&self.auth_rejected),
            auth_bypassed: read(&self.auth_bypassed),
            players_created: read(&self.players_created),
            runs_recorded: read(&self.runs_recorded),
            runs_rejected_score: read(&self.runs_rejected_score),
            runs_rejected_distance: read(&self.runs_rejected_distance),
            runs_rejected_multiplier: read(&self.runs_rejected_multiplier),
            purchases_committed: read(&self.purchases_committed),
            purchases_refused: read(&self.purchases_refused),
        }
    }
}

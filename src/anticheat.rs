//! Plausibility checks for client-reported run results.
//!
//! The server never sees the run itself, only its summary, so these are loose bounds
//! meant to catch obviously forged submissions (edited requests, memory editors), not
//! to prove a result correct. Each rejection names the rule it broke so operators can
//! tell a client bug from a cheat attempt.

use thiserror::Error;

use crate::config::AntiCheatConfig;

/// The parts of a run summary the checker looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub score: u64,
    pub distance: u64,
    pub duration_seconds: u32,
    pub max_multiplier: u32,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("Score too high for duration")]
    ScoreTooHighForDuration,

    #[error("Distance too low for score")]
    DistanceTooLowForScore,

    #[error("Invalid multiplier")]
    InvalidMultiplier,
}

impl Rejection {
    /// Stable machine-readable code for the violated rule.
    pub fn code(self) -> &'static str {
        match self {
            Rejection::ScoreTooHighForDuration => "score_too_high_for_duration",
            Rejection::DistanceTooLowForScore => "distance_too_low_for_score",
            Rejection::InvalidMultiplier => "invalid_multiplier",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlausibilityChecker {
    limits: AntiCheatConfig,
}

impl PlausibilityChecker {
    pub fn new(limits: AntiCheatConfig) -> Self {
        Self { limits }
    }

    /// Highest score accepted for a run of `duration_seconds`.
    pub fn max_score_for(&self, duration_seconds: u32) -> u64 {
        let cap = u128::from(duration_seconds)
            * u128::from(self.limits.max_score_per_second)
            * u128::from(self.limits.score_tolerance_percent)
            / 100;
        u64::try_from(cap).unwrap_or(u64::MAX)
    }

    /// Accept the run or name the first rule it violates. Rules are checked in a fixed
    /// order: score rate, distance, multiplier.
    pub fn check(&self, run: &RunSummary) -> Result<(), Rejection> {
        let limits = &self.limits;

        // score * 100 > duration * rate * tolerance, in integers
        let score_scaled = u128::from(run.score) * 100;
        let allowed_scaled = u128::from(run.duration_seconds)
            * u128::from(limits.max_score_per_second)
            * u128::from(limits.score_tolerance_percent);
        if score_scaled > allowed_scaled {
            return Err(Rejection::ScoreTooHighForDuration);
        }

        // distance < score * min_distance_percent / 100
        let distance_scaled = u128::from(run.distance) * 100;
        let required_scaled = u128::from(run.score) * u128::from(limits.min_distance_percent);
        if distance_scaled < required_scaled {
            return Err(Rejection::DistanceTooLowForScore);
        }

        if run.max_multiplier > limits.max_multiplier {
            return Err(Rejection::InvalidMultiplier);
        }

        Ok(())
    }
}

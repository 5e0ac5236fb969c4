//! Debounced per-region health state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Up/down status of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    /// The region is serviceable.
    Up,
    /// The region failed enough consecutive probes to be declared down.
    Down,
}

impl HealthStatus {
    /// True if the region is up.
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
        }
    }
}

/// Debounced health state for one region.
///
/// The asymmetry is deliberate: declaring a region down requires
/// `failure_threshold` consecutive failures, declaring it back up requires
/// one success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthState {
    /// Current status.
    pub status: HealthStatus,
    /// Consecutive failed probes since the last success.
    pub consecutive_failures: u32,
    /// When the status last changed.
    pub last_transition: DateTime<Utc>,
}

impl HealthState {
    /// A fresh state: up, no observed failures.
    pub fn new() -> Self {
        Self { status: HealthStatus::Up, consecutive_failures: 0, last_transition: Utc::now() }
    }

    /// Folds in a failed probe. Returns `true` if this probe transitioned
    /// the region to down.
    pub fn record_failure(&mut self, failure_threshold: u32) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.status == HealthStatus::Up && self.consecutive_failures >= failure_threshold {
            self.status = HealthStatus::Down;
            self.last_transition = Utc::now();
            return true;
        }
        false
    }

    /// Folds in a successful probe. Returns `true` if this probe
    /// transitioned the region back to up.
    pub fn record_success(&mut self) -> bool {
        self.consecutive_failures = 0;

        if self.status == HealthStatus::Down {
            self.status = HealthStatus::Up;
            self.last_transition = Utc::now();
            return true;
        }
        false
    }

    /// True if the region is up.
    pub fn is_up(&self) -> bool {
        self.status.is_up()
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_up() {
        let state = HealthState::new();
        assert!(state.is_up());
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_down_after_exactly_threshold_failures() {
        let mut state = HealthState::new();

        // threshold 2: first failure leaves the region up
        assert!(!state.record_failure(2));
        assert!(state.is_up());
        assert_eq!(state.consecutive_failures, 1);

        // second consecutive failure transitions
        assert!(state.record_failure(2));
        assert!(!state.is_up());
        assert_eq!(state.consecutive_failures, 2);
    }

    #[test]
    fn test_success_resets_streak_before_threshold() {
        let mut state = HealthState::new();
        state.record_failure(3);
        state.record_failure(3);
        assert!(state.is_up());

        // Success wipes the streak; the next failure starts from scratch
        assert!(!state.record_success());
        assert_eq!(state.consecutive_failures, 0);
        assert!(!state.record_failure(3));
        assert!(state.is_up());
    }

    #[test]
    fn test_single_success_recovers() {
        let mut state = HealthState::new();
        state.record_failure(1);
        assert!(!state.is_up());

        assert!(state.record_success());
        assert!(state.is_up());
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_repeated_failures_while_down_do_not_retransition() {
        let mut state = HealthState::new();
        assert!(state.record_failure(1));

        // Already down: further failures are not new transitions
        assert!(!state.record_failure(1));
        assert!(!state.record_failure(1));
        assert_eq!(state.consecutive_failures, 3);
    }

    #[test]
    fn test_transition_time_updates() {
        let mut state = HealthState::new();
        let created = state.last_transition;
        state.record_failure(1);
        assert!(state.last_transition >= created);
    }
}

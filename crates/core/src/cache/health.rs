//! Remote tier liveness with transition-only logging.
//!
//! The state lives in a single atomic byte. Every observation tries to move it
//! with compare-and-swap, and only the caller whose swap succeeds reports the
//! change, so a burst of concurrent failures yields one warning.

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::{info, warn};

/// Observed remote tier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HealthState {
    /// No remote operation observed yet.
    Unknown = 0,
    Alive = 1,
    Dead = 2,
    /// No remote tier configured. Permanent.
    Disabled = 3,
}

impl HealthState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Alive,
            2 => Self::Dead,
            3 => Self::Disabled,
            _ => Self::Unknown,
        }
    }
}

/// A state change won by the reporting caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthState,
    pub to: HealthState,
}

#[derive(Debug)]
pub struct RemoteHealth {
    state: AtomicU8,
    tier: &'static str,
}

impl RemoteHealth {
    pub fn new(tier: &'static str) -> Self {
        Self { state: AtomicU8::new(HealthState::Unknown as u8), tier }
    }

    pub fn disabled() -> Self {
        Self { state: AtomicU8::new(HealthState::Disabled as u8), tier: "none" }
    }

    pub fn state(&self) -> HealthState {
        HealthState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_alive(&self) -> bool {
        self.state() == HealthState::Alive
    }

    /// Record a successful remote operation.
    pub fn observe_success(&self) -> Option<Transition> {
        let transition = self.transition_to(HealthState::Alive)?;
        info!(tier = self.tier, from = ?transition.from, "remote cache available");
        Some(transition)
    }

    /// Record a failed remote operation.
    pub fn observe_failure(&self) -> Option<Transition> {
        let transition = self.transition_to(HealthState::Dead)?;
        warn!(tier = self.tier, from = ?transition.from, "remote cache unavailable, serving from local tier only");
        Some(transition)
    }

    fn transition_to(&self, target: HealthState) -> Option<Transition> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let from = HealthState::from_u8(current);
            if from == target || from == HealthState::Disabled {
                return None;
            }
            match self
                .state
                .compare_exchange_weak(current, target as u8, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Some(Transition { from, to: target }),
                Err(actual) => current = actual,
            }
        }
    }
}

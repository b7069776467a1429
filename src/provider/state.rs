// src/provider/state.rs
//! Availability state of a location provider

use serde::{Deserialize, Serialize};
use std::fmt;

/// Availability of the acquisition source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProviderState {
    Available,
    /// Expected to recover, e.g. signal obstructed inside a building
    #[default]
    TemporarilyUnavailable,
    /// Not expected to recover soon, e.g. an external receiver was detached
    OutOfService,
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderState::Available => "AVAILABLE",
            ProviderState::TemporarilyUnavailable => "TEMPORARILY_UNAVAILABLE",
            ProviderState::OutOfService => "OUT_OF_SERVICE",
        };
        f.write_str(name)
    }
}

/// Tracks the current state and decides which transitions a listener sees.
///
/// AVAILABLE is never taken from a state code. It is inferred from the first
/// valid fix after any other state, so every AVAILABLE notification is
/// followed by a location.
#[derive(Debug, Default)]
pub(crate) struct StateMachine {
    current: ProviderState,
}

impl StateMachine {
    pub(crate) fn current(&self) -> ProviderState {
        self.current
    }

    /// Apply a state code from the source. Returns the state to forward, or
    /// `None` when the code is suppressed.
    pub(crate) fn on_state_code(&mut self, reported: ProviderState) -> Option<ProviderState> {
        if reported == ProviderState::Available {
            return None;
        }
        self.current = reported;
        Some(reported)
    }

    /// Apply a fix. Returns `Some(Available)` when the fix brings the
    /// provider back to AVAILABLE.
    pub(crate) fn on_fix(&mut self, valid: bool) -> Option<ProviderState> {
        if valid && self.current != ProviderState::Available {
            self.current = ProviderState::Available;
            return Some(ProviderState::Available);
        }
        None
    }
}

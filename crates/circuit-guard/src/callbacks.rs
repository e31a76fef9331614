//! Callback system for circuit breaker state transitions
//!
//! Callbacks run after the breaker has released its lock, so they may call
//! back into the same breaker.

use crate::machine::State;
use std::sync::Arc;

type StateHook = Arc<dyn Fn(&str) + Send + Sync>;
type ChangeHook = Arc<dyn Fn(&str, State, State) + Send + Sync>;

/// Callbacks for circuit breaker events
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<StateHook>,
    pub on_close: Option<StateHook>,
    pub on_half_open: Option<StateHook>,
    /// Fired for every change with `(circuit, from, to)`
    pub on_state_change: Option<ChangeHook>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch a `from -> to` change to the matching hooks
    pub fn trigger(&self, circuit: &str, from: State, to: State) {
        if let Some(ref callback) = self.on_state_change {
            callback(circuit, from, to);
        }

        let hook = match to {
            State::Open => &self.on_open,
            State::Closed => &self.on_close,
            State::HalfOpen => &self.on_half_open,
        };
        if let Some(callback) = hook {
            callback(circuit);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}

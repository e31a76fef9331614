//! Circuit state machine
//!
//! Two layers live here:
//! - the transition table, a pure function of `(State, Input)` that applies the
//!   per-transition action to the generation's [`Stats`]
//! - the lifecycle machine built with `state_machines`, which owns the current
//!   state and refuses edges that are not part of the breaker lifecycle
//!
//! Neither layer reads the clock or locks anything. The breaker calls into both
//! while holding its own lock.

use crate::{circuit::Config, stats::Stats};
use std::fmt;
use std::time::Instant;

/// Observable state of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Calls flow through and outcomes are counted
    Closed,
    /// Calls are rejected until the open timeout elapses
    Open,
    /// A limited number of probe calls are admitted
    HalfOpen,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "Closed",
            State::Open => "Open",
            State::HalfOpen => "HalfOpen",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a guarded call, fed back into the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Ok,
    NotOk,
}

impl Input {
    pub fn as_str(&self) -> &'static str {
        match self {
            Input::Ok => "ok",
            Input::NotOk => "not_ok",
        }
    }
}

/// Result of running one input through the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Same state, same generation
    Stay,
    /// Move to the given state; the caller starts a new generation
    Enter(State),
}

/// Result of the lazy clock check performed at the top of every operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Refresh {
    Unchanged,
    /// Closed interval elapsed: same state, fresh counters
    Rollover,
    /// Open timeout elapsed: move to HalfOpen with fresh counters
    Probe,
}

/// A `(state, event)` pair that has no edge in the breaker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Rejected {
    pub state: State,
    pub event: &'static str,
}

/// Apply `input` to `stats` according to the transition table for `state`.
///
/// Trip and close transitions are conditional: the action records the outcome
/// first, then the predicate decides on the freshly updated counters.
pub(crate) fn step(
    state: State,
    input: Input,
    stats: &mut Stats,
    config: &Config,
) -> Result<Step, Rejected> {
    match (state, input) {
        (State::Closed, Input::Ok) => {
            stats.success();
            Ok(Step::Stay)
        }
        (State::Closed, Input::NotOk) => {
            stats.failure();
            if (config.ready_to_trip)(stats) {
                Ok(Step::Enter(State::Open))
            } else {
                Ok(Step::Stay)
            }
        }
        // Admission rejects Open calls before they run, so nothing reaches here
        // in practice.
        (State::Open, Input::NotOk) => Ok(Step::Stay),
        (State::HalfOpen, Input::Ok) => {
            stats.success();
            if stats.consecutive_successes >= config.max_requests {
                Ok(Step::Enter(State::Closed))
            } else {
                Ok(Step::Stay)
            }
        }
        (State::HalfOpen, Input::NotOk) => Ok(Step::Enter(State::Open)),
        (State::Open, Input::Ok) => Err(Rejected {
            state,
            event: input.as_str(),
        }),
    }
}

/// Decide whether the clock has moved the breaker into a new generation.
pub(crate) fn refresh(state: State, expiry: Option<Instant>, now: Instant) -> Refresh {
    match (state, expiry) {
        (State::Closed, Some(expiry)) if now >= expiry => Refresh::Rollover,
        (State::Open, Some(expiry)) if now >= expiry => Refresh::Probe,
        _ => Refresh::Unchanged,
    }
}

/// Shared data for the lifecycle machine
#[derive(Debug, Clone, Default)]
pub(crate) struct CircuitContext {
    pub(crate) name: String,
}

// Generated types (`Circuit<S>`, per-state markers) stay in their own namespace
mod lifecycle {
    use super::CircuitContext;
    use state_machines::state_machine;

    state_machine! {
        name: Circuit,
        context: CircuitContext,
        dynamic: true,

        initial: Closed,
        states: [
            Closed,
            Open,
            HalfOpen,
        ],
        events {
            trip {
                transition: { from: [Closed, HalfOpen], to: Open }
            }
            attempt_reset {
                transition: { from: Open, to: HalfOpen }
            }
            close {
                transition: { from: HalfOpen, to: Closed }
            }
        }
    }
}

use lifecycle::{CircuitEvent, DynamicCircuit};

/// Current lifecycle state of one breaker
pub(crate) struct Lifecycle {
    machine: DynamicCircuit,
    context: CircuitContext,
}

impl Lifecycle {
    pub(crate) fn new(name: &str) -> Self {
        let context = CircuitContext {
            name: name.to_string(),
        };
        Self {
            machine: DynamicCircuit::new(context.clone()),
            context,
        }
    }

    pub(crate) fn state(&self) -> State {
        match self.machine.current_state() {
            "Closed" => State::Closed,
            "Open" => State::Open,
            "HalfOpen" => State::HalfOpen,
            other => {
                tracing::error!(
                    circuit = %self.context.name,
                    state = other,
                    "unknown lifecycle state, treating as Closed"
                );
                State::Closed
            }
        }
    }

    /// Move to `to` through the matching lifecycle event
    pub(crate) fn enter(&mut self, to: State) -> Result<(), Rejected> {
        let from = self.state();
        let (event, name) = match to {
            State::Open => (CircuitEvent::Trip, "trip"),
            State::HalfOpen => (CircuitEvent::AttemptReset, "attempt_reset"),
            State::Closed => (CircuitEvent::Close, "close"),
        };

        self.machine.handle(event).map_err(|_| Rejected {
            state: from,
            event: name,
        })
    }

    /// Start over in Closed
    pub(crate) fn reset(&mut self) {
        self.machine = DynamicCircuit::new(self.context.clone());
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("circuit", &self.context.name)
            .field("state", &self.state())
            .finish()
    }
}

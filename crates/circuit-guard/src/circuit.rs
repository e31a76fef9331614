//! Circuit breaker implementation
//!
//! All bookkeeping (state, stats, generation, expiry) sits behind a single
//! mutex. The guarded operation always runs with that mutex released.

use crate::{
    callbacks::Callbacks,
    clock::{Clock, SystemClock},
    errors::CircuitError,
    machine::{self, Input, Lifecycle, Refresh, Rejected, State, Step},
    stats::Stats,
};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Open duration used when `timeout` is left at zero
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Predicate deciding whether a Closed circuit should trip
pub type TripFn = Arc<dyn Fn(&Stats) -> bool + Send + Sync>;

/// Circuit breaker configuration
#[derive(Clone)]
pub struct Config {
    /// Calls admitted while HalfOpen, and successes needed to close again.
    /// Zero is treated as one.
    pub max_requests: u32,

    /// Period after which Closed counters are cleared. Zero disables it.
    ///
    /// An outcome is only counted in the generation that admitted it. A call
    /// that is still running when the interval rolls over is dropped from the
    /// counters, so an upstream slower than `interval` never trips the circuit.
    pub interval: Duration,

    /// How long the circuit stays Open before probing. Zero means 60 seconds.
    pub timeout: Duration,

    /// Evaluated after every failure while Closed
    pub ready_to_trip: TripFn,

    /// Jitter factor for `timeout` (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub jitter_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_requests: 1,
            interval: Duration::ZERO,
            timeout: DEFAULT_TIMEOUT,
            ready_to_trip: Arc::new(default_ready_to_trip),
            jitter_factor: 0.0,
        }
    }
}

impl Config {
    /// Replace zero values with their documented defaults
    pub fn normalized(mut self) -> Self {
        if self.max_requests == 0 {
            self.max_requests = 1;
        }
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        self.jitter_factor = self.jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Open duration, with jitter applied when configured
    fn open_timeout(&self) -> Duration {
        if self.jitter_factor > 0.0 {
            let timeout_ms = self.timeout.as_millis() as u64;
            let policy = chrono_machines::Policy {
                max_attempts: 1,
                base_delay_ms: timeout_ms,
                multiplier: 1.0,
                max_delay_ms: timeout_ms,
            };
            Duration::from_millis(policy.calculate_delay(1, self.jitter_factor))
        } else {
            self.timeout
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("max_requests", &self.max_requests)
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("ready_to_trip", &"<closure>")
            .field("jitter_factor", &self.jitter_factor)
            .finish()
    }
}

/// Trips once more than five failures happen in a row
pub fn default_ready_to_trip(stats: &Stats) -> bool {
    stats.consecutive_failures > 5
}

/// Everything guarded by the breaker lock
#[derive(Debug)]
struct Inner {
    lifecycle: Lifecycle,
    generation: u64,
    stats: Stats,
    expiry: Option<Instant>,
}

impl Inner {
    /// Clear counters and set the expiry rule of the current state
    fn new_generation(&mut self, config: &Config, now: Instant) {
        self.generation += 1;
        self.stats.clear();
        self.expiry = match self.lifecycle.state() {
            State::Closed if config.interval.is_zero() => None,
            State::Closed => Some(now + config.interval),
            State::Open => Some(now + config.open_timeout()),
            State::HalfOpen => None,
        };
    }
}

/// State change to announce once the lock is released
type Change = Option<(State, State)>;

/// Circuit breaker public API
pub struct CircuitBreaker {
    name: String,
    config: Config,
    clock: Arc<dyn Clock>,
    callbacks: Callbacks,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker (use builder() for more options)
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        Self::with_parts(name.into(), config, Arc::new(SystemClock), Callbacks::new())
    }

    /// Assemble a breaker from its parts (used by builder)
    pub(crate) fn with_parts(
        name: String,
        config: Config,
        clock: Arc<dyn Clock>,
        callbacks: Callbacks,
    ) -> Self {
        let config = config.normalized();
        let mut inner = Inner {
            lifecycle: Lifecycle::new(&name),
            generation: 0,
            stats: Stats::default(),
            expiry: None,
        };
        inner.new_generation(&config, clock.now());

        Self {
            name,
            config,
            clock,
            callbacks,
            inner: Mutex::new(inner),
        }
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }

    /// Configured label of this breaker
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective (normalized) configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute a fallible operation with circuit breaker protection
    ///
    /// The operation runs at most once and only if the breaker admits it. Its
    /// value is returned as-is; its error comes back wrapped in
    /// [`CircuitError::Execution`].
    pub fn call<T, E, F>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let permit = self.admit()?;
        let result = f();
        self.settle(permit, result)
    }

    /// Async flavour of [`call`](Self::call)
    ///
    /// No lock is held across the `.await`. Dropping the returned future after
    /// admission counts the call as a failure.
    pub async fn call_async<T, E, F, Fut>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.admit()?;
        let result = f().await;
        self.settle(permit, result)
    }

    /// Current state after applying any elapsed timeout or interval
    pub fn state(&self) -> State {
        let now = self.clock.now();
        let (state, change) = {
            let mut inner = self.inner.lock();
            let change = self.refresh(&mut inner, now);
            (inner.lifecycle.state(), change)
        };
        self.announce(change);
        state
    }

    /// Get current state name
    pub fn state_name(&self) -> &'static str {
        self.state().as_str()
    }

    /// Check if circuit is open
    pub fn is_open(&self) -> bool {
        self.state() == State::Open
    }

    /// Check if circuit is closed
    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    /// Check if circuit is probing
    pub fn is_half_open(&self) -> bool {
        self.state() == State::HalfOpen
    }

    /// Snapshot of the current generation's counters
    pub fn stats(&self) -> Stats {
        let now = self.clock.now();
        let (stats, change) = {
            let mut inner = self.inner.lock();
            let change = self.refresh(&mut inner, now);
            (inner.stats, change)
        };
        self.announce(change);
        stats
    }

    /// Counter of generations started so far
    pub fn generation(&self) -> u64 {
        let now = self.clock.now();
        let (generation, change) = {
            let mut inner = self.inner.lock();
            let change = self.refresh(&mut inner, now);
            (inner.generation, change)
        };
        self.announce(change);
        generation
    }

    /// Force the circuit back to Closed with fresh counters
    pub fn reset(&self) {
        let now = self.clock.now();
        let change = {
            let mut inner = self.inner.lock();
            let from = inner.lifecycle.state();
            inner.lifecycle.reset();
            inner.new_generation(&self.config, now);
            (from != State::Closed).then_some((from, State::Closed))
        };
        tracing::info!(circuit = %self.name, "circuit reset");
        self.announce(change);
    }

    /// Admission check. On success the returned permit must be settled.
    fn admit<E>(&self) -> Result<Permit<'_>, CircuitError<E>> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let change = self.refresh(&mut inner, now);

        let verdict = match inner.lifecycle.state() {
            State::Open => Err(CircuitError::Open {
                circuit: self.name.clone(),
            }),
            State::HalfOpen if inner.stats.requests >= self.config.max_requests => {
                Err(CircuitError::TooManyRequests {
                    circuit: self.name.clone(),
                    max_requests: self.config.max_requests,
                })
            }
            _ => {
                inner.stats.request();
                Ok(Permit {
                    breaker: self,
                    generation: inner.generation,
                    settled: false,
                })
            }
        };
        drop(inner);

        self.announce(change);
        match verdict {
            Err(CircuitError::Open { .. }) => {
                tracing::debug!(circuit = %self.name, "call rejected, circuit open");
            }
            Err(CircuitError::TooManyRequests { max_requests, .. }) => {
                tracing::debug!(
                    circuit = %self.name,
                    max_requests,
                    "call rejected, half-open limit reached"
                );
            }
            _ => {}
        }
        verdict
    }

    /// Feed the operation's outcome back and hand its result to the caller
    fn settle<T, E>(
        &self,
        mut permit: Permit<'_>,
        result: Result<T, E>,
    ) -> Result<T, CircuitError<E>> {
        permit.settled = true;
        let input = if result.is_ok() { Input::Ok } else { Input::NotOk };

        self.record(permit.generation, input)
            .map_err(|rejected| CircuitError::InvalidTransition {
                circuit: self.name.clone(),
                state: rejected.state,
                event: rejected.event,
            })?;

        result.map_err(CircuitError::Execution)
    }

    /// Apply an outcome admitted in `generation`
    fn record(&self, generation: u64, input: Input) -> Result<(), Rejected> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let mut change = self.refresh(&mut inner, now);

        let outcome = if inner.generation != generation {
            tracing::debug!(
                circuit = %self.name,
                admitted = generation,
                current = inner.generation,
                "discarding outcome from a previous generation"
            );
            Ok(())
        } else {
            self.apply(&mut inner, input, now).map(|applied| {
                if applied.is_some() {
                    change = applied;
                }
            })
        };
        drop(inner);

        if let Err(rejected) = outcome {
            tracing::error!(
                circuit = %self.name,
                state = %rejected.state,
                event = rejected.event,
                "invalid transition"
            );
        }
        self.announce(change);
        outcome
    }

    /// Run the transition table for `input` and follow through on its verdict
    fn apply(&self, inner: &mut Inner, input: Input, now: Instant) -> Result<Change, Rejected> {
        let from = inner.lifecycle.state();
        match machine::step(from, input, &mut inner.stats, &self.config)? {
            Step::Stay => Ok(None),
            Step::Enter(to) => {
                inner.lifecycle.enter(to)?;
                inner.new_generation(&self.config, now);
                Ok(Some((from, to)))
            }
        }
    }

    /// Lazy clock-driven advance; must run first under the lock
    fn refresh(&self, inner: &mut Inner, now: Instant) -> Change {
        match machine::refresh(inner.lifecycle.state(), inner.expiry, now) {
            Refresh::Unchanged => None,
            Refresh::Rollover => {
                inner.new_generation(&self.config, now);
                None
            }
            Refresh::Probe => match inner.lifecycle.enter(State::HalfOpen) {
                Ok(()) => {
                    inner.new_generation(&self.config, now);
                    Some((State::Open, State::HalfOpen))
                }
                Err(rejected) => {
                    tracing::error!(
                        circuit = %self.name,
                        state = %rejected.state,
                        event = rejected.event,
                        "invalid transition"
                    );
                    None
                }
            },
        }
    }

    /// Log and run callbacks for a state change; lock must not be held
    fn announce(&self, change: Change) {
        let Some((from, to)) = change else {
            return;
        };

        match to {
            State::Open => {
                tracing::warn!(circuit = %self.name, from = %from, to = %to, "circuit opened");
            }
            State::HalfOpen => {
                tracing::info!(circuit = %self.name, from = %from, to = %to, "circuit half-open, probing");
            }
            State::Closed => {
                tracing::info!(circuit = %self.name, from = %from, to = %to, "circuit closed");
            }
        }
        self.callbacks.trigger(&self.name, from, to);
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("callbacks", &self.callbacks)
            .field("inner", &*self.inner.lock())
            .finish()
    }
}

/// An admitted call awaiting its outcome
///
/// If it is dropped unsettled (the operation panicked, or an async call was
/// cancelled) the call counts as a failure so HalfOpen probe slots are not
/// leaked.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(circuit = %self.breaker.name, "call abandoned before completion");
            let _ = self.breaker.record(self.generation, Input::NotOk);
        }
    }
}

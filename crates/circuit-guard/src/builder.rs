//! Builder API for ergonomic circuit breaker configuration

use crate::{
    callbacks::Callbacks,
    circuit::{CircuitBreaker, Config},
    clock::{Clock, SystemClock},
    machine::State,
    stats::Stats,
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
pub struct CircuitBuilder {
    name: String,
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    callbacks: Callbacks,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            clock: None,
            callbacks: Callbacks::new(),
        }
    }

    /// Calls admitted while half-open; also the success count that closes it
    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.config.max_requests = max_requests;
        self
    }

    /// Clear closed-state counters every `interval` (zero disables)
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// How long the circuit stays open before probing
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Predicate over the current counters deciding when a closed circuit trips
    ///
    /// # Examples
    ///
    /// ```rust
    /// use circuit_guard::CircuitBreaker;
    ///
    /// let circuit = CircuitBreaker::builder("http_get")
    ///     .ready_to_trip(|stats| stats.requests >= 3 && stats.failure_ratio() >= 0.6)
    ///     .build();
    ///
    /// assert!(circuit.is_closed());
    /// ```
    pub fn ready_to_trip<F>(mut self, f: F) -> Self
    where
        F: Fn(&Stats) -> bool + Send + Sync + 'static,
    {
        self.config.ready_to_trip = Arc::new(f);
        self
    }

    /// Trip after `failures` consecutive failures
    pub fn consecutive_failures(self, failures: u32) -> Self {
        self.ready_to_trip(move |stats| stats.consecutive_failures >= failures)
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor;
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use a custom time source
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Set callback for every state change, receiving `(circuit, from, to)`
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, State, State) + Send + Sync + 'static,
    {
        self.callbacks.on_state_change = Some(Arc::new(f));
        self
    }

    /// Build the circuit breaker
    pub fn build(self) -> CircuitBreaker {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        CircuitBreaker::with_parts(self.name, self.config, clock, self.callbacks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_builder_defaults() {
        let circuit = CircuitBuilder::new("test").build();

        assert_eq!(circuit.state_name(), "Closed");
        assert!(circuit.is_closed());
        assert_eq!(circuit.config().max_requests, 1);
        assert_eq!(circuit.config().interval, Duration::ZERO);
        assert_eq!(circuit.config().timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_builder_normalizes_zero_values() {
        let circuit = CircuitBuilder::new("test")
            .max_requests(0)
            .timeout(Duration::ZERO)
            .jitter_factor(3.0)
            .build();

        assert_eq!(circuit.config().max_requests, 1);
        assert_eq!(circuit.config().timeout, Duration::from_secs(60));
        assert_eq!(circuit.config().jitter_factor, 1.0);
    }

    #[test]
    fn test_builder_custom_config() {
        let circuit = CircuitBuilder::new("test")
            .max_requests(3)
            .interval(Duration::from_secs(120))
            .timeout(Duration::from_secs(30))
            .build();

        assert!(circuit.is_closed());
        assert_eq!(circuit.name(), "test");
        assert_eq!(circuit.config().max_requests, 3);
        assert_eq!(circuit.config().interval, Duration::from_secs(120));
    }

    #[test]
    fn test_builder_with_callbacks() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let opened = Arc::new(AtomicBool::new(false));
        let opened_clone = opened.clone();
        let half_opened = Arc::new(AtomicBool::new(false));
        let half_opened_clone = half_opened.clone();
        let clock = Arc::new(ManualClock::new());

        let circuit = CircuitBuilder::new("test")
            .consecutive_failures(2)
            .timeout(Duration::from_secs(1))
            .clock(clock.clone())
            .on_open(move |_name| {
                opened_clone.store(true, Ordering::SeqCst);
            })
            .on_half_open(move |_name| {
                half_opened_clone.store(true, Ordering::SeqCst);
            })
            .build();

        // Trigger failures to open circuit
        let _ = circuit.call(|| Err::<(), _>("error 1"));
        let _ = circuit.call(|| Err::<(), _>("error 2"));

        assert!(opened.load(Ordering::SeqCst));
        assert!(!half_opened.load(Ordering::SeqCst));

        clock.advance(Duration::from_secs(1));
        assert!(circuit.is_half_open());
        assert!(half_opened.load(Ordering::SeqCst));
    }

    #[test]
    fn test_builder_custom_predicate() {
        let circuit = CircuitBuilder::new("test")
            .ready_to_trip(|stats| stats.total_failures >= 2)
            .build();

        let _ = circuit.call(|| Err::<(), _>("error 1"));
        let _ = circuit.call(|| Ok::<_, &str>(()));
        assert!(circuit.is_closed());

        let _ = circuit.call(|| Err::<(), _>("error 2"));
        assert!(circuit.is_open());
    }
}

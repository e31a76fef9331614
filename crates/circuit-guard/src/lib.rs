//! circuit-guard - circuit breaker guard for fallible operations
//!
//! This crate provides a circuit breaker with:
//! - Three-state lifecycle (Closed → Open → HalfOpen) driven by a state machine
//! - Per-generation counters with optional closed-state interval reset
//! - Lazy, clock-driven Open → HalfOpen promotion (no timer thread)
//! - A user-supplied trip predicate over the current counters
//!
//! The breaker never retries. It only decides whether a single call may run and
//! records how it went.
//!
//! # Example
//!
//! ```rust
//! use circuit_guard::{CircuitBreaker, CircuitError};
//! use std::time::Duration;
//!
//! let circuit = CircuitBreaker::builder("http_get")
//!     .max_requests(1)
//!     .timeout(Duration::from_secs(30))
//!     .ready_to_trip(|stats| stats.requests >= 3 && stats.failure_ratio() >= 0.6)
//!     .on_open(|name| println!("Circuit {} opened!", name))
//!     .build();
//!
//! for _ in 0..3 {
//!     let _ = circuit.call(|| Err::<(), _>("connection refused"));
//! }
//!
//! // Rejected without running the operation
//! let result = circuit.call(|| Ok::<_, &str>("body"));
//! assert!(matches!(result, Err(CircuitError::Open { .. })));
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod clock;
pub mod errors;
pub mod machine;
pub mod stats;

pub use builder::CircuitBuilder;
pub use callbacks::Callbacks;
pub use circuit::{CircuitBreaker, Config, DEFAULT_TIMEOUT, TripFn, default_ready_to_trip};
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::CircuitError;
pub use machine::{Input, State};
pub use stats::Stats;

//! Basic circuit breaker usage example

use circuit_guard::CircuitBreaker;
use std::time::Duration;

fn fetch(url: &str, healthy: bool) -> Result<Vec<u8>, String> {
    if healthy {
        Ok(format!("User-agent: *\n# served by {url}").into_bytes())
    } else {
        Err(format!("GET {url}: connection refused"))
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circuit_guard=debug".into()),
        )
        .init();

    let url = "http://example.invalid/robots.txt";

    let circuit = CircuitBreaker::builder("HTTP GET")
        .max_requests(1)
        .timeout(Duration::from_millis(500))
        .ready_to_trip(|stats| stats.requests >= 3 && stats.failure_ratio() >= 0.6)
        .on_state_change(|name, from, to| println!("Circuit '{}': {} -> {}", name, from, to))
        .build();

    println!("Initial state: {}\n", circuit.state_name());

    println!("--- Failing upstream ---");
    for _ in 0..4 {
        match circuit.call(|| fetch(url, false)) {
            Ok(body) => println!("✓ {} bytes", body.len()),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("State: {}, stats: {:?}\n", circuit.state_name(), circuit.stats());

    println!("--- Waiting for the open timeout ---");
    std::thread::sleep(Duration::from_millis(500));

    match circuit.call(|| fetch(url, true)) {
        Ok(body) => println!("✓ {}", String::from_utf8_lossy(&body)),
        Err(e) => println!("✗ {}", e),
    }
    println!("State: {}, stats: {:?}", circuit.state_name(), circuit.stats());
}

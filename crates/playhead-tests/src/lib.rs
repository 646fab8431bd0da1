//! Integration test crate for the Playhead rendering engine.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on the core, media, and engine crates to verify the full
//! producer/consumer pipeline end to end against the pattern decoder.

#[cfg(test)]
mod workflow;

#[cfg(test)]
mod persistence;

/// Route engine logs to the test harness. Controlled by `RUST_LOG`;
/// idempotent so every test can call it.
#[cfg(test)]
fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

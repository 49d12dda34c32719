//! Logging setup for binaries built on this crate.
//!
//! Handlers log with structured fields (`conversation_id`, `sender`, `topic`, `resource`)
//! so a single conversation can be followed through the output, e.g. with
//! `RUST_LOG=leco_actor=debug`.

/// Initializes the global `tracing` subscriber, filtered by `RUST_LOG`.
///
/// Panics if a global subscriber is already set; call it once at startup.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}

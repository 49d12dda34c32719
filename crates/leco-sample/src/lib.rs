//! # LECO Sample Library
//!
//! A simulated instrument and the wiring that puts it behind a locking actor, exposed for
//! the demo binary and for integration testing.

pub mod instrument;
pub mod system;

//! # Framework Errors
//!
//! This module defines the common error types used throughout the actor core.
//! Lock conflicts and uncorrelated responses are deliberately *not* errors: they are
//! reported as `bool` by the buffer and the locking actor.

use crate::rpc::RpcError;

/// Errors that can occur within the actor core itself.
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    /// No correlated reply arrived before the deadline.
    #[error("Reading timed out")]
    Timeout,
    /// The handler's internal pipe is gone (handler closed or dropped).
    #[error("Pipe closed")]
    PipeClosed,
    #[error("Handler dropped response channel")]
    HandlerDropped,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    #[error("Empty sender frame not allowed to send")]
    MissingSender,
    #[error("Reply without payload")]
    EmptyReply,
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    /// The remote side answered with a JSON-RPC error object.
    #[error("Remote error: {0}")]
    Rpc(RpcError),
}

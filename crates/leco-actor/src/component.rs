//! # Component Trait
//!
//! The `Component` trait is the request-dispatch seam of a [`PipeHandler`](crate::PipeHandler).
//! Every inbound JSON-RPC request that is neither a correlated reply nor one of the
//! handler's built-in methods ends up in [`Component::call`].
//!
//! The handler never shares the component with another thread: it is owned by the handler
//! and only borrowed mutably for the duration of one call. State such as a lock table lives
//! inside the component and is therefore only reachable through the owning handler.
//!
//! The identity of the requester (the sender of the in-flight message) is passed to every
//! call explicitly, so a component can make per-caller decisions without keeping a
//! "current message" around.

use crate::rpc::{MethodInfo, Params, RpcError};
use serde_json::Value;

pub trait Component: Send + 'static {
    /// Methods offered in addition to the handler's built-in ones, for `rpc.discover`.
    fn rpc_methods(&self) -> Vec<MethodInfo> {
        Vec::new()
    }

    /// Executes `method` on behalf of `requester`.
    ///
    /// The default knows no method at all.
    fn call(
        &mut self,
        method: &str,
        _params: &Params,
        _requester: &[u8],
    ) -> Result<Value, RpcError> {
        Err(RpcError::method_not_found(method))
    }

    /// Called after the handler's full name changed.
    fn on_name_change(&mut self, _full_name: &str) {}
}

/// A component without methods of its own.
impl Component for () {}

//! # LECO Actor
//!
//! The communication core of a LECO actor: a component that sits on a message bus, answers
//! JSON-RPC requests from other components and controls a device on their behalf.
//!
//! ## Architecture Overview
//!
//! The crate separates concerns into three layers:
//!
//! 1. **Event loop** ([`PipeHandler`]) - owns the [`Transport`], signs in with the
//!    coordinator and dispatches every inbound request
//! 2. **Proxies** ([`CommunicatorPipe`]) - let any other thread send, subscribe and ask
//!    through the loop, blocking only the calling thread
//! 3. **Components** ([`Component`], [`LockingActor`]) - the methods an actor offers, e.g.
//!    access to a [`Device`] guarded by hierarchical locks
//!
//! Replies for waiting threads are correlated by conversation id in the shared
//! [`MessageBuffer`]; the loop itself never waits for a reply.
//!
//! ```text
//!   thread A ──┐  PipeCommand   ┌─────────────┐  Transport  ┌──────────┐
//!   thread B ──┼───────────────▶│ PipeHandler │◀───────────▶│ network  │
//!              │                └──────┬──────┘             └──────────┘
//!              │   reply               │ replies of announced conversations
//!              └──────── MessageBuffer ◀┘
//! ```
//!
//! ## Concurrency Model
//!
//! - The handler runs as one Tokio task and handles messages **sequentially**
//! - Communicators may be used from any number of threads at the same time
//! - A blocking call waits on the buffer's condition variable, never on the handler
//! - The lock table of a [`LockingActor`] is only touched by its handler
//!
//! ## Testing
//!
//! The [`mock`] module provides an in-memory [`Transport`] with a scriptable peer.

pub mod buffer;
pub mod command;
pub mod communicator;
pub mod communicator_trait;
pub mod component;
pub mod config;
pub mod device;
pub mod error;
pub mod handler;
pub mod locking;
pub mod message;
pub mod mock;
pub mod resource;
pub mod rpc;
pub mod tracing;
pub mod transport;

// Re-export core types for convenience
pub use buffer::{MatchPredicate, MessageBuffer};
pub use command::{PipeCommand, Response};
pub use communicator::CommunicatorPipe;
pub use communicator_trait::Communicator;
pub use component::Component;
pub use config::HandlerConfig;
pub use device::{Device, DeviceError};
pub use error::FrameworkError;
pub use handler::PipeHandler;
pub use locking::LockingActor;
pub use message::{ConversationId, Message};
pub use resource::ResourcePath;
pub use rpc::{MethodInfo, Params, RpcError, RpcRequest, RpcResponse};
pub use transport::Transport;

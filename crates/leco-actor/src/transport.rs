//! # Transport Seam
//!
//! The socket library carrying LECO messages is not part of this crate. A
//! [`PipeHandler`](crate::PipeHandler) owns exactly one [`Transport`] and is the only code
//! that ever touches it; other threads reach the network through a
//! [`CommunicatorPipe`](crate::CommunicatorPipe).

use crate::error::FrameworkError;
use crate::message::Message;
use async_trait::async_trait;

#[async_trait]
pub trait Transport: Send + 'static {
    /// Sends an already addressed message. The sender is always set.
    async fn send(&mut self, message: Message) -> Result<(), FrameworkError>;

    /// Waits for the next inbound message, `None` once the transport is closed.
    ///
    /// Must be cancel safe: the handler polls it inside `tokio::select!`.
    async fn recv(&mut self) -> Option<Message>;

    /// Subscribes to a data protocol topic.
    fn subscribe(&mut self, topic: &str) -> Result<(), FrameworkError>;

    fn unsubscribe(&mut self, topic: &str) -> Result<(), FrameworkError>;
}

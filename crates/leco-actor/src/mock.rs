//! # Mock Transport & Testing Guide
//!
//! [`MockTransport`] implements [`Transport`] entirely in memory. Its counterpart, the
//! [`MockPeer`], plays the rest of the network: it injects inbound messages, receives
//! whatever the handler sends and records every subscription change. Tests therefore run a
//! real [`PipeHandler`](crate::PipeHandler) without sockets, a coordinator or other
//! actors.
//!
//! ## Testing Strategies
//!
//! <details>
//! <summary><b>Pattern 1: Driving the handler step by step</b></summary>
//!
//! **When to use**: Checking how a single message is handled.
//!
//! ```rust
//! use leco_actor::mock::mock_transport;
//! use leco_actor::rpc::build_request;
//! use leco_actor::{Message, PipeHandler};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (transport, mut peer) = mock_transport();
//!     let mut handler = PipeHandler::new("actor", transport, ());
//!
//!     let request = Message::new("actor")
//!         .with_sender("N1.caller")
//!         .with_data(&build_request("pong", None))
//!         .unwrap();
//!     handler.handle_message(request).await;
//!
//!     let reply = peer.next_sent().await.unwrap();
//!     assert_eq!(reply.receiver, b"N1.caller");
//! }
//! ```
//! </details>
//!
//! <details>
//! <summary><b>Pattern 2: Listening handler with communicators</b></summary>
//!
//! **When to use**: Testing blocking callers against a running event loop.
//!
//! Spawn `handler.listen()` as a task, acknowledge the sign in with
//! [`MockPeer::expect_request`] and [`MockPeer::reply`], and call the communicator from
//! `tokio::task::spawn_blocking`. See `tests/handler_test.rs` for complete examples.
//! </details>
//!
//! ## Testing Failure Scenarios
//!
//! [`MockPeer::fail_sends`] makes every further send fail, and [`MockPeer::close`] ends the
//! inbound stream, which stops a listening handler.

use crate::error::FrameworkError;
use crate::message::Message;
use crate::rpc::{RpcRequest, RpcResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long [`MockPeer`] waits for the handler to send something.
pub const SENT_TIMEOUT: Duration = Duration::from_secs(2);

/// A subscription change seen by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopicCall {
    Subscribe(String),
    Unsubscribe(String),
}

/// Creates a connected transport/peer pair.
pub fn mock_transport() -> (MockTransport, MockPeer) {
    let (inbound_sender, inbound) = mpsc::unbounded_channel();
    let (outbound, outbound_receiver) = mpsc::unbounded_channel();
    let topic_calls = Arc::new(Mutex::new(Vec::new()));
    let failing = Arc::new(AtomicBool::new(false));
    let transport = MockTransport {
        inbound,
        outbound,
        topic_calls: Arc::clone(&topic_calls),
        failing: Arc::clone(&failing),
    };
    let peer = MockPeer {
        inbound: Some(inbound_sender),
        outbound: outbound_receiver,
        topic_calls,
        failing,
    };
    (transport, peer)
}

pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Message>,
    outbound: mpsc::UnboundedSender<Message>,
    topic_calls: Arc<Mutex<Vec<TopicCall>>>,
    failing: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: Message) -> Result<(), FrameworkError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(FrameworkError::Transport("send failure injected".to_string()));
        }
        // Same contract as the wire: frames need a sender.
        message.to_frames()?;
        self.outbound
            .send(message)
            .map_err(|_| FrameworkError::Transport("peer dropped".to_string()))
    }

    async fn recv(&mut self) -> Option<Message> {
        self.inbound.recv().await
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), FrameworkError> {
        self.topic_calls.lock().push(TopicCall::Subscribe(topic.to_string()));
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), FrameworkError> {
        self.topic_calls.lock().push(TopicCall::Unsubscribe(topic.to_string()));
        Ok(())
    }
}

/// The network side of a [`MockTransport`].
pub struct MockPeer {
    inbound: Option<mpsc::UnboundedSender<Message>>,
    outbound: mpsc::UnboundedReceiver<Message>,
    topic_calls: Arc<Mutex<Vec<TopicCall>>>,
    failing: Arc<AtomicBool>,
}

impl MockPeer {
    /// Delivers `message` to the handler as if read from the network.
    pub fn inject(&self, message: Message) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(message);
        }
    }

    /// Answers `request` in its conversation, as `sender`.
    pub fn reply(
        &self,
        request: &Message,
        sender: &str,
        response: &RpcResponse,
    ) -> Result<(), FrameworkError> {
        self.inject(reply_message(request, sender, response)?);
        Ok(())
    }

    /// Next message the handler sent, `None` after [`SENT_TIMEOUT`].
    pub async fn next_sent(&mut self) -> Option<Message> {
        tokio::time::timeout(SENT_TIMEOUT, self.outbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// A message already sent, without waiting.
    pub fn try_next_sent(&mut self) -> Option<Message> {
        self.outbound.try_recv().ok()
    }

    /// Expects the next sent message to be a request for `method` and returns it.
    ///
    /// Panics otherwise.
    pub async fn expect_request(&mut self, method: &str) -> Message {
        let message = self
            .next_sent()
            .await
            .unwrap_or_else(|| panic!("Expected a '{method}' request, nothing was sent"));
        let request = request_of(&message)
            .unwrap_or_else(|| panic!("Expected a '{method}' request, got {message:?}"));
        assert_eq!(request.method, method, "Unexpected request");
        message
    }

    pub fn topic_calls(&self) -> Vec<TopicCall> {
        self.topic_calls.lock().clone()
    }

    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::Relaxed);
    }

    /// Ends the inbound stream; the transport reports closed afterwards.
    pub fn close(&mut self) {
        self.inbound = None;
    }
}

/// The reply to `request` in its conversation, sent by `sender`.
pub fn reply_message(
    request: &Message,
    sender: &str,
    response: &RpcResponse,
) -> Result<Message, FrameworkError> {
    Message::new(request.sender.clone())
        .with_sender(sender)
        .with_conversation_id(request.conversation_id())
        .with_data(response)
}

/// The JSON-RPC request carried by `message`, if any.
pub fn request_of(message: &Message) -> Option<RpcRequest> {
    let frame = message.payload.first()?;
    serde_json::from_slice(frame).ok()
}

/// The JSON-RPC response carried by `message`, if any.
pub fn response_of(message: &Message) -> Option<RpcResponse> {
    let frame = message.payload.first()?;
    serde_json::from_slice(frame).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::build_request;

    #[tokio::test]
    async fn test_sent_messages_reach_the_peer() {
        let (mut transport, mut peer) = mock_transport();
        let message = Message::new("N1.other")
            .with_sender("N1.me")
            .with_data(&build_request("pong", None))
            .unwrap();
        transport.send(message.clone()).await.unwrap();
        assert_eq!(peer.expect_request("pong").await, message);
    }

    #[tokio::test]
    async fn test_send_without_sender_fails() {
        let (mut transport, mut peer) = mock_transport();
        let result = transport.send(Message::new("N1.other")).await;
        assert!(matches!(result, Err(FrameworkError::MissingSender)));
        assert!(peer.try_next_sent().is_none());
    }

    #[tokio::test]
    async fn test_close_ends_inbound() {
        let (mut transport, mut peer) = mock_transport();
        peer.inject(Message::new("me").with_sender("you"));
        peer.close();
        assert!(transport.recv().await.is_some());
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_records_topic_calls_and_injected_failures() {
        let (mut transport, peer) = mock_transport();
        transport.subscribe("N1.source").unwrap();
        transport.unsubscribe("N1.source").unwrap();
        assert_eq!(
            peer.topic_calls(),
            vec![
                TopicCall::Subscribe("N1.source".to_string()),
                TopicCall::Unsubscribe("N1.source".to_string()),
            ]
        );

        peer.fail_sends();
        let message = Message::new("x").with_sender("me");
        assert!(matches!(
            transport.send(message).await,
            Err(FrameworkError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_reply_answers_in_the_request_conversation() {
        let (mut transport, peer) = mock_transport();
        let request = Message::new("N1.other")
            .with_sender("N1.me")
            .with_data(&build_request("pong", None))
            .unwrap();
        let response = RpcResponse::success(serde_json::json!(1), serde_json::Value::Null);
        peer.reply(&request, "N1.other", &response).unwrap();

        let reply = transport.recv().await.unwrap();
        assert_eq!(reply.conversation_id(), request.conversation_id());
        assert_eq!(reply.receiver, b"N1.me");
        assert_eq!(reply.sender, b"N1.other");
        assert_eq!(response_of(&reply), Some(response));
    }
}

//! # Message Buffer
//!
//! Thread safe store correlating replies with the requests waiting for them.
//!
//! A caller announces the conversation it will wait for with
//! [`MessageBuffer::add_conversation_id`]. The handler thread offers every inbound message
//! via [`MessageBuffer::add_response_message`]; only messages of announced conversations
//! are kept, everything else is refused so unsolicited traffic never accumulates. The
//! waiting thread finally claims its reply with [`MessageBuffer::retrieve_message`].

use crate::error::FrameworkError;
use crate::message::{ConversationId, Message};
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct BufferState {
    messages: Vec<Message>,
    pending: HashSet<ConversationId>,
}

/// Lazily evaluated match condition for one conversation.
///
/// Each evaluation scans the buffered messages; on a hit the message is moved into the
/// result slot and removed from the buffer, leaving the order of the others untouched.
/// A miss has no side effects.
#[derive(Debug)]
pub struct MatchPredicate {
    target: ConversationId,
    result: Option<Message>,
}

impl MatchPredicate {
    pub fn new(target: ConversationId) -> Self {
        Self {
            target,
            result: None,
        }
    }

    pub fn check(&mut self, messages: &mut Vec<Message>) -> bool {
        if self.result.is_some() {
            return true;
        }
        match messages
            .iter()
            .position(|m| m.conversation_id() == self.target)
        {
            Some(index) => {
                self.result = Some(messages.remove(index));
                true
            }
            None => false,
        }
    }

    pub fn into_result(self) -> Option<Message> {
        self.result
    }
}

/// Buffers replies for threads other than the handler's own.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    state: Mutex<BufferState>,
    arrived: Condvar,
}

impl MessageBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announces that a reply in `conversation_id` will be waited for.
    pub fn add_conversation_id(&self, conversation_id: ConversationId) {
        self.state.lock().pending.insert(conversation_id);
    }

    /// Withdraws an announcement, e.g. after the request could not be sent.
    pub fn remove_conversation_id(&self, conversation_id: &ConversationId) {
        self.state.lock().pending.remove(conversation_id);
    }

    pub fn is_pending(&self, conversation_id: &ConversationId) -> bool {
        self.state.lock().pending.contains(conversation_id)
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Buffers `message` if its conversation was announced.
    ///
    /// The announcement is consumed, so a second reply in the same conversation is refused
    /// unless the conversation is announced again.
    pub fn add_response_message(&self, message: &Message) -> bool {
        let mut state = self.state.lock();
        if !state.pending.remove(&message.conversation_id()) {
            return false;
        }
        trace!(conversation_id = %message.conversation_id(), "Buffered response");
        state.messages.push(message.clone());
        drop(state);
        self.arrived.notify_all();
        true
    }

    /// Removes and returns the reply in `conversation_id`, waiting up to `timeout`.
    ///
    /// Whatever the outcome, the conversation is no longer announced afterwards: a reply
    /// arriving after a timeout is refused instead of lingering in the buffer.
    pub fn retrieve_message(
        &self,
        conversation_id: ConversationId,
        timeout: Duration,
    ) -> Result<Message, FrameworkError> {
        let mut predicate = MatchPredicate::new(conversation_id);
        let mut state = self.state.lock();
        if !predicate.check(&mut state.messages) {
            self.arrived
                .wait_while_for(&mut state, |s| !predicate.check(&mut s.messages), timeout);
            // A reply stored while the timed out wait reacquired the lock still counts.
            predicate.check(&mut state.messages);
        }
        state.pending.remove(&conversation_id);
        drop(state);
        match predicate.into_result() {
            Some(message) => Ok(message),
            None => {
                debug!(%conversation_id, ?timeout, "Reading timed out");
                Err(FrameworkError::Timeout)
            }
        }
    }

    /// Like [`retrieve_message`](Self::retrieve_message), but announces the conversation
    /// first unless its reply is already buffered.
    pub fn await_message(
        &self,
        conversation_id: ConversationId,
        timeout: Duration,
    ) -> Result<Message, FrameworkError> {
        {
            let mut state = self.state.lock();
            let buffered = state
                .messages
                .iter()
                .any(|m| m.conversation_id() == conversation_id);
            if !buffered {
                state.pending.insert(conversation_id);
            }
        }
        self.retrieve_message(conversation_id, timeout)
    }

    /// Number of buffered, unclaimed messages.
    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    fn cid() -> ConversationId {
        ConversationId::from(*b"conversation_id;")
    }

    fn msg() -> Message {
        Message::new("r")
            .with_sender("s")
            .with_conversation_id(cid())
            .with_message_id(*b"mid")
    }

    fn other() -> Message {
        Message::new("r")
            .with_sender("s")
            .with_conversation_id(ConversationId::from(*b"conversation_id9"))
            .with_message_id(*b"mid")
    }

    /// Fills the buffer directly, bypassing the pending-set gate.
    fn buffer_with(messages: Vec<Message>) -> MessageBuffer {
        let buffer = MessageBuffer::new();
        buffer.state.lock().messages = messages;
        buffer
    }

    #[test]
    fn test_add_conversation_id() {
        let buffer = MessageBuffer::new();
        buffer.add_conversation_id(cid());
        buffer.add_conversation_id(cid());
        assert!(buffer.is_pending(&cid()));
        assert_eq!(buffer.pending_len(), 1);
    }

    #[test]
    fn test_add_response_message_successful() {
        let buffer = MessageBuffer::new();
        buffer.add_conversation_id(cid());

        assert!(buffer.add_response_message(&msg()));
        assert_eq!(buffer.state.lock().messages, vec![msg()]);
        assert!(!buffer.is_pending(&cid()));
    }

    #[test]
    fn test_add_fails_without_previous_cid() {
        let buffer = MessageBuffer::new();
        assert!(!buffer.add_response_message(&msg()));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_second_response_is_refused() {
        let buffer = MessageBuffer::new();
        buffer.add_conversation_id(cid());
        assert!(buffer.add_response_message(&msg()));
        assert!(!buffer.add_response_message(&msg()));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_predicate_message_in_first_place() {
        let mut messages = vec![msg()];
        let mut predicate = MatchPredicate::new(cid());
        assert!(predicate.check(&mut messages));
        assert!(messages.is_empty());
        assert_eq!(predicate.into_result(), Some(msg()));
    }

    #[test]
    fn test_predicate_no_suitable_message() {
        let mut messages = vec![msg()];
        let mut predicate = MatchPredicate::new(ConversationId::from(*b"other_cid_000000"));
        assert!(!predicate.check(&mut messages));
        assert_eq!(messages, vec![msg()]);
        assert_eq!(predicate.into_result(), None);
    }

    #[test]
    fn test_predicate_message_somewhere_in_buffer() {
        let o2 = other().with_message_id(*b"mi7");
        let mut messages = vec![other(), msg(), o2.clone()];
        let mut predicate = MatchPredicate::new(cid());
        assert!(predicate.check(&mut messages));
        assert_eq!(predicate.into_result(), Some(msg()));
        assert_eq!(messages, vec![other(), o2]);
    }

    #[test]
    fn test_retrieve_message_success() {
        let layouts = [
            vec![msg()],
            vec![msg(), other()],
            vec![other(), msg()],
            vec![other(), msg(), other()],
        ];
        for layout in layouts {
            let original_length = layout.len();
            let buffer = buffer_with(layout);
            let read = buffer
                .retrieve_message(cid(), Duration::from_millis(100))
                .unwrap();
            assert_eq!(read, msg());
            assert_eq!(buffer.len(), original_length - 1);
        }
    }

    #[test]
    fn test_retrieve_message_fail_after_timeout() {
        for layout in [vec![], vec![other()]] {
            let buffer = buffer_with(layout);
            let start = Instant::now();
            let result = buffer.retrieve_message(cid(), Duration::from_millis(20));
            assert!(matches!(result, Err(FrameworkError::Timeout)));
            assert!(start.elapsed() >= Duration::from_millis(20));
        }
    }

    #[test]
    fn test_timeout_keeps_other_conversations() {
        let buffer = buffer_with(vec![other()]);
        buffer.add_conversation_id(cid());
        let _ = buffer.retrieve_message(cid(), Duration::from_millis(5));
        assert_eq!(buffer.len(), 1);
        assert!(!buffer.is_pending(&cid()));
        // a late reply is no longer accepted
        assert!(!buffer.add_response_message(&msg()));
    }

    #[test]
    fn test_retrieve_waits_for_other_thread() {
        let buffer = Arc::new(MessageBuffer::new());
        buffer.add_conversation_id(cid());
        buffer.add_conversation_id(other().conversation_id());

        let producer = Arc::clone(&buffer);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            assert!(producer.add_response_message(&other()));
            std::thread::sleep(Duration::from_millis(20));
            assert!(producer.add_response_message(&msg()));
        });

        let read = buffer.retrieve_message(cid(), Duration::from_secs(2)).unwrap();
        handle.join().unwrap();
        assert_eq!(read, msg());
        assert_eq!(buffer.state.lock().messages, vec![other()]);
    }

    #[test]
    fn test_reply_stored_while_timing_out_is_returned() {
        let buffer = Arc::new(MessageBuffer::new());
        buffer.add_conversation_id(cid());

        let producer = Arc::clone(&buffer);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            // Hold the lock past the reader's deadline, then store the reply silently.
            let mut state = producer.state.lock();
            std::thread::sleep(Duration::from_millis(40));
            state.messages.push(msg());
        });

        let read = buffer.retrieve_message(cid(), Duration::from_millis(20));
        handle.join().unwrap();
        assert_eq!(read.unwrap(), msg());
        assert_eq!(buffer.len(), 0);
        assert!(!buffer.is_pending(&cid()));
    }

    #[test]
    fn test_await_message_registers_interest() {
        let buffer = Arc::new(MessageBuffer::new());
        let producer = Arc::clone(&buffer);
        let handle = std::thread::spawn(move || {
            while !producer.is_pending(&cid()) {
                std::thread::sleep(Duration::from_millis(1));
            }
            producer.add_response_message(&msg())
        });
        let read = buffer.await_message(cid(), Duration::from_secs(2)).unwrap();
        assert!(handle.join().unwrap());
        assert_eq!(read, msg());
    }

    #[test]
    fn test_length_of_buffer() {
        for length in [1, 3, 7] {
            let buffer = buffer_with(vec![msg(); length]);
            assert_eq!(buffer.len(), length);
        }
    }
}

//! # Communicator Pipe
//!
//! The blocking proxy other threads use to talk through a [`PipeHandler`](crate::PipeHandler).
//!
//! Each call first hands a [`PipeCommand`] to the handler over the in-process pipe (never
//! blocking), and, if a reply is expected, then blocks the *calling* thread on the shared
//! [`MessageBuffer`] until the correlated reply arrives or the timeout elapses.
//!
//! Blocking calls must not be made from inside an async task; use
//! `tokio::task::spawn_blocking` or a plain thread.

use crate::buffer::MessageBuffer;
use crate::command::PipeCommand;
use crate::communicator_trait::Communicator;
use crate::error::FrameworkError;
use crate::message::{ConversationId, Message};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use crossbeam_channel::RecvTimeoutError;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

/// Thread safe handle to a handler's pipe, created by
/// [`PipeHandler::get_communicator`](crate::PipeHandler::get_communicator).
#[derive(Debug)]
pub struct CommunicatorPipe {
    name: Mutex<String>,
    address: String,
    pipe: mpsc::UnboundedSender<PipeCommand>,
    buffer: Arc<MessageBuffer>,
    timeout: Duration,
}

impl CommunicatorPipe {
    pub(crate) fn new(
        name: String,
        address: String,
        pipe: mpsc::UnboundedSender<PipeCommand>,
        buffer: Arc<MessageBuffer>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: Mutex::new(name),
            address,
            pipe,
            buffer,
            timeout,
        }
    }

    /// Address of the handler's internal pipe.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Default timeout of blocking calls.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, command: PipeCommand) -> Result<(), FrameworkError> {
        self.pipe
            .send(command)
            .map_err(|_| FrameworkError::PipeClosed)
    }

    /// Waits for the reply in `conversation_id`, announcing it if necessary.
    pub fn read_message(&self, conversation_id: ConversationId) -> Result<Message, FrameworkError> {
        self.read_message_timeout(conversation_id, self.timeout)
    }

    pub fn read_message_timeout(
        &self,
        conversation_id: ConversationId,
        timeout: Duration,
    ) -> Result<Message, FrameworkError> {
        self.buffer.await_message(conversation_id, timeout)
    }

    #[instrument(skip(self, message), fields(conversation_id = %message.conversation_id()))]
    pub fn ask_message_timeout(
        &self,
        message: Message,
        timeout: Duration,
    ) -> Result<Message, FrameworkError> {
        let conversation_id = message.conversation_id();
        self.buffer.add_conversation_id(conversation_id);
        if let Err(e) = self.command(PipeCommand::Send(message)) {
            self.buffer.remove_conversation_id(&conversation_id);
            return Err(e);
        }
        self.buffer.retrieve_message(conversation_id, timeout)
    }

    pub fn subscribe_single(&self, topic: &str) -> Result<(), FrameworkError> {
        self.command(PipeCommand::Subscribe(topic.to_string()))
    }

    pub fn unsubscribe_single(&self, topic: &str) -> Result<(), FrameworkError> {
        self.command(PipeCommand::Unsubscribe(topic.to_string()))
    }

    pub fn unsubscribe_all(&self) -> Result<(), FrameworkError> {
        self.command(PipeCommand::UnsubscribeAll)
    }

    /// Renames the handler and returns once it signed in under the new name.
    pub fn set_name(&self, name: &str) -> Result<(), FrameworkError> {
        self.set_name_timeout(name, self.timeout)
    }

    /// Like [`set_name`](Self::set_name), but gives up after `timeout`.
    ///
    /// After a timeout the command stays queued: the handler may still rename itself once
    /// it services the pipe again, while this communicator keeps its old name.
    #[instrument(skip(self))]
    pub fn set_name_timeout(&self, name: &str, timeout: Duration) -> Result<(), FrameworkError> {
        let (respond_to, response) = crossbeam_channel::bounded(1);
        self.command(PipeCommand::Rename {
            name: name.to_string(),
            respond_to,
        })?;
        let new_name = response.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => FrameworkError::Timeout,
            RecvTimeoutError::Disconnected => FrameworkError::HandlerDropped,
        })??;
        debug!(%new_name, "Renamed");
        *self.name.lock() = new_name;
        Ok(())
    }
}

impl Communicator for CommunicatorPipe {
    fn name(&self) -> String {
        self.name.lock().clone()
    }

    /// Forwards `message`; the handler fills in a missing sender.
    fn send_message(&self, message: Message) -> Result<(), FrameworkError> {
        self.command(PipeCommand::Send(message))
    }

    fn ask_message(&self, message: Message) -> Result<Message, FrameworkError> {
        self.ask_message_timeout(message, self.timeout)
    }
}

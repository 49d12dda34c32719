//! # Pipe Commands
//!
//! Commands a [`CommunicatorPipe`](crate::CommunicatorPipe) hands to its
//! [`PipeHandler`](crate::PipeHandler). They travel over an in-process channel and are
//! executed on the handler's own task, the only place allowed to touch the transport.

use crate::error::FrameworkError;
use crate::message::Message;
/// Type alias for the acknowledgement channel used by the handler.
///
/// Created with capacity one, so the handler's single send never blocks, while the
/// waiting thread can give up after a deadline.
pub type Response<T> = crossbeam_channel::Sender<Result<T, FrameworkError>>;

#[derive(Debug)]
pub enum PipeCommand {
    /// Forward a message over the transport, filling in a missing sender.
    Send(Message),
    Subscribe(String),
    Unsubscribe(String),
    UnsubscribeAll,
    /// Sign out, take the new name, sign in again; acknowledged with the new name.
    Rename {
        name: String,
        respond_to: Response<String>,
    },
}

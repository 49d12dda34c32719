//! # Communicator Trait
//!
//! The common interface of everything that sends and asks LECO messages on behalf of a
//! component. Implementors provide the raw message operations; addressing, JSON
//! serialization and JSON-RPC unwrapping come for free.
use crate::error::FrameworkError;
use crate::message::Message;
use crate::rpc::{build_request, RpcResponse};
use serde::Serialize;
use serde_json::{Map, Value};

pub trait Communicator {
    fn name(&self) -> String;

    fn send_message(&self, message: Message) -> Result<(), FrameworkError>;

    /// Sends `message` and blocks until the reply in its conversation arrives.
    fn ask_message(&self, message: Message) -> Result<Message, FrameworkError>;

    /// Sends `data` as JSON to `receiver`.
    fn send<T: Serialize + ?Sized>(&self, receiver: &str, data: &T) -> Result<(), FrameworkError> {
        self.send_message(Message::new(receiver).with_data(data)?)
    }

    fn ask<T: Serialize + ?Sized>(
        &self,
        receiver: &str,
        data: &T,
    ) -> Result<Message, FrameworkError> {
        self.ask_message(Message::new(receiver).with_data(data)?)
    }

    /// Calls `method` on `receiver` and returns the `result` of the reply.
    ///
    /// An `error` in the reply becomes [`FrameworkError::Rpc`].
    #[tracing::instrument(skip(self, params))]
    fn ask_rpc(
        &self,
        receiver: &str,
        method: &str,
        params: Option<Map<String, Value>>,
    ) -> Result<Value, FrameworkError> {
        tracing::debug!("Sending request");
        let reply = self.ask(receiver, &build_request(method, params))?;
        let frame = reply.payload.first().ok_or(FrameworkError::EmptyReply)?;
        let response: RpcResponse = serde_json::from_slice(frame)?;
        response.into_result().map_err(FrameworkError::Rpc)
    }
}

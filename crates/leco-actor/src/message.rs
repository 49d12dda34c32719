//! # LECO Message Envelope
//!
//! A message consists of the frames `version`, `receiver`, `sender`, `header` and zero or
//! more payload frames. The header frame carries the conversation id (16 bytes), the
//! message id (3 bytes) and the message type (1 byte).
//!
//! If a message has no sender, the sending component fills in its own full name.

use crate::error::FrameworkError;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Protocol version frame.
pub const VERSION: u8 = 0;

pub const CONVERSATION_ID_LENGTH: usize = 16;
pub const MESSAGE_ID_LENGTH: usize = 3;
const HEADER_LENGTH: usize = CONVERSATION_ID_LENGTH + MESSAGE_ID_LENGTH + 1;

/// Identifier shared by every message of one request/response exchange.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationId([u8; CONVERSATION_ID_LENGTH]);

impl ConversationId {
    /// Generates a new, time ordered conversation id.
    pub fn generate() -> Self {
        Self(*Uuid::now_v7().as_bytes())
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, FrameworkError> {
        let raw: [u8; CONVERSATION_ID_LENGTH] = bytes.try_into().map_err(|_| {
            FrameworkError::InvalidHeader(format!(
                "length of conversation_id is {}, not {CONVERSATION_ID_LENGTH} bytes",
                bytes.len()
            ))
        })?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; CONVERSATION_ID_LENGTH]> for ConversationId {
    fn from(raw: [u8; CONVERSATION_ID_LENGTH]) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConversationId({self})")
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// The parsed header frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub conversation_id: ConversationId,
    pub message_id: [u8; MESSAGE_ID_LENGTH],
    pub message_type: u8,
}

impl Header {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            message_id: [0; MESSAGE_ID_LENGTH],
            message_type: 0,
        }
    }

    pub fn to_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(HEADER_LENGTH);
        frame.extend_from_slice(self.conversation_id.as_bytes());
        frame.extend_from_slice(&self.message_id);
        frame.push(self.message_type);
        frame
    }

    pub fn from_frame(frame: &[u8]) -> Result<Self, FrameworkError> {
        if frame.len() < HEADER_LENGTH {
            return Err(FrameworkError::InvalidHeader(format!(
                "header frame has {} bytes, expected {HEADER_LENGTH}",
                frame.len()
            )));
        }
        let conversation_id = ConversationId::from_slice(&frame[..CONVERSATION_ID_LENGTH])?;
        let mut message_id = [0; MESSAGE_ID_LENGTH];
        message_id.copy_from_slice(&frame[CONVERSATION_ID_LENGTH..HEADER_LENGTH - 1]);
        Ok(Self {
            conversation_id,
            message_id,
            message_type: frame[HEADER_LENGTH - 1],
        })
    }
}

/// A message of the LECO control protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub receiver: Vec<u8>,
    pub sender: Vec<u8>,
    pub header: Header,
    pub payload: Vec<Vec<u8>>,
}

impl Message {
    /// Creates an empty message to `receiver` in a fresh conversation.
    pub fn new(receiver: impl Into<Vec<u8>>) -> Self {
        Self {
            receiver: receiver.into(),
            sender: Vec::new(),
            header: Header::new(ConversationId::generate()),
            payload: Vec::new(),
        }
    }

    pub fn with_sender(mut self, sender: impl Into<Vec<u8>>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: ConversationId) -> Self {
        self.header.conversation_id = conversation_id;
        self
    }

    pub fn with_message_id(mut self, message_id: [u8; MESSAGE_ID_LENGTH]) -> Self {
        self.header.message_id = message_id;
        self
    }

    /// Serializes `data` as JSON into the first payload frame.
    pub fn with_data<T: Serialize + ?Sized>(mut self, data: &T) -> Result<Self, FrameworkError> {
        self.payload = vec![serde_json::to_vec(data)?];
        Ok(self)
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.header.conversation_id
    }

    pub fn message_id(&self) -> [u8; MESSAGE_ID_LENGTH] {
        self.header.message_id
    }

    pub fn message_type(&self) -> u8 {
        self.header.message_type
    }

    /// The JSON content of the first payload frame, if any.
    pub fn data(&self) -> Result<Option<Value>, FrameworkError> {
        match self.payload.first() {
            Some(frame) => Ok(Some(serde_json::from_slice(frame)?)),
            None => Ok(None),
        }
    }

    /// Namespace part of the sender (`b""` if the sender is not qualified).
    pub fn sender_namespace(&self) -> &[u8] {
        split_name(&self.sender).0
    }

    pub fn sender_name(&self) -> &[u8] {
        split_name(&self.sender).1
    }

    /// Frames ready for sending. The sender must be set.
    pub fn to_frames(&self) -> Result<Vec<Vec<u8>>, FrameworkError> {
        if self.sender.is_empty() {
            return Err(FrameworkError::MissingSender);
        }
        let mut frames = Vec::with_capacity(4 + self.payload.len());
        frames.push(vec![VERSION]);
        frames.push(self.receiver.clone());
        frames.push(self.sender.clone());
        frames.push(self.header.to_frame());
        frames.extend(self.payload.iter().cloned());
        Ok(frames)
    }

    pub fn from_frames(frames: Vec<Vec<u8>>) -> Result<Self, FrameworkError> {
        let mut frames = frames.into_iter();
        let (Some(_version), Some(receiver), Some(sender), Some(header)) =
            (frames.next(), frames.next(), frames.next(), frames.next())
        else {
            return Err(FrameworkError::InvalidHeader(
                "message needs at least four frames".to_string(),
            ));
        };
        Ok(Self {
            receiver,
            sender,
            header: Header::from_frame(&header)?,
            payload: frames.collect(),
        })
    }
}

/// Splits `namespace.name` at the last dot.
fn split_name(full_name: &[u8]) -> (&[u8], &[u8]) {
    match full_name.iter().rposition(|b| *b == b'.') {
        Some(dot) => (&full_name[..dot], &full_name[dot + 1..]),
        None => (&full_name[..0], full_name),
    }
}

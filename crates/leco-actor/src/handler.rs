//! # Pipe Handler
//!
//! This module defines the `PipeHandler`, the event loop of an actor. It is the single
//! owner of the actor's [`Transport`] and bridges the loop with other threads: those get a
//! [`CommunicatorPipe`] via [`PipeHandler::get_communicator`] and hand their work over an
//! in-process pipe instead of touching the transport.
//!
//! Every inbound message is classified once:
//!
//! * a reply some communicator waits for goes to the shared [`MessageBuffer`],
//! * anything else is a request and dispatched by [`PipeHandler::finish_handle_commands`],
//!   first against the handler's built-in methods, then against the [`Component`].
//!
//! The loop never waits for a reply itself, so a caller blocked on the buffer never stalls
//! the processing of other traffic.

use crate::buffer::MessageBuffer;
use crate::command::PipeCommand;
use crate::communicator::CommunicatorPipe;
use crate::component::Component;
use crate::config::HandlerConfig;
use crate::error::FrameworkError;
use crate::message::{ConversationId, Message};
use crate::rpc::{
    self, build_request, MethodInfo, Params, RpcError, RpcRequest, RpcResponse, DISCOVER_METHOD,
};
use crate::transport::Transport;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Base address of the internal pipes.
pub const PIPE_ADDRESS: &str = "inproc://listenerPipe";

static NEXT_PIPE_PORT: AtomicU32 = AtomicU32::new(12345);

type NameChangeHook = Box<dyn FnMut(&str) + Send>;

/// One topic or a list of topics, as accepted by `subscribe`/`unsubscribe`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Topics {
    One(String),
    Many(Vec<String>),
}

impl Topics {
    fn into_vec(self) -> Vec<String> {
        match self {
            Topics::One(topic) => vec![topic],
            Topics::Many(topics) => topics,
        }
    }
}

/// The event loop of an actor, generic over the transport and the request-dispatch
/// component.
pub struct PipeHandler<C: Component, T: Transport> {
    config: HandlerConfig,
    name: String,
    namespace: Option<String>,
    full_name: String,
    transport: T,
    component: C,
    buffer: Arc<MessageBuffer>,
    pipe: Option<mpsc::UnboundedReceiver<PipeCommand>>,
    pipe_port: Option<u32>,
    communicator: Option<Arc<CommunicatorPipe>>,
    subscriptions: Vec<String>,
    name_change_hooks: Vec<NameChangeHook>,
    sign_in_conversation: Option<ConversationId>,
    stop_requested: bool,
}

impl<C: Component, T: Transport> PipeHandler<C, T> {
    pub fn new(name: impl Into<String>, transport: T, component: C) -> Self {
        Self::with_config(HandlerConfig::new(name), transport, component)
    }

    pub fn with_config(config: HandlerConfig, transport: T, component: C) -> Self {
        Self {
            name: config.name.clone(),
            full_name: config.name.clone(),
            config,
            namespace: None,
            transport,
            component,
            buffer: Arc::new(MessageBuffer::new()),
            pipe: None,
            pipe_port: None,
            communicator: None,
            subscriptions: Vec::new(),
            name_change_hooks: Vec::new(),
            sign_in_conversation: None,
            stop_requested: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `namespace.name` once signed in, the bare name before.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn buffer(&self) -> &Arc<MessageBuffer> {
        &self.buffer
    }

    pub fn component(&self) -> &C {
        &self.component
    }

    pub fn component_mut(&mut self) -> &mut C {
        &mut self.component
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    /// Port of the internal pipe, once bound by [`get_communicator`](Self::get_communicator).
    pub fn pipe_port(&self) -> Option<u32> {
        self.pipe_port
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Registers a callback invoked with the new full name on every name change.
    pub fn add_name_change_hook(&mut self, hook: impl FnMut(&str) + Send + 'static) {
        self.name_change_hooks.push(Box::new(hook));
    }

    pub fn set_full_name(&mut self, full_name: impl Into<String>) {
        self.full_name = full_name.into();
        info!(full_name = %self.full_name, "Name changed");
        for hook in &mut self.name_change_hooks {
            hook(&self.full_name);
        }
        self.component.on_name_change(&self.full_name);
    }

    // --- Communicator side ---

    /// Returns the communicator of this handler, binding the internal pipe on first use.
    ///
    /// Every call returns the same instance.
    pub fn get_communicator(&mut self) -> Arc<CommunicatorPipe> {
        if let Some(communicator) = &self.communicator {
            return Arc::clone(communicator);
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        let port = NEXT_PIPE_PORT.fetch_add(1, Ordering::Relaxed);
        let address = format!("{PIPE_ADDRESS}:{port}");
        debug!(%address, "Pipe bound");
        let communicator = Arc::new(CommunicatorPipe::new(
            self.name.clone(),
            address,
            sender,
            Arc::clone(&self.buffer),
            self.config.read_timeout,
        ));
        self.pipe = Some(receiver);
        self.pipe_port = Some(port);
        self.communicator = Some(Arc::clone(&communicator));
        communicator
    }

    /// Waits for the next pipe command and executes it.
    pub async fn handle_pipe_message(&mut self) -> Result<(), FrameworkError> {
        let pipe = self.pipe.as_mut().ok_or(FrameworkError::PipeClosed)?;
        let command = pipe.recv().await.ok_or(FrameworkError::PipeClosed)?;
        self.execute_pipe_command(command).await;
        Ok(())
    }

    async fn execute_pipe_command(&mut self, command: PipeCommand) {
        debug!(?command, "Pipe command");
        match command {
            PipeCommand::Send(message) => {
                if let Err(e) = self.send_message(message).await {
                    warn!(error = %e, "Sending pipe message failed");
                }
            }
            PipeCommand::Subscribe(topic) => {
                if let Err(e) = self.subscribe_single(&topic) {
                    warn!(%topic, error = %e, "Subscription failed");
                }
            }
            PipeCommand::Unsubscribe(topic) => {
                if let Err(e) = self.unsubscribe_single(&topic) {
                    warn!(%topic, error = %e, "Unsubscription failed");
                }
            }
            PipeCommand::UnsubscribeAll => {
                if let Err(e) = self.unsubscribe_all() {
                    warn!(error = %e, "Unsubscription failed");
                }
            }
            PipeCommand::Rename { name, respond_to } => {
                let result = self.rename(name).await;
                let _ = respond_to.send(result);
            }
        }
    }

    /// Sign out, take `new_name`, sign in again.
    async fn rename(&mut self, new_name: String) -> Result<String, FrameworkError> {
        self.sign_out().await?;
        let full_name = match &self.namespace {
            Some(namespace) => format!("{namespace}.{new_name}"),
            None => new_name.clone(),
        };
        self.name = new_name;
        self.set_full_name(full_name);
        self.sign_in().await?;
        Ok(self.name.clone())
    }

    /// Drops the pipe; calls of existing communicators fail afterwards.
    pub fn close(&mut self) {
        self.pipe = None;
        self.communicator = None;
        info!(name = %self.full_name, "Pipe closed");
    }

    // --- Transport side ---

    /// Sends `message`, filling in the own full name as sender if missing.
    pub async fn send_message(&mut self, mut message: Message) -> Result<(), FrameworkError> {
        if message.sender.is_empty() {
            message.sender = self.full_name.clone().into_bytes();
        }
        debug!(
            receiver = %String::from_utf8_lossy(&message.receiver),
            conversation_id = %message.conversation_id(),
            "Sending"
        );
        self.transport.send(message).await
    }

    async fn send_coordinator_request(
        &mut self,
        method: &str,
    ) -> Result<ConversationId, FrameworkError> {
        let message =
            Message::new(self.config.coordinator.clone()).with_data(&build_request(method, None))?;
        let conversation_id = message.conversation_id();
        self.send_message(message).await?;
        Ok(conversation_id)
    }

    pub async fn sign_in(&mut self) -> Result<(), FrameworkError> {
        let conversation_id = self.send_coordinator_request("sign_in").await?;
        self.sign_in_conversation = Some(conversation_id);
        Ok(())
    }

    pub async fn sign_out(&mut self) -> Result<(), FrameworkError> {
        self.send_coordinator_request("sign_out").await?;
        Ok(())
    }

    pub fn subscribe_single(&mut self, topic: &str) -> Result<(), FrameworkError> {
        if self.subscriptions.iter().any(|t| t == topic) {
            info!(%topic, "Already subscribed");
            return Ok(());
        }
        debug!(%topic, "Subscribing");
        self.transport.subscribe(topic)?;
        self.subscriptions.push(topic.to_string());
        Ok(())
    }

    pub fn unsubscribe_single(&mut self, topic: &str) -> Result<(), FrameworkError> {
        debug!(%topic, "Unsubscribing");
        self.transport.unsubscribe(topic)?;
        self.subscriptions.retain(|t| t != topic);
        Ok(())
    }

    pub fn unsubscribe_all(&mut self) -> Result<(), FrameworkError> {
        while let Some(topic) = self.subscriptions.pop() {
            self.transport.unsubscribe(&topic)?;
        }
        Ok(())
    }

    /// Runs the event loop until the transport closes or `shutdown` is requested.
    pub async fn listen(&mut self) -> Result<(), FrameworkError> {
        info!(name = %self.name, "Start listening");
        self.stop_requested = false;
        self.sign_in().await?;

        let mut transport_open = true;
        while !self.stop_requested {
            tokio::select! {
                inbound = self.transport.recv() => match inbound {
                    Some(message) => self.handle_message(message).await,
                    None => {
                        info!("Transport closed");
                        transport_open = false;
                        break;
                    }
                },
                Some(command) = next_command(&mut self.pipe) => {
                    self.execute_pipe_command(command).await;
                }
            }
        }

        info!(name = %self.full_name, "Stop listening");
        if transport_open {
            self.sign_out().await?;
        }
        Ok(())
    }

    /// Entry point for every message read from the transport.
    pub async fn handle_message(&mut self, message: Message) {
        debug!(
            sender = %String::from_utf8_lossy(&message.sender),
            conversation_id = %message.conversation_id(),
            "Handling"
        );
        if message.payload.is_empty() {
            return;
        }
        if message.sender_name() == self.config.coordinator.as_bytes()
            && self.handle_coordinator_message(&message).await
        {
            return;
        }
        self.handle_commands(message).await;
    }

    /// Control protocol replies of the coordinator. Returns whether `message` was consumed.
    async fn handle_coordinator_message(&mut self, message: &Message) -> bool {
        if self.buffer.is_pending(&message.conversation_id()) {
            return false;
        }
        let Ok(Some(Value::Object(data))) = message.data() else {
            return false;
        };
        if data.contains_key("method") {
            return false;
        }
        match data.get("error").and_then(|e| e.get("code")).and_then(Value::as_i64) {
            Some(rpc::NOT_SIGNED_IN) => {
                warn!("I was not signed in, signing in");
                self.namespace = None;
                let name = self.name.clone();
                self.set_full_name(name);
                if let Err(e) = self.sign_in().await {
                    error!(error = %e, "Sign in failed");
                }
            }
            Some(rpc::DUPLICATE_NAME) => warn!("Sign in failed, the name is already used"),
            Some(code) => warn!(code, "Coordinator reported an error"),
            None if self.sign_in_conversation == Some(message.conversation_id()) => {
                self.sign_in_conversation = None;
                self.finish_sign_in(message);
            }
            None => debug!("Coordinator acknowledged"),
        }
        true
    }

    fn finish_sign_in(&mut self, message: &Message) {
        let namespace = String::from_utf8_lossy(message.sender_namespace()).into_owned();
        let full_name = format!("{namespace}.{}", self.name);
        info!(%namespace, "Signed in");
        self.namespace = Some(namespace);
        self.set_full_name(full_name);
    }

    /// Collects a requested reply or passes the message on as a request.
    pub async fn handle_commands(&mut self, message: Message) {
        if self.buffer.add_response_message(&message) {
            debug!(conversation_id = %message.conversation_id(), "Response buffered");
            return;
        }
        self.finish_handle_commands(message).await;
    }

    /// Handles a message nobody waits for: executes it as a JSON-RPC request and replies.
    pub async fn finish_handle_commands(&mut self, message: Message) {
        let data = match message.data() {
            Ok(Some(Value::Object(data))) if data.contains_key("jsonrpc") => data,
            Ok(data) => {
                warn!(
                    sender = %String::from_utf8_lossy(&message.sender),
                    ?data,
                    "Unknown message received"
                );
                return;
            }
            Err(e) => {
                warn!(error = %e, "Undecodable message received");
                return;
            }
        };
        if !data.contains_key("method") {
            error!(
                sender = %String::from_utf8_lossy(&message.sender),
                ?data,
                "Unexpected response received"
            );
            return;
        }

        let response = match serde_json::from_value::<RpcRequest>(Value::Object(data)) {
            Ok(request) => {
                let params = Params::new(request.params);
                let result = self.dispatch(&request.method, &params, &message.sender);
                match (request.id, result) {
                    (None, Ok(_)) => return,
                    (None, Err(e)) => {
                        warn!(method = %request.method, error = %e, "Notification failed");
                        return;
                    }
                    (Some(id), Ok(value)) => RpcResponse::success(id, value),
                    (Some(id), Err(e)) => {
                        warn!(method = %request.method, error = %e, "Request failed");
                        RpcResponse::failure(id, e)
                    }
                }
            }
            Err(e) => RpcResponse::failure(
                Value::Null,
                RpcError::new(rpc::INVALID_REQUEST, "Invalid Request").with_data(e.to_string()),
            ),
        };

        let reply = Message::new(message.sender.clone())
            .with_conversation_id(message.conversation_id())
            .with_data(&response);
        let sent = match reply {
            Ok(reply) => self.send_message(reply).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!(error = %e, "Sending reply failed");
        }
    }

    fn dispatch(
        &mut self,
        method: &str,
        params: &Params,
        requester: &[u8],
    ) -> Result<Value, RpcError> {
        debug!(%method, "Dispatch");
        match method {
            "pong" => Ok(Value::Null),
            "shutdown" => {
                self.stop_requested = true;
                Ok(Value::Null)
            }
            "subscribe" | "unsubscribe" => {
                let topics = params.require::<Topics>(0, "topics")?.into_vec();
                for topic in &topics {
                    let outcome = if method == "subscribe" {
                        self.subscribe_single(topic)
                    } else {
                        self.unsubscribe_single(topic)
                    };
                    outcome.map_err(execution_failed)?;
                }
                Ok(Value::Null)
            }
            "unsubscribe_all" => {
                self.unsubscribe_all().map_err(execution_failed)?;
                Ok(Value::Null)
            }
            DISCOVER_METHOD => Ok(self.discover()),
            _ => self.component.call(method, params, requester),
        }
    }

    fn discover(&self) -> Value {
        let mut methods = vec![
            MethodInfo::new("pong", "Respond to any request."),
            MethodInfo::new("shutdown", "Stop the event loop."),
            MethodInfo::new("subscribe", "Subscribe to one or more topics."),
            MethodInfo::new("unsubscribe", "Unsubscribe from one or more topics."),
            MethodInfo::new("unsubscribe_all", "Unsubscribe from all topics."),
        ];
        methods.extend(self.component.rpc_methods());
        let mut info = Map::new();
        info.insert("title".to_string(), Value::from(self.full_name.clone()));
        info.insert("version".to_string(), Value::from(env!("CARGO_PKG_VERSION")));
        json!({
            "openrpc": "1.2.6",
            "info": info,
            "methods": methods,
        })
    }
}

fn execution_failed(e: FrameworkError) -> RpcError {
    RpcError::new(rpc::EXECUTION_FAILED, "Execution of the action failed.").with_data(e.to_string())
}

async fn next_command(
    pipe: &mut Option<mpsc::UnboundedReceiver<PipeCommand>>,
) -> Option<PipeCommand> {
    match pipe {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

//! Starts a [`FantasyInstrument`] behind a locking actor.
//!
//! The actor runs as its own Tokio task; local code talks to it only through the returned
//! [`CommunicatorPipe`].

use crate::instrument::FantasyInstrument;
use leco_actor::{
    CommunicatorPipe, FrameworkError, HandlerConfig, LockingActor, PipeHandler, Transport,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, Instrument};

pub type InstrumentActor<T> = PipeHandler<LockingActor<FantasyInstrument>, T>;

pub struct InstrumentSystem<T: Transport> {
    pub communicator: Arc<CommunicatorPipe>,
    handle: JoinHandle<(InstrumentActor<T>, Result<(), FrameworkError>)>,
}

impl<T: Transport> InstrumentSystem<T> {
    pub fn start(config: HandlerConfig, transport: T, instrument: FantasyInstrument) -> Self {
        let span = tracing::info_span!("actor", name = %config.name);
        let actor = LockingActor::new(instrument);
        let mut handler = PipeHandler::with_config(config, transport, actor);
        let communicator = handler.get_communicator();
        let handle = tokio::spawn(
            async move {
                let result = handler.listen().await;
                (handler, result)
            }
            .instrument(span),
        );
        info!("Instrument actor started");
        Self {
            communicator,
            handle,
        }
    }

    /// Waits until the actor stopped, after a `shutdown` request or a closed transport.
    pub async fn wait(self) -> Result<InstrumentActor<T>, String> {
        let (handler, result) = self.handle.await.map_err(|e| e.to_string())?;
        result.map_err(|e| e.to_string())?;
        info!(name = %handler.full_name(), "Instrument actor stopped");
        Ok(handler)
    }
}

//! # LECO Sample
//!
//! Runs a simulated instrument behind a locking actor. The network is played by an
//! in-memory peer which acts as coordinator and as two remote components:
//!
//! 1. `N1.owner` locks the channel of the instrument.
//! 2. `N1.intruder` tries to change a channel property and is refused.
//! 3. The owner changes it, then shuts the actor down.
//!
//! Meanwhile a local thread asks another component through the actor's communicator.

use leco_actor::mock::{mock_transport, response_of, MockPeer};
use leco_actor::tracing::setup_tracing;
use leco_actor::{Communicator, HandlerConfig, Message, RpcResponse};
use leco_sample::instrument::FantasyInstrument;
use leco_sample::system::InstrumentSystem;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, Instrument};

async fn call(
    peer: &mut MockPeer,
    caller: &str,
    method: &str,
    params: Value,
) -> Result<RpcResponse, String> {
    let request = Message::new("N1.instrument")
        .with_sender(caller)
        .with_data(&json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params}))
        .map_err(|e| e.to_string())?;
    peer.inject(request);
    let reply = peer.next_sent().await.ok_or("no reply")?;
    response_of(&reply).ok_or_else(|| "reply is no JSON-RPC response".to_string())
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let (transport, mut peer) = mock_transport();
    let system = InstrumentSystem::start(
        HandlerConfig::new("instrument"),
        transport,
        FantasyInstrument::default(),
    );

    let sign_in = peer.expect_request("sign_in").await;
    peer.reply(&sign_in, "N1.COORDINATOR", &RpcResponse::success(json!(1), Value::Null))
        .map_err(|e| e.to_string())?;

    let span = tracing::info_span!("locking");
    async {
        let locked = call(&mut peer, "N1.owner", "lock", json!({"resource": "channel"})).await?;
        info!(result = ?locked.into_result(), "Owner locked the channel");

        let parameters = json!({"parameters": {"channel.channel_property": 3}});
        let denied = call(&mut peer, "N1.intruder", "set_parameters", parameters.clone()).await?;
        match denied.into_result() {
            Err(e) => info!(code = e.code, message = %e.message, "Intruder refused"),
            Ok(_) => error!("Intruder changed a locked channel"),
        }

        call(&mut peer, "N1.owner", "set_parameters", parameters).await?;
        let values = call(
            &mut peer,
            "N1.intruder",
            "get_parameters",
            json!({"parameters": ["prop", "prop2"]}),
        )
        .await?;
        info!(result = ?values.into_result(), "Unlocked parameters stay readable");
        Ok::<_, String>(())
    }
    .instrument(span)
    .await?;

    // A local thread asks a remote component through the actor.
    let communicator = Arc::clone(&system.communicator);
    let question = tokio::task::spawn_blocking(move || {
        communicator.ask_rpc("N1.thermometer", "get_parameters", None)
    });
    let request = peer.expect_request("get_parameters").await;
    let temperature = RpcResponse::success(json!(1), json!({"temperature": 21.5}));
    peer.reply(&request, "N1.thermometer", &temperature)
        .map_err(|e| e.to_string())?;
    match question.await.map_err(|e| e.to_string())? {
        Ok(answer) => info!(%answer, "Thermometer answered"),
        Err(e) => error!(error = %e, "Asking the thermometer failed"),
    }

    call(&mut peer, "N1.owner", "shutdown", json!([])).await?;
    peer.expect_request("sign_out").await;

    let handler = system.wait().await?;
    info!(
        channel_property = handler.component().device().channel.channel_property,
        "Application completed successfully"
    );
    Ok(())
}

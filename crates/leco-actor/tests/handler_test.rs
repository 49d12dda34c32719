use leco_actor::mock::{
    mock_transport, reply_message, request_of, response_of, MockPeer, MockTransport, TopicCall,
};
use leco_actor::rpc::{self, MethodInfo, Params, RpcError, RpcResponse};
use leco_actor::{Communicator, Component, FrameworkError, HandlerConfig, Message, PipeHandler};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// --- Test Component ---

/// Echoes its params and records its name changes.
#[derive(Default)]
struct Echo {
    renames: Vec<String>,
}

impl Component for Echo {
    fn rpc_methods(&self) -> Vec<MethodInfo> {
        vec![MethodInfo::new("echo", "Return the given value.")]
    }

    fn call(&mut self, method: &str, params: &Params, requester: &[u8]) -> Result<Value, RpcError> {
        match method {
            "echo" => Ok(json!({
                "value": params.get::<Value>(0, "value")?,
                "requester": String::from_utf8_lossy(requester),
            })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn on_name_change(&mut self, full_name: &str) {
        self.renames.push(full_name.to_string());
    }
}

fn setup() -> (PipeHandler<Echo, MockTransport>, MockPeer) {
    let (transport, peer) = mock_transport();
    (PipeHandler::new("actor", transport, Echo::default()), peer)
}

fn request(method: &str, params: Value) -> Message {
    Message::new("N1.actor")
        .with_sender("N1.caller")
        .with_data(&json!({"jsonrpc": "2.0", "id": 5, "method": method, "params": params}))
        .unwrap()
}

fn coordinator_ack(request: &Message) -> Message {
    reply_message(
        request,
        "N1.COORDINATOR",
        &RpcResponse::success(json!(1), Value::Null),
    )
    .unwrap()
}

/// Acknowledges the sign in of a listening handler and waits until it was processed.
async fn sign_in_listening(peer: &mut MockPeer) {
    let sign_in = peer.expect_request("sign_in").await;
    peer.inject(coordinator_ack(&sign_in));
    // Inbound messages are handled in order: once the pong is answered, so is the ack.
    peer.inject(request("pong", json!([])));
    let pong = response_of(&peer.next_sent().await.unwrap()).unwrap();
    assert_eq!(pong.into_result().unwrap(), Value::Null);
}

// --- Request handling ---

#[tokio::test]
async fn test_request_is_answered_in_its_conversation() {
    let (mut handler, mut peer) = setup();
    let message = request("echo", json!({"value": 7}));

    handler.handle_message(message.clone()).await;

    let reply = peer.next_sent().await.unwrap();
    assert_eq!(reply.receiver, b"N1.caller");
    assert_eq!(reply.sender, b"actor");
    assert_eq!(reply.conversation_id(), message.conversation_id());
    let response = response_of(&reply).unwrap();
    assert_eq!(response.id, json!(5));
    assert_eq!(
        response.into_result().unwrap(),
        json!({"value": 7, "requester": "N1.caller"})
    );
}

#[tokio::test]
async fn test_unknown_method_is_reported() {
    let (mut handler, mut peer) = setup();
    handler.handle_message(request("nonexistent", json!([]))).await;

    let error = response_of(&peer.next_sent().await.unwrap())
        .unwrap()
        .into_result()
        .unwrap_err();
    assert_eq!(error.code, rpc::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_notification_is_not_answered() {
    let (mut handler, mut peer) = setup();
    let notification = Message::new("actor")
        .with_sender("N1.caller")
        .with_data(&json!({"jsonrpc": "2.0", "method": "pong"}))
        .unwrap();

    handler.handle_message(notification).await;

    assert!(peer.try_next_sent().is_none());
}

#[tokio::test]
async fn test_unsolicited_response_is_dropped() {
    let (mut handler, mut peer) = setup();
    let response = Message::new("actor")
        .with_sender("N1.other")
        .with_data(&RpcResponse::success(json!(1), json!(3)))
        .unwrap();

    handler.handle_message(response).await;

    assert!(handler.buffer().is_empty());
    assert!(peer.try_next_sent().is_none());
}

#[tokio::test]
async fn test_awaited_response_goes_to_the_buffer() {
    let (mut handler, mut peer) = setup();
    let response = Message::new("actor")
        .with_sender("N1.other")
        .with_data(&RpcResponse::success(json!(1), json!(3)))
        .unwrap();
    let conversation_id = response.conversation_id();
    handler.buffer().add_conversation_id(conversation_id);

    handler.handle_commands(response.clone()).await;

    assert_eq!(handler.buffer().len(), 1);
    assert!(peer.try_next_sent().is_none());
    let buffered = handler
        .buffer()
        .retrieve_message(conversation_id, Duration::ZERO)
        .unwrap();
    assert_eq!(buffered, response);
}

#[tokio::test]
async fn test_rpc_discover_lists_builtin_and_component_methods() {
    let (mut handler, mut peer) = setup();
    handler.handle_message(request(rpc::DISCOVER_METHOD, json!([]))).await;

    let result = response_of(&peer.next_sent().await.unwrap())
        .unwrap()
        .into_result()
        .unwrap();
    let names: Vec<&str> = result["methods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    for name in ["pong", "shutdown", "subscribe", "unsubscribe", "unsubscribe_all", "echo"] {
        assert!(names.contains(&name), "{name} missing in {names:?}");
    }
    assert_eq!(result["info"]["title"], json!("actor"));
}

#[tokio::test]
async fn test_subscribe_methods() {
    let (mut handler, mut peer) = setup();
    handler
        .handle_message(request("subscribe", json!({"topics": ["N1.a", "N1.b"]})))
        .await;
    handler.handle_message(request("subscribe", json!(["N1.a"]))).await;
    handler.handle_message(request("unsubscribe", json!({"topics": "N1.a"}))).await;

    assert_eq!(handler.subscriptions(), ["N1.b".to_string()]);
    assert_eq!(
        peer.topic_calls(),
        vec![
            TopicCall::Subscribe("N1.a".to_string()),
            TopicCall::Subscribe("N1.b".to_string()),
            TopicCall::Unsubscribe("N1.a".to_string()),
        ]
    );
    for _ in 0..3 {
        let response = response_of(&peer.next_sent().await.unwrap()).unwrap();
        assert!(response.into_result().is_ok());
    }
}

// --- Coordinator ---

#[tokio::test]
async fn test_sign_in_reply_sets_namespace_and_calls_hooks() {
    let (mut handler, mut peer) = setup();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let hook_seen = Arc::clone(&seen);
    handler.add_name_change_hook(move |name| hook_seen.lock().unwrap().push(name.to_string()));

    handler.sign_in().await.unwrap();
    let sign_in = peer.expect_request("sign_in").await;
    assert_eq!(sign_in.receiver, b"COORDINATOR");
    handler.handle_message(coordinator_ack(&sign_in)).await;

    assert_eq!(handler.namespace(), Some("N1"));
    assert_eq!(handler.full_name(), "N1.actor");
    assert_eq!(*seen.lock().unwrap(), ["N1.actor".to_string()]);
    assert_eq!(handler.component().renames, ["N1.actor".to_string()]);
    assert!(peer.try_next_sent().is_none());
}

#[tokio::test]
async fn test_not_signed_in_error_triggers_new_sign_in() {
    let (mut handler, mut peer) = setup();
    handler.sign_in().await.unwrap();
    let sign_in = peer.expect_request("sign_in").await;
    handler.handle_message(coordinator_ack(&sign_in)).await;

    let error = Message::new("N1.actor")
        .with_sender("N1.COORDINATOR")
        .with_data(&RpcResponse::failure(
            Value::Null,
            RpcError::new(rpc::NOT_SIGNED_IN, "You did not sign in!"),
        ))
        .unwrap();
    handler.handle_message(error).await;

    assert_eq!(handler.namespace(), None);
    let again = peer.expect_request("sign_in").await;
    assert_eq!(again.sender, b"actor");
}

// --- Communicator ---

#[tokio::test]
async fn test_get_communicator_returns_the_same_instance() {
    let (mut handler, _peer) = setup();
    assert_eq!(handler.pipe_port(), None);

    let first = handler.get_communicator();
    let second = handler.get_communicator();

    assert!(Arc::ptr_eq(&first, &second));
    let port = handler.pipe_port().unwrap();
    assert_eq!(first.address(), format!("inproc://listenerPipe:{port}"));
    assert_eq!(first.name(), "actor");
}

#[tokio::test]
async fn test_communicators_of_different_handlers_use_different_ports() {
    let (mut first, _first_peer) = setup();
    let (mut second, _second_peer) = setup();
    first.get_communicator();
    second.get_communicator();
    assert_ne!(first.pipe_port(), second.pipe_port());
}

#[tokio::test]
async fn test_pipe_send_fills_in_missing_sender() {
    let (mut handler, mut peer) = setup();
    let communicator = handler.get_communicator();

    communicator.send("N1.other", &json!({"x": 1})).unwrap();
    communicator
        .send_message(Message::new("N1.other").with_sender("N1.explicit"))
        .unwrap();
    handler.handle_pipe_message().await.unwrap();
    handler.handle_pipe_message().await.unwrap();

    let first = peer.next_sent().await.unwrap();
    assert_eq!(first.sender, b"actor");
    assert_eq!(first.data().unwrap(), Some(json!({"x": 1})));
    let second = peer.next_sent().await.unwrap();
    assert_eq!(second.sender, b"N1.explicit");
}

#[tokio::test]
async fn test_pipe_subscriptions() {
    let (mut handler, peer) = setup();
    let communicator = handler.get_communicator();

    communicator.subscribe_single("N1.a").unwrap();
    communicator.subscribe_single("N1.b").unwrap();
    communicator.unsubscribe_single("N1.a").unwrap();
    communicator.unsubscribe_all().unwrap();
    for _ in 0..4 {
        handler.handle_pipe_message().await.unwrap();
    }

    assert!(handler.subscriptions().is_empty());
    assert_eq!(
        peer.topic_calls(),
        vec![
            TopicCall::Subscribe("N1.a".to_string()),
            TopicCall::Subscribe("N1.b".to_string()),
            TopicCall::Unsubscribe("N1.a".to_string()),
            TopicCall::Unsubscribe("N1.b".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_read_message_times_out_and_forgets_the_conversation() {
    let (mut handler, _peer) = setup();
    let communicator = handler.get_communicator();
    let conversation_id = Message::new("x").conversation_id();

    let result = tokio::task::spawn_blocking(move || {
        communicator.read_message_timeout(conversation_id, Duration::from_millis(20))
    })
    .await
    .unwrap();

    assert!(matches!(result, Err(FrameworkError::Timeout)));
    assert_eq!(handler.buffer().pending_len(), 0);
}

#[tokio::test]
async fn test_closed_handler_refuses_commands() {
    let (mut handler, _peer) = setup();
    let communicator = handler.get_communicator();
    handler.close();

    let result = communicator.send("N1.other", &json!(1));
    assert!(matches!(result, Err(FrameworkError::PipeClosed)));
    assert!(matches!(
        handler.handle_pipe_message().await,
        Err(FrameworkError::PipeClosed)
    ));
}

// --- Listening handler ---

#[tokio::test]
async fn test_ask_rpc_through_listening_handler() {
    let (mut handler, mut peer) = setup();
    let communicator = handler.get_communicator();
    let task = tokio::spawn(async move {
        handler.listen().await.unwrap();
        handler
    });

    sign_in_listening(&mut peer).await;

    let asker = Arc::clone(&communicator);
    let answer = tokio::task::spawn_blocking(move || asker.ask_rpc("N1.other", "get_value", None));

    let question = peer.expect_request("get_value").await;
    assert_eq!(question.sender, b"N1.actor");
    peer.reply(&question, "N1.other", &RpcResponse::success(json!(1), json!(42)))
        .unwrap();
    assert_eq!(answer.await.unwrap().unwrap(), json!(42));

    let failing = Arc::clone(&communicator);
    let answer =
        tokio::task::spawn_blocking(move || failing.ask_rpc("N1.other", "get_value", None));
    let question = peer.expect_request("get_value").await;
    peer.reply(
        &question,
        "N1.other",
        &RpcResponse::failure(json!(1), RpcError::new(rpc::EXECUTION_FAILED, "broken")),
    )
    .unwrap();
    match answer.await.unwrap() {
        Err(FrameworkError::Rpc(error)) => assert_eq!(error.code, rpc::EXECUTION_FAILED),
        other => panic!("unexpected result {other:?}"),
    }

    peer.inject(request("shutdown", json!([])));
    let reply = peer.next_sent().await.unwrap();
    assert!(request_of(&reply).is_none());
    peer.expect_request("sign_out").await;

    let handler = task.await.unwrap();
    assert!(handler.stop_requested());
    assert_eq!(handler.full_name(), "N1.actor");
}

#[tokio::test]
async fn test_rename_signs_out_then_in_again() {
    let (mut handler, mut peer) = setup();
    let communicator = handler.get_communicator();
    let task = tokio::spawn(async move {
        handler.listen().await.unwrap();
        handler
    });
    sign_in_listening(&mut peer).await;

    let renamer = Arc::clone(&communicator);
    let renamed = tokio::task::spawn_blocking(move || renamer.set_name("renamed"));

    let sign_out = peer.expect_request("sign_out").await;
    assert_eq!(sign_out.sender, b"N1.actor");
    let sign_in = peer.expect_request("sign_in").await;
    assert_eq!(sign_in.sender, b"N1.renamed");
    renamed.await.unwrap().unwrap();
    assert_eq!(communicator.name(), "renamed");

    // A closed transport ends the loop without signing out.
    peer.close();
    let handler = task.await.unwrap();
    assert_eq!(handler.name(), "renamed");
    assert_eq!(
        handler.component().renames,
        ["N1.actor".to_string(), "N1.renamed".to_string()]
    );
    assert!(peer.try_next_sent().is_none());
}

#[tokio::test]
async fn test_rename_times_out_without_listening_handler() {
    let (transport, mut peer) = mock_transport();
    let config = HandlerConfig::new("actor").with_read_timeout(Duration::from_millis(50));
    let mut handler = PipeHandler::with_config(config, transport, Echo::default());
    let communicator = handler.get_communicator();

    let renamer = Arc::clone(&communicator);
    let renamed = tokio::task::spawn_blocking(move || renamer.set_name("renamed"));

    assert!(matches!(renamed.await.unwrap(), Err(FrameworkError::Timeout)));
    assert_eq!(communicator.name(), "actor");
    assert_eq!(handler.name(), "actor");
    assert!(handler.component().renames.is_empty());
    assert!(peer.try_next_sent().is_none());
}

#[tokio::test]
async fn test_concurrent_asks_get_their_own_replies() {
    let (mut handler, mut peer) = setup();
    let communicator = handler.get_communicator();
    let task = tokio::spawn(async move {
        handler.listen().await.unwrap();
        handler
    });
    sign_in_listening(&mut peer).await;

    let askers: Vec<_> = (0..3)
        .map(|i| {
            let communicator = Arc::clone(&communicator);
            tokio::task::spawn_blocking(move || communicator.ask("N1.other", &json!({"ask": i})))
        })
        .collect();

    let mut questions = Vec::new();
    for _ in 0..3 {
        questions.push(peer.next_sent().await.unwrap());
    }
    // Answer in reverse order, echoing the question.
    for question in questions.iter().rev() {
        let data = question.data().unwrap().unwrap();
        let reply = Message::new(question.sender.clone())
            .with_sender("N1.other")
            .with_conversation_id(question.conversation_id())
            .with_data(&data)
            .unwrap();
        peer.inject(reply);
    }
    for (i, asker) in askers.into_iter().enumerate() {
        let reply = asker.await.unwrap().unwrap();
        assert_eq!(reply.data().unwrap(), Some(json!({"ask": i})));
    }

    peer.close();
    let handler = task.await.unwrap();
    assert!(handler.buffer().is_empty());
    assert_eq!(handler.buffer().pending_len(), 0);
}

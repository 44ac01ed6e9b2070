//! End-to-end client tests against a fake core running on the in-memory
//! broker.

use std::sync::Arc;
use std::time::Duration;

use corebridge::prelude::*;
use corebridge_protocol::{Element, EnvelopeCodec, ServiceCall};
use corebridge_schema::{FunctionRecord, SchemaError, ServiceRecord, Shape, TypeRecord};
use corebridge_transport::{Address, Message, QueueDefinition};
use tokio::sync::mpsc;

// =========================================================================
// Fake core
// =========================================================================

const REPLIES: &str = "core.core-client";
const DATA: &str = "core.data";

fn registry() -> Arc<TypeRegistry> {
    let schema = SchemaDocument::new()
        .with_type(TypeRecord::new("Foo").attribute("name", "String"))
        .with_type(
            TypeRecord::new("Entry")
                .attribute("title", "String")
                .attribute("link", "String"),
        )
        .with_service(
            ServiceRecord::new("Greeter")
                .function(FunctionRecord::new("greet").parameter("who", "Foo")),
        )
        .with_service(
            ServiceRecord::new("Svc").function(
                FunctionRecord::new("greet")
                    .parameter("who", "Foo")
                    .returns("String"),
            ),
        )
        .with_service(
            ServiceRecord::new("SyndicationService").function(
                FunctionRecord::new("fetchLatest")
                    .parameter("maxEntries", "Integer")
                    .parameter("feedUrl", "String")
                    .returns("List<Entry>"),
            ),
        );
    Arc::new(TypeRegistry::load(&schema).unwrap())
}

fn entry(title: &str) -> Value {
    Value::from(
        Object::record("Entry")
            .with("title", title)
            .with("link", format!("http://example.org/{title}")),
    )
}

/// Spawns a core that answers every request with the replies `respond`
/// returns, each published on `<queue>.<sessionId>`. Raw requests are
/// forwarded to the returned channel.
async fn spawn_core<F>(broker: &MemoryBroker, respond: F) -> mpsc::UnboundedReceiver<Message>
where
    F: Fn(&CoreMessage) -> Vec<(&'static str, CoreMessage)> + Send + 'static,
{
    let connection = broker.connect();
    let session = connection.create_session().await.unwrap();
    let inbox = session
        .create_receiver(&Address::direct(QueueDefinition::CLIENT_TO_CORE.name))
        .await
        .unwrap();
    let codec = EnvelopeCodec::new(registry());
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok(raw) = inbox.fetch(Duration::from_secs(3600)).await {
            let request = codec.deserialize(&raw.content).unwrap();
            let _ = seen_tx.send(raw);
            for (queue, reply) in respond(&request) {
                let address = Address::session_scoped(queue, &request.session_id);
                let sender = session.create_sender(&address).await.unwrap();
                let content = codec.serialize(&reply).unwrap();
                sender.send(Message::new(content)).await.unwrap();
            }
        }
    });

    seen_rx
}

/// A core that accepts everything and never has data.
fn accept_all(request: &CoreMessage) -> Vec<(&'static str, CoreMessage)> {
    let body = match request.message_type() {
        MessageType::InitiateSessionRequest => {
            MessageBody::InitiateSessionResponse(ResponseStatus::success())
        }
        MessageType::KillSessionRequest => MessageBody::KillSessionResponse(ResponseStatus::success()),
        _ => MessageBody::ServiceResponse {
            status: ResponseStatus::success(),
            has_data: false,
        },
    };
    vec![(REPLIES, CoreMessage::reply_to(request, body))]
}

/// Logs go to the test writer; `RUST_LOG=corebridge=debug` shows the wire.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn client(broker: &MemoryBroker) -> CoreClient<corebridge_transport::MemoryConnection> {
    init_tracing();
    CoreClientBuilder::new()
        .connect(broker.connect(), registry())
        .await
        .unwrap()
}

fn fault(error_type: ErrorType, code: &str) -> Fault {
    Fault {
        error_type,
        code: code.into(),
        message: format!("{code} happened"),
        vars: vec!["one".into(), "two".into()],
    }
}

// =========================================================================
// Requests on the wire
// =========================================================================

#[tokio::test]
async fn test_invoke_greet_sends_encoded_parameter_and_properties() {
    let broker = MemoryBroker::new();
    let mut seen = spawn_core(&broker, accept_all).await;
    let client = client(&broker).await;

    let who = Object::new("Foo").with("name", "Ada");
    let result = client.invoke("s-1", "Greeter", "greet", [("who", who)]).await.unwrap();
    assert_eq!(result, None);

    let raw = seen.recv().await.unwrap();
    assert_eq!(raw.property("choreography"), Some("Greeter"));
    assert_eq!(raw.property("messageType"), Some("ServiceRequest"));
    assert_eq!(raw.property("sessionId"), Some("s-1"));
    assert!(raw.property("guid").is_some_and(|guid| !guid.is_empty()));

    let envelope = Element::parse(&raw.content).unwrap();
    assert_eq!(envelope.child_text("function"), Some("greet"));
    let parameter = envelope.child("parameters").unwrap().child("parameter").unwrap();
    assert_eq!(parameter.child_text("name"), Some("who"));
    assert_eq!(parameter.child_text("value"), Some("<Foo><name>Ada</name></Foo>"));
}

#[tokio::test]
async fn test_invoke_orders_parameters_by_declaration() {
    let broker = MemoryBroker::new();
    let mut seen = spawn_core(&broker, |request| {
        let reply = CoreMessage::reply_to(
            request,
            MessageBody::ServiceResponse {
                status: ResponseStatus::success(),
                has_data: false,
            },
        );
        vec![(REPLIES, reply)]
    })
    .await;
    let client = client(&broker).await;

    let params = [
        ("feedUrl", Value::from("http://example.org/rss")),
        ("maxEntries", Value::from(5)),
    ];
    let data = client
        .invoke("s-1", "SyndicationService", "fetchLatest", params)
        .await
        .unwrap();
    assert_eq!(data, None);

    let raw = seen.recv().await.unwrap();
    let request = client.codec().deserialize(&raw.content).unwrap();
    let MessageBody::ServiceRequest(call) = request.body else {
        panic!("expected a service request");
    };
    let names: Vec<&str> = call.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["maxEntries", "feedUrl"]);
    assert_eq!(call.parameter("maxEntries"), Some(&Value::Integer(5)));
}

#[tokio::test]
async fn test_make_request_releases_reply_queue_after_success() {
    let broker = MemoryBroker::new();
    let _seen = spawn_core(&broker, accept_all).await;
    let client = client(&broker).await;

    let reply = client.initiate_session("s-1").await.unwrap();
    assert_eq!(reply.message_type(), MessageType::InitiateSessionResponse);
    assert!(!broker.queue_exists("core.core-client.s-1"));
}

// =========================================================================
// Data path
// =========================================================================

#[tokio::test]
async fn test_invoke_with_return_type_fetches_data() {
    let broker = MemoryBroker::new();
    let _seen = spawn_core(&broker, |request| {
        let reply = CoreMessage::reply_to(
            request,
            MessageBody::ServiceResponse {
                status: ResponseStatus::success(),
                has_data: true,
            },
        );
        let data = CoreMessage::reply_to(
            request,
            MessageBody::DataResponse {
                status: ResponseStatus::success(),
                data: Some(Value::List(vec![entry("first"), entry("second")])),
            },
        );
        // Data ahead of the reply must not be lost.
        vec![(DATA, data), (REPLIES, reply)]
    })
    .await;
    let client = client(&broker).await;

    let data = client
        .invoke(
            "s-1",
            "SyndicationService",
            "fetchLatest",
            [("maxEntries", Value::from(2))],
        )
        .await
        .unwrap()
        .unwrap();

    let entries = data.as_slice().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0], entry("first"));
    let second = entries[1].as_object().unwrap();
    assert_eq!(second.type_name(), "Entry");
    assert_eq!(second.read().shape(), Shape::Record);

    assert!(!broker.queue_exists("core.data.s-1"));
    assert!(!broker.queue_exists("core.core-client.s-1"));
}

#[tokio::test]
async fn test_invoke_returning_function_with_no_data_succeeds_empty() {
    let broker = MemoryBroker::new();
    let mut seen = spawn_core(&broker, accept_all).await;
    let client = client(&broker).await;

    let who = Object::new("Foo").with("name", "Ada");
    let result = client.invoke("s-1", "Svc", "greet", [("who", who)]).await.unwrap();
    assert_eq!(result, None);

    let raw = seen.recv().await.unwrap();
    let envelope = Element::parse(&raw.content).unwrap();
    let parameters = envelope.child("parameters").unwrap();
    assert_eq!(parameters.children().len(), 1);
    assert_eq!(
        parameters.children()[0].child_text("value"),
        Some("<Foo><name>Ada</name></Foo>")
    );
    assert!(!broker.queue_exists("core.data.s-1"));
}

#[tokio::test]
async fn test_make_data_request_failed_reply_skips_data_fetch() {
    let broker = MemoryBroker::new();
    let _seen = spawn_core(&broker, |request| {
        let reply = CoreMessage::reply_to(
            request,
            MessageBody::ServiceResponse {
                status: ResponseStatus::failure(&fault(ErrorType::Service, "feed.unreachable")),
                has_data: true,
            },
        );
        vec![(REPLIES, reply)]
    })
    .await;
    let client = client(&broker).await;

    let call = ServiceCall {
        location: None,
        function: "fetchLatest".into(),
        parameters: vec![],
    };
    let message = CoreMessage::service_request("s-1", "SyndicationService", call);
    match client.make_data_request(&message).await {
        Err(CoreError::Service(raised)) => {
            assert_eq!(raised.code, "feed.unreachable");
            assert_eq!(raised.vars, ["one", "two"]);
        }
        other => panic!("expected service error, got {other:?}"),
    }
    assert!(!broker.queue_exists("core.data.s-1"));
}

#[tokio::test]
async fn test_make_data_request_without_data_flag_returns_reply_only() {
    let broker = MemoryBroker::new();
    let _seen = spawn_core(&broker, accept_all).await;
    let client = client(&broker).await;

    let message = CoreMessage::service_request(
        "s-1",
        "SyndicationService",
        ServiceCall {
            location: None,
            function: "fetchLatest".into(),
            parameters: vec![],
        },
    );
    let reply = client.make_data_request(&message).await.unwrap();
    assert_eq!(reply.data, None);
    assert_eq!(reply.reply.guid, message.guid);
}

#[tokio::test]
async fn test_make_data_request_wrong_message_on_data_channel_is_invalid() {
    let broker = MemoryBroker::new();
    let _seen = spawn_core(&broker, |request| {
        let reply = CoreMessage::reply_to(
            request,
            MessageBody::ServiceResponse {
                status: ResponseStatus::success(),
                has_data: true,
            },
        );
        let stray = CoreMessage::reply_to(
            request,
            MessageBody::KillSessionResponse(ResponseStatus::success()),
        );
        vec![(DATA, stray), (REPLIES, reply)]
    })
    .await;
    let client = client(&broker).await;

    let result = client
        .invoke("s-1", "SyndicationService", "fetchLatest", [("maxEntries", Value::from(1))])
        .await;
    assert!(matches!(
        result,
        Err(CoreError::Protocol(corebridge_protocol::ProtocolError::InvalidMessage(_)))
    ));
}

// =========================================================================
// Errors
// =========================================================================

#[tokio::test]
async fn test_make_request_maps_error_type_to_variant() {
    let broker = MemoryBroker::new();
    let _seen = spawn_core(&broker, |request| {
        let fault = fault(ErrorType::Validation, "who.missing");
        let reply = CoreMessage::reply_to(
            request,
            MessageBody::ServiceResponse {
                status: ResponseStatus::failure(&fault),
                has_data: false,
            },
        );
        vec![(REPLIES, reply)]
    })
    .await;
    let client = client(&broker).await;

    let err = client
        .invoke("s-1", "Greeter", "greet", Vec::<(&str, Value)>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(err.code(), "who.missing");
    assert!(!broker.queue_exists("core.core-client.s-1"));
}

#[tokio::test]
async fn test_make_request_error_code_without_type_is_system_error() {
    let broker = MemoryBroker::new();
    let _seen = spawn_core(&broker, |request| {
        let status = ResponseStatus {
            successful: true,
            error_code: Some("core.down".into()),
            ..ResponseStatus::default()
        };
        vec![(REPLIES, CoreMessage::reply_to(request, MessageBody::InitiateSessionResponse(status)))]
    })
    .await;
    let client = client(&broker).await;

    let err = client.initiate_session("s-1").await.unwrap_err();
    assert!(matches!(err, CoreError::System(_)));
    assert!(!client.is_active("s-1"));
}

#[tokio::test(start_paused = true)]
async fn test_make_request_timeout_is_no_response_and_releases_receiver() {
    let broker = MemoryBroker::new();
    let client = CoreClientBuilder::new()
        .timeout(Duration::from_millis(200))
        .connect(broker.connect(), registry())
        .await
        .unwrap();

    let err = client.initiate_session("s-1").await.unwrap_err();
    assert!(matches!(err, CoreError::NoResponse));
    assert_eq!(broker.consumer_count("core.core-client.s-1"), 0);
    assert!(!broker.queue_exists("core.core-client.s-1"));
}

#[tokio::test(start_paused = true)]
async fn test_make_data_request_timeout_releases_both_receivers() {
    let broker = MemoryBroker::new();
    let client = client(&broker).await;

    let err = client
        .invoke("s-1", "SyndicationService", "fetchLatest", [("maxEntries", Value::from(1))])
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NoResponse));
    assert!(!broker.queue_exists("core.core-client.s-1"));
    assert!(!broker.queue_exists("core.data.s-1"));
}

#[tokio::test(start_paused = true)]
async fn test_make_request_deleted_queue_is_queue_deleted() {
    let broker = MemoryBroker::new();
    let client = client(&broker).await;

    let admin = broker.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        admin.delete_queue("core.core-client.s-1");
    });

    let err = client.initiate_session("s-1").await.unwrap_err();
    assert!(matches!(err, CoreError::QueueDeleted));
}

#[tokio::test]
async fn test_make_request_without_session_id_sends_nothing() {
    let broker = MemoryBroker::new();
    let mut seen = spawn_core(&broker, accept_all).await;
    let client = client(&broker).await;

    let err = client
        .make_request(&CoreMessage::initiate_session(""))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SessionRequired));

    let err = client
        .invoke("", "Greeter", "greet", Vec::<(&str, Value)>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SessionRequired));
    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn test_invoke_undefined_names_fail_before_sending() {
    let broker = MemoryBroker::new();
    let mut seen = spawn_core(&broker, accept_all).await;
    let client = client(&broker).await;

    let err = client
        .invoke("s-1", "Nope", "greet", Vec::<(&str, Value)>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Schema(SchemaError::UndefinedService(_))));

    let err = client
        .invoke("s-1", "Greeter", "wave", Vec::<(&str, Value)>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Schema(SchemaError::UndefinedFunction { .. })));

    let err = client
        .invoke("s-1", "Greeter", "greet", [("whom", Value::from("x"))])
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Schema(SchemaError::UndefinedParameter { .. })));

    assert!(seen.try_recv().is_err());
}

#[tokio::test]
async fn test_invoke_with_mistyped_argument_is_protocol_error() {
    let broker = MemoryBroker::new();
    let _seen = spawn_core(&broker, accept_all).await;
    let client = client(&broker).await;

    let err = client
        .invoke("s-1", "Greeter", "greet", [("who", Value::from(42))])
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Protocol(_)));
    assert!(!broker.queue_exists("core.core-client.s-1"));
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_session_bookkeeping_follows_initiate_and_end() {
    let broker = MemoryBroker::new();
    let _seen = spawn_core(&broker, accept_all).await;
    let client = client(&broker).await;

    client.initiate_session("s-2").await.unwrap();
    client.initiate_session("s-1").await.unwrap();
    assert_eq!(client.active_sessions(), ["s-1", "s-2"]);

    client
        .invoke("s-1", "Greeter", "greet", [("who", Object::new("Foo").with("name", "Ada"))])
        .await
        .unwrap();
    assert_eq!(client.session("s-1").unwrap().calls, 1);

    client.end_session("s-1").await.unwrap();
    assert!(!client.is_active("s-1"));
    assert!(client.is_active("s-2"));

    client.close().await.unwrap();
    assert!(client.active_sessions().is_empty());
}

#[tokio::test]
async fn test_close_is_idempotent_and_blocks_further_calls() {
    let broker = MemoryBroker::new();
    let client = client(&broker).await;
    assert!(client.is_connected());

    client.close().await.unwrap();
    client.close().await.unwrap();
    assert!(!client.is_connected());

    let err = client.initiate_session("s-1").await.unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));
}

#[tokio::test]
async fn test_concurrent_sessions_get_their_own_replies() {
    let broker = MemoryBroker::new();
    let _seen = spawn_core(&broker, accept_all).await;
    let client = client(&broker).await;

    let (a, b) = tokio::join!(client.initiate_session("s-a"), client.initiate_session("s-b"));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.session_id, "s-a");
    assert_eq!(b.session_id, "s-b");
    assert_ne!(a.guid, b.guid);
}

#[tokio::test]
async fn test_connect_with_config_from_yaml() {
    let config: ClientConfig = serde_yaml::from_str("timeout_ms: 1500\nreply_queue: test.replies\n").unwrap();
    let broker = MemoryBroker::new();
    let client = CoreClient::connect(broker.connect(), registry(), config)
        .await
        .unwrap();
    assert_eq!(client.config().timeout(), Duration::from_millis(1500));
    assert_eq!(client.config().reply_queue, "test.replies");
    assert!(client.registry().resolve_service("Greeter").is_ok());
}

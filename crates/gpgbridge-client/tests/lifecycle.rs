#![cfg(unix)]

mod support;

use std::os::unix::net::UnixStream;
use std::time::Duration;

use gpgbridge_client::{
    init, init_with_stream, ClientConfig, Endpoint, ErrorCode, LifecycleState, OperationKind,
    OperationState, Request, ResultEnvelope,
};
use gpgbridge_transport::IpcStream;
use support::{MockEngine, ScriptedEngine, GOOD_KEY, SILENT_KEY};

fn unprobed() -> ClientConfig {
    ClientConfig::default().with_probe(false)
}

async fn wait_for_state(context: &gpgbridge_client::Context, state: LifecycleState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while context.connection().state() != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("connection should reach the expected state");
}

#[tokio::test]
async fn disconnect_rejects_pending_and_later_calls() {
    let (local, remote) = UnixStream::pair().unwrap();
    let _engine = MockEngine::spawn(remote, ClientConfig::default().max_message_size);
    let context = init_with_stream(IpcStream::from(local), ClientConfig::default())
        .await
        .unwrap();

    let pending = context.encrypt("waiting", SILENT_KEY);
    tokio::time::timeout(Duration::from_secs(5), async {
        while context.connection().pending_operations().first().map(|op| op.state)
            != Some(OperationState::Dispatched)
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("operation should be dispatched");

    context.connection().disconnect();
    assert_eq!(context.connection().state(), LifecycleState::Closed);
    assert_eq!(pending.await.unwrap_err().code(), ErrorCode::ConnectionClosed);

    let err = context.encrypt("after", GOOD_KEY).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConnectionClosed);

    context.connection().disconnect();
    assert_eq!(context.connection().state(), LifecycleState::Closed);
}

#[tokio::test]
async fn validation_runs_before_closed_check() {
    let (local, _remote) = UnixStream::pair().unwrap();
    let context = init_with_stream(IpcStream::from(local), unprobed())
        .await
        .unwrap();
    context.connection().disconnect();

    let err = context.encrypt("", GOOD_KEY).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::IncompleteRequest);
}

#[tokio::test]
async fn engine_exit_fails_pending_with_connection_closed() {
    let (local, remote) = UnixStream::pair().unwrap();
    let context = init_with_stream(IpcStream::from(local), unprobed())
        .await
        .unwrap();

    let mut engine = ScriptedEngine::new(remote);
    let pending = context.encrypt("hello", GOOD_KEY);
    let (_op_id, envelope) = engine.read_request();
    assert!(matches!(envelope.request, Request::Encrypt { .. }));
    drop(engine);

    assert_eq!(pending.await.unwrap_err().code(), ErrorCode::ConnectionClosed);
    wait_for_state(&context, LifecycleState::Closed).await;

    let err = context.version().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConnectionClosed);
}

#[tokio::test]
async fn unreachable_socket_is_connection_error() {
    let dir = support::unique_temp_dir("missing");
    let config = ClientConfig::with_endpoint(Endpoint::socket(dir.join("absent.sock")));

    let err = init(config).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConnectionError);
    assert!(err.is_connection_terminal());
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn missing_native_host_is_connection_error() {
    let config =
        ClientConfig::with_endpoint(Endpoint::native_host("/nonexistent/gpgbridge-engine"));
    let err = init(config).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConnectionError);
}

#[tokio::test]
async fn invalid_configuration_is_connection_error() {
    let config = ClientConfig::default().with_max_payload_size(0);
    let err = init(config).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConnectionError);
}

#[tokio::test]
async fn silent_engine_fails_probe() {
    let (local, _remote) = UnixStream::pair().unwrap();
    let config = ClientConfig::default().with_connect_timeout(Duration::from_millis(100));

    let err = init_with_stream(IpcStream::from(local), config)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConnectionError);
    assert!(err.to_string().contains("did not answer"));
}

#[tokio::test]
async fn echoing_host_fails_probe_with_connection_error() {
    // `cat` echoes the request back, which is not a valid result envelope.
    let config = ClientConfig::with_endpoint(Endpoint::native_host("cat"))
        .with_connect_timeout(Duration::from_secs(5));

    let err = init(config).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConnectionError);
    assert!(err.to_string().contains("probe failed"));
}

#[tokio::test]
async fn socket_endpoint_round_trip() {
    let dir = support::unique_temp_dir("socket");
    let path = dir.join("engine.sock");
    let engine = MockEngine::listen(&path, ClientConfig::default().max_message_size);

    let context = init(ClientConfig::with_endpoint(Endpoint::socket(&path)))
        .await
        .unwrap();
    assert_eq!(context.connection().transport_name(), "unix-domain-socket");
    let answer = context.encrypt("over a socket", GOOD_KEY).await.unwrap();
    assert!(answer.data.contains("BEGIN PGP MESSAGE"));
    assert_eq!(engine.requests(), 2);

    context.connection().disconnect();
    engine.join();
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn sequence_gap_is_protocol_violation_and_connection_survives() {
    let (local, remote) = UnixStream::pair().unwrap();
    let context = init_with_stream(IpcStream::from(local), unprobed())
        .await
        .unwrap();
    let mut engine = ScriptedEngine::new(remote);

    let pending = context.encrypt("first", GOOD_KEY);
    let (op_id, _) = engine.read_request();
    engine.send_chunk(op_id, 0, false, b"part");
    engine.send_chunk(op_id, 2, true, b"skipped one");
    assert_eq!(pending.await.unwrap_err().code(), ErrorCode::ProtocolViolation);
    assert!(context.connection().is_open());

    let pending = context.decrypt("second");
    let (op_id, _) = engine.read_request();
    engine.respond(op_id, &ResultEnvelope::ok("plain"));
    assert_eq!(pending.await.unwrap().text(), Some("plain"));
}

#[tokio::test]
async fn bad_result_envelope_is_protocol_violation() {
    let (local, remote) = UnixStream::pair().unwrap();
    let context = init_with_stream(IpcStream::from(local), unprobed())
        .await
        .unwrap();
    let mut engine = ScriptedEngine::new(remote);

    let pending = context.sign("text", GOOD_KEY, Default::default());
    let (op_id, _) = engine.read_request();
    engine.send_chunk(op_id, 0, true, b"\x02\x00\x00\x00{}");
    assert_eq!(pending.await.unwrap_err().code(), ErrorCode::ProtocolViolation);
}

#[tokio::test]
async fn unmatched_and_garbage_messages_are_dropped() {
    let (local, remote) = UnixStream::pair().unwrap();
    let context = init_with_stream(IpcStream::from(local), unprobed())
        .await
        .unwrap();
    let mut engine = ScriptedEngine::new(remote);

    let pending = context.version();
    let (op_id, envelope) = engine.read_request();
    assert_eq!(envelope.request, Request::Version);

    engine.respond(op_id + 1000, &ResultEnvelope::ok("stray"));
    engine.send_raw(b"not a chunk");
    engine.respond(
        op_id,
        &ResultEnvelope::ok(r#"{"name":"scripted","version":"0.1"}"#),
    );

    let info = pending.await.unwrap();
    assert_eq!(info.name, "scripted");
    assert!(context.connection().is_open());
}

#[tokio::test]
async fn duplicate_response_after_completion_is_ignored() {
    let (local, remote) = UnixStream::pair().unwrap();
    let context = init_with_stream(IpcStream::from(local), unprobed())
        .await
        .unwrap();
    let mut engine = ScriptedEngine::new(remote);

    let pending = context.decrypt("one");
    let (first, _) = engine.read_request();
    engine.respond(first, &ResultEnvelope::ok("1"));
    engine.respond(first, &ResultEnvelope::ok("again"));
    assert_eq!(pending.await.unwrap().text(), Some("1"));

    let pending = context.decrypt("two");
    let (second, _) = engine.read_request();
    assert!(second > first);
    engine.respond(second, &ResultEnvelope::ok("2"));
    assert_eq!(pending.await.unwrap().text(), Some("2"));
}

#[tokio::test]
async fn pending_operations_are_observable() {
    let (local, remote) = UnixStream::pair().unwrap();
    let context = init_with_stream(IpcStream::from(local), unprobed())
        .await
        .unwrap();
    let mut engine = ScriptedEngine::new(remote);

    let pending = context.encrypt("hello", GOOD_KEY);
    let (op_id, _) = engine.read_request();
    engine.send_chunk(op_id, 0, false, b"partial");

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let ops = context.connection().pending_operations();
            if ops.first().map(|op| op.state) == Some(OperationState::Streaming) {
                assert_eq!(ops[0].kind, OperationKind::Encrypt);
                assert_eq!(ops[0].id.get(), op_id);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("operation should start streaming");

    context.connection().disconnect();
    assert_eq!(pending.await.unwrap_err().code(), ErrorCode::ConnectionClosed);
}

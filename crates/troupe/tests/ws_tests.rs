//! WebSocket session integration tests.
//!
//! These drive a real listener with a real WebSocket client against a
//! scripted completion backend, covering the full dispatch path.

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use troupe_protocol::ServerFrame;

mod common;
use common::{Script, ScriptedBackend, ended, failed, fragment, spawn_server, started};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect and consume the connection confirmation frame.
async fn connect(addr: SocketAddr) -> Socket {
    let (mut socket, _) = connect_async(format!("ws://{addr}/api/ws")).await.unwrap();
    let frame = next_frame(&mut socket).await;
    assert!(matches!(frame, ServerFrame::Connected { .. }));
    socket
}

async fn next_frame(socket: &mut Socket) -> ServerFrame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket closed")
            .expect("transport error");
        match msg {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("unparseable frame");
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

async fn send_raw(socket: &mut Socket, json: &str) {
    socket
        .send(Message::Text(json.to_string().into()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_connected_frame_sent_on_accept() {
    let addr = spawn_server(ScriptedBackend::new(vec![])).await;
    let (mut socket, _) = connect_async(format!("ws://{addr}/api/ws")).await.unwrap();

    let frame = next_frame(&mut socket).await;
    assert_eq!(
        frame,
        ServerFrame::Connected {
            content: "Successfully connected to agent server".to_string()
        }
    );
}

#[tokio::test]
async fn test_full_stream_scenario() {
    let backend = ScriptedBackend::new(vec![Script::new(vec![
        started("m1"),
        fragment("m1", "Here"),
        fragment("m1", " is the code"),
        ended("m1"),
    ])]);
    let addr = spawn_server(backend).await;
    let mut socket = connect(addr).await;

    send_raw(
        &mut socket,
        r#"{"type":"frontend","content":"Build a button component"}"#,
    )
    .await;

    assert_eq!(
        next_frame(&mut socket).await,
        ServerFrame::StreamStart {
            message_id: "m1".into()
        }
    );
    assert_eq!(
        next_frame(&mut socket).await,
        ServerFrame::StreamChunk {
            message_id: "m1".into(),
            content: "Here".into()
        }
    );
    assert_eq!(
        next_frame(&mut socket).await,
        ServerFrame::StreamChunk {
            message_id: "m1".into(),
            content: " is the code".into()
        }
    );
    assert_eq!(
        next_frame(&mut socket).await,
        ServerFrame::StreamEnd {
            message_id: "m1".into()
        }
    );
}

#[tokio::test]
async fn test_unknown_agent_yields_single_error_and_session_survives() {
    let backend = ScriptedBackend::new(vec![Script::new(vec![started("m1"), ended("m1")])]);
    let addr = spawn_server(backend).await;
    let mut socket = connect(addr).await;

    send_raw(&mut socket, r#"{"type":"unknown_agent","content":"hi"}"#).await;
    assert_eq!(
        next_frame(&mut socket).await,
        ServerFrame::Error {
            content: "Unknown message type".into()
        }
    );

    // The session remains usable: the very next frame for a valid request is
    // its stream_start, so no stray frames followed the error.
    send_raw(&mut socket, r#"{"type":"backend","content":"hello"}"#).await;
    assert_eq!(
        next_frame(&mut socket).await,
        ServerFrame::StreamStart {
            message_id: "m1".into()
        }
    );
    assert_eq!(
        next_frame(&mut socket).await,
        ServerFrame::StreamEnd {
            message_id: "m1".into()
        }
    );
}

#[tokio::test]
async fn test_malformed_frame_recovery() {
    let backend = ScriptedBackend::new(vec![Script::new(vec![started("m1"), ended("m1")])]);
    let addr = spawn_server(backend).await;
    let mut socket = connect(addr).await;

    send_raw(&mut socket, "this is not json").await;
    assert_eq!(
        next_frame(&mut socket).await,
        ServerFrame::Error {
            content: "Invalid message format".into()
        }
    );

    send_raw(&mut socket, r#"{"type":"design","content":"hello"}"#).await;
    assert!(matches!(
        next_frame(&mut socket).await,
        ServerFrame::StreamStart { .. }
    ));
}

#[tokio::test]
async fn test_empty_content_rejected() {
    let addr = spawn_server(ScriptedBackend::new(vec![])).await;
    let mut socket = connect(addr).await;

    send_raw(&mut socket, r#"{"type":"frontend","content":"   "}"#).await;
    assert_eq!(
        next_frame(&mut socket).await,
        ServerFrame::Error {
            content: "Invalid message format".into()
        }
    );
}

#[tokio::test]
async fn test_provider_failure_mid_stream() {
    let backend = ScriptedBackend::new(vec![
        Script::new(vec![
            started("m1"),
            fragment("m1", "partial"),
            fragment("m1", " answer"),
            failed("upstream 500"),
        ]),
        Script::new(vec![started("m2"), ended("m2")]),
    ]);
    let addr = spawn_server(backend).await;
    let mut socket = connect(addr).await;

    send_raw(&mut socket, r#"{"type":"fullstack","content":"hi"}"#).await;

    assert!(matches!(
        next_frame(&mut socket).await,
        ServerFrame::StreamStart { .. }
    ));
    assert!(matches!(
        next_frame(&mut socket).await,
        ServerFrame::StreamChunk { .. }
    ));
    assert!(matches!(
        next_frame(&mut socket).await,
        ServerFrame::StreamChunk { .. }
    ));
    // Terminal is an error frame carrying only the generic text.
    assert_eq!(
        next_frame(&mut socket).await,
        ServerFrame::Error {
            content: "Sorry, I encountered an error. Please try again.".into()
        }
    );

    // No further frames for m1 are ever sent: the next frame observed is the
    // second request's stream_start.
    send_raw(&mut socket, r#"{"type":"frontend","content":"again"}"#).await;
    assert_eq!(
        next_frame(&mut socket).await,
        ServerFrame::StreamStart {
            message_id: "m2".into()
        }
    );
}

#[tokio::test]
async fn test_second_request_is_processed_after_first_stream_ends() {
    let backend = ScriptedBackend::new(vec![
        Script::new(vec![started("m1"), fragment("m1", "one"), ended("m1")])
            .with_pre_terminal_delay(Duration::from_millis(200)),
        Script::new(vec![started("m2"), fragment("m2", "two"), ended("m2")]),
    ]);
    let addr = spawn_server(backend).await;
    let mut socket = connect(addr).await;

    // Second request arrives while the first stream is still open.
    send_raw(&mut socket, r#"{"type":"frontend","content":"first"}"#).await;
    send_raw(&mut socket, r#"{"type":"frontend","content":"second"}"#).await;

    let mut order = Vec::new();
    loop {
        let frame = next_frame(&mut socket).await;
        let done = matches!(&frame, ServerFrame::StreamEnd { message_id } if message_id == "m2");
        order.push(frame);
        if done {
            break;
        }
    }

    // Every m1 frame strictly precedes every m2 frame.
    let m1_last = order
        .iter()
        .rposition(|f| f.message_id() == Some("m1"))
        .unwrap();
    let m2_first = order
        .iter()
        .position(|f| f.message_id() == Some("m2"))
        .unwrap();
    assert!(
        m1_last < m2_first,
        "interleaved streams: {order:?}"
    );
}

#[tokio::test]
async fn test_reserved_subprotocol_rejected() {
    let addr = spawn_server(ScriptedBackend::new(vec![])).await;

    let mut request = format!("ws://{addr}/api/ws").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", "vite-hmr".parse().unwrap());

    let err = connect_async(request).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status().as_u16(), 403);
        }
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_status_counts_active_connections() {
    let addr = spawn_server(ScriptedBackend::new(vec![])).await;
    let _socket = connect(addr).await;

    let status: serde_json::Value = reqwest::get(format!("http://{addr}/api/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["active_connections"], 1);
}

//! Integration tests for `RconClient` against an in-process fake server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::future::join_all;
use rcon::prelude::*;
use rcon::{ProtocolError, TransportError};
use rcon_protocol::{AUTH_ID, Inbound, PacketType, RconCodec, TERMINATOR_ID, encode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Decoder;

const PASSWORD: &str = "secret";
const WAIT: Duration = Duration::from_secs(5);

// =========================================================================
// Fake server
// =========================================================================

/// How the fake server answers.
#[derive(Clone, Default)]
struct Script {
    password: String,
    /// Command text → response fragments, sent as separate frames.
    responses: HashMap<String, Vec<String>>,
    /// Ignore auth requests entirely.
    never_auth: bool,
    /// Stop answering on this connection once this command arrives.
    stall_on: Option<String>,
    /// Follow this command's answer with a bad-length frame and never
    /// echo its terminator, as if the echo had been lost.
    corrupt_after: Option<String>,
}

impl Script {
    fn new() -> Self {
        Self {
            password: PASSWORD.to_string(),
            ..Self::default()
        }
    }

    fn respond(mut self, command: &str, fragments: &[&str]) -> Self {
        self.responses.insert(
            command.to_string(),
            fragments.iter().map(|f| f.to_string()).collect(),
        );
        self
    }

    fn stall_on(mut self, command: &str) -> Self {
        self.stall_on = Some(command.to_string());
        self
    }

    fn corrupt_after(mut self, command: &str) -> Self {
        self.corrupt_after = Some(command.to_string());
        self
    }

    fn never_auth(mut self) -> Self {
        self.never_auth = true;
        self
    }
}

/// Things a test can make the server do on the current connection.
enum Control {
    /// Send a server-push frame.
    Push(String),
    /// Write raw bytes.
    Raw(Vec<u8>),
    /// Drop the connection.
    Drop,
}

struct FakeServer {
    addr: SocketAddr,
    control: mpsc::UnboundedSender<Control>,
    /// Bodies of non-empty commands, in arrival order.
    received: mpsc::UnboundedReceiver<String>,
}

impl FakeServer {
    async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();
        let (received_tx, received_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            // One client connection at a time, like the real server sees
            // from a single client.
            while let Ok((stream, _)) = listener.accept().await {
                serve(stream, &script, &mut control_rx, &received_tx).await;
            }
        });

        Self {
            addr,
            control: control_tx,
            received: received_rx,
        }
    }

    fn client(&self) -> RconClientBuilder {
        RconClient::builder()
            .host("127.0.0.1")
            .port(self.addr.port())
            .password(PASSWORD)
            .ping_interval(Duration::ZERO)
            .auto_reconnect(false)
            .command_timeout(Some(WAIT))
            .connect_timeout(WAIT)
    }

    fn send(&self, control: Control) {
        self.control.send(control).unwrap();
    }

    async fn next_received(&mut self) -> String {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("server received a command in time")
            .expect("server is running")
    }
}

async fn serve(
    mut stream: TcpStream,
    script: &Script,
    control: &mut mpsc::UnboundedReceiver<Control>,
    received: &mpsc::UnboundedSender<String>,
) {
    let mut codec = RconCodec::new();
    let mut buf = BytesMut::new();
    let mut stalled = false;
    let mut drop_next_terminator = false;

    loop {
        tokio::select! {
            read = stream.read_buf(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                let mut out = BytesMut::new();
                while let Ok(Some(item)) = codec.decode(&mut buf) {
                    let Inbound::Frame(frame) = item else { continue };
                    if stalled {
                        continue;
                    }
                    match frame.packet_type {
                        PacketType::Auth if script.never_auth => {}
                        PacketType::Auth if frame.body == script.password => {
                            out.extend_from_slice(&encode(PacketType::Response, AUTH_ID, "").unwrap());
                            out.extend_from_slice(&encode(PacketType::Command, AUTH_ID, "").unwrap());
                        }
                        PacketType::Auth => {
                            out.extend_from_slice(&encode(PacketType::Command, -1, "").unwrap());
                        }
                        PacketType::Command
                            if frame.body.is_empty() && frame.id == TERMINATOR_ID && drop_next_terminator =>
                        {
                            drop_next_terminator = false;
                        }
                        // Terminators and keep-alives are echoed back empty.
                        PacketType::Command if frame.body.is_empty() => {
                            out.extend_from_slice(&encode(PacketType::Response, frame.id, "").unwrap());
                        }
                        PacketType::Command => {
                            let _ = received.send(frame.body.clone());
                            if script.stall_on.as_deref() == Some(frame.body.as_str()) {
                                stalled = true;
                                continue;
                            }
                            for fragment in script.responses.get(&frame.body).into_iter().flatten() {
                                out.extend_from_slice(
                                    &encode(PacketType::Response, frame.id, fragment).unwrap(),
                                );
                            }
                            if script.corrupt_after.as_deref() == Some(frame.body.as_str()) {
                                out.extend_from_slice(&bad_length_frame());
                                drop_next_terminator = true;
                            }
                        }
                        _ => {}
                    }
                }
                if !out.is_empty() && stream.write_all(&out).await.is_err() {
                    return;
                }
            }
            Some(command) = control.recv() => {
                let bytes = match command {
                    Control::Push(line) => encode(PacketType::ServerPush, 0, &line).unwrap().to_vec(),
                    Control::Raw(bytes) => bytes,
                    Control::Drop => return,
                };
                if stream.write_all(&bytes).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// A frame whose length field (9) is below the minimum.
fn bad_length_frame() -> Vec<u8> {
    let mut raw = 9i32.to_le_bytes().to_vec();
    raw.extend_from_slice(&[0; 10]);
    raw
}

// =========================================================================
// Helpers
// =========================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Waits for the first event that `pred` accepts, skipping the rest.
async fn next_matching(
    events: &mut broadcast::Receiver<RconEvent>,
    pred: impl Fn(&RconEvent) -> bool,
) -> RconEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("expected event in time")
}

const CHAT_LINE: &str = "[ChatAll] [SteamID:76561197960287930] PlayerOne : hello world";

// =========================================================================
// Commands
// =========================================================================

#[tokio::test]
async fn test_execute_returns_concatenated_fragments() {
    init_tracing();
    let server = FakeServer::start(
        Script::new().respond("ShowCurrentMap", &["Current level is Narva, ", "layer is Narva_RAAS_v1"]),
    )
    .await;
    let client = server.client().connect().await.unwrap();
    assert_eq!(client.status().state, ConnectionState::Ready);

    let body = client.execute("ShowCurrentMap").await.unwrap();
    assert_eq!(body, "Current level is Narva, layer is Narva_RAAS_v1");

    let map = client.current_map().await.unwrap();
    assert_eq!(map.level.as_deref(), Some("Narva"));
    assert_eq!(map.layer.as_deref(), Some("Narva_RAAS_v1"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_execute_command_without_output_resolves_empty() {
    let server = FakeServer::start(Script::new()).await;
    let client = server.client().connect().await.unwrap();

    assert_eq!(client.execute("AdminBroadcast hi").await.unwrap(), "");

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_commands_resolve_in_order() {
    let server = FakeServer::start(
        Script::new()
            .respond("A", &["a1", "a2"])
            .respond("B", &["b1"])
            .respond("C", &["c1", "c2", "c3"]),
    )
    .await;
    let client = server.client().connect().await.unwrap();

    let results = join_all([
        client.execute("A"),
        client.execute("B"),
        client.execute("C"),
    ])
    .await;
    let bodies: Vec<String> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(bodies, ["a1a2", "b1", "c1c2c3"]);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_list_players_publishes_event() {
    let server = FakeServer::start(Script::new().respond(
        "ListPlayers",
        &["----- Active Players -----\n\
           ID: 0 | SteamID: 76561197960287930 | Name: Alpha | Team ID: 1 | Squad ID: N/A | Is Leader: False | Role: USA_Rifleman\n"],
    ))
    .await;
    let client = server.client().connect().await.unwrap();
    let mut events = client.subscribe();

    let players = client.list_players().await.unwrap();
    assert_eq!(players.len(), 1);
    assert_eq!(players[0].name, "Alpha");

    let event = next_matching(&mut events, |e| matches!(e, RconEvent::PlayersListed(_))).await;
    let RconEvent::PlayersListed(listed) = event else {
        unreachable!()
    };
    assert_eq!(listed, players);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_command_timeout() {
    let server = FakeServer::start(Script::new().stall_on("Slow")).await;
    let client = server
        .client()
        .command_timeout(Some(Duration::from_millis(200)))
        .connect()
        .await
        .unwrap();

    let err = client.execute("Slow").await.unwrap_err();
    assert_eq!(err.as_session(), Some(&SessionError::CommandTimeout));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_oversized_command_is_rejected_locally() {
    let server = FakeServer::start(Script::new()).await;
    let client = server.client().connect().await.unwrap();

    let err = client.execute(&"x".repeat(10_000)).await.unwrap_err();
    assert!(matches!(err, RconError::Protocol(ProtocolError::BodyTooLarge { .. })));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_execute_before_ready_is_not_connected() {
    let server = FakeServer::start(Script::new().never_auth()).await;
    let client = server.client().spawn().unwrap();

    let err = client.execute("ListPlayers").await.unwrap_err();
    assert_eq!(err.as_session(), Some(&SessionError::NotConnected));

    client.close().await.unwrap();
}

// =========================================================================
// Push events
// =========================================================================

#[tokio::test]
async fn test_chat_reaches_subscribers() {
    let server = FakeServer::start(Script::new()).await;
    let client = server.client().connect().await.unwrap();
    let mut events = client.subscribe();

    server.send(Control::Push(CHAT_LINE.to_string()));

    let event = next_matching(&mut events, |e| matches!(e, RconEvent::Chat(_))).await;
    let RconEvent::Chat(msg) = event else {
        unreachable!()
    };
    assert_eq!(msg.channel, ChatChannel::ChatAll);
    assert_eq!(msg.player_name, "PlayerOne");
    assert_eq!(msg.message, "hello world");

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_chat_reaches_callbacks() {
    let server = FakeServer::start(Script::new()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let callbacks = EventCallbacks::new().on_chat(move |msg| {
        let _ = tx.send(msg.message.clone());
    });
    let client = server.client().callbacks(callbacks).connect().await.unwrap();

    server.send(Control::Push(CHAT_LINE.to_string()));

    let message = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(message, "hello world");

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_bad_packet_is_reported_and_stream_recovers() {
    let server =
        FakeServer::start(Script::new().respond("ShowNextMap", &["Next level is Gorodok, layer is Gorodok_AAS_v1"]))
            .await;
    let client = server.client().connect().await.unwrap();
    let mut events = client.subscribe();

    server.send(Control::Raw(bad_length_frame()));

    let event = next_matching(&mut events, |e| matches!(e, RconEvent::Error(_))).await;
    let RconEvent::Error(err) = event else {
        unreachable!()
    };
    assert!(matches!(*err, RconError::Protocol(ProtocolError::BadPacket(_))));

    let map = client.next_map().await.unwrap();
    assert_eq!(map.level.as_deref(), Some("Gorodok"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_bad_packet_during_command_keeps_later_commands_in_order() {
    init_tracing();
    let server = FakeServer::start(
        Script::new()
            .respond("A", &["a"])
            .corrupt_after("A")
            .respond("B", &["b"])
            .respond("C", &["c"]),
    )
    .await;
    let client = server.client().connect().await.unwrap();

    let err = client.execute("A").await.unwrap_err();
    assert_eq!(err.as_session(), Some(&SessionError::ProtocolDesync));

    assert_eq!(client.execute("B").await.unwrap(), "b");
    assert_eq!(client.execute("C").await.unwrap(), "c");
    assert_eq!(client.status().state, ConnectionState::Ready);

    client.close().await.unwrap();
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_wrong_password_fails_connect() {
    let server = FakeServer::start(Script::new()).await;
    let err = server
        .client()
        .password("wrong")
        .connect()
        .await
        .unwrap_err();
    assert_eq!(err.as_session(), Some(&SessionError::AuthenticationFailed));
}

#[test]
fn test_invalid_config_is_rejected() {
    let err = RconClient::builder().port(21114).password(PASSWORD).spawn().unwrap_err();
    assert!(matches!(err, RconError::Config(_)));
}

#[tokio::test]
async fn test_unreachable_server_fails_connect() {
    // Bind then drop to get a port nobody is listening on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = RconClient::builder()
        .host("127.0.0.1")
        .port(port)
        .password(PASSWORD)
        .auto_reconnect(false)
        .connect()
        .await
        .unwrap_err();
    assert!(matches!(err.as_session(), Some(SessionError::ConnectionLost(_))));
}

#[tokio::test]
async fn test_close_is_idempotent_and_rejects_later_commands() {
    let server = FakeServer::start(Script::new()).await;
    let client = server.client().connect().await.unwrap();
    let other = client.clone();

    client.close().await.unwrap();
    client.close().await.unwrap();
    other.close().await.unwrap();

    assert_eq!(client.status().state, ConnectionState::Closing);
    let err = other.execute("ListPlayers").await.unwrap_err();
    assert_eq!(err.as_session(), Some(&SessionError::ConnectionClosed));
}

#[tokio::test]
async fn test_close_rejects_pending_command() {
    let mut server = FakeServer::start(Script::new().stall_on("Hang")).await;
    let client = server.client().connect().await.unwrap();

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.execute("Hang").await }
    });
    assert_eq!(server.next_received().await, "Hang");

    client.close().await.unwrap();
    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err.as_session(), Some(&SessionError::ConnectionClosed));
}

#[tokio::test]
async fn test_disconnect_rejects_pending_command() {
    let mut server = FakeServer::start(Script::new().stall_on("Hang")).await;
    let client = server.client().connect().await.unwrap();
    let mut events = client.subscribe();

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.execute("Hang").await }
    });
    assert_eq!(server.next_received().await, "Hang");

    server.send(Control::Drop);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err.as_session(), Some(SessionError::ConnectionLost(_))));
    next_matching(&mut events, |e| matches!(e, RconEvent::Disconnected { .. })).await;

    let status = client.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(!status.reconnecting);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_reconnects_after_server_drop() {
    init_tracing();
    let server = FakeServer::start(Script::new().respond("ShowNextMap", &["Next level is Narva, layer is Narva_AAS_v1"]))
        .await;
    let client = server
        .client()
        .auto_reconnect(true)
        .reconnect_delay(Duration::from_millis(100))
        .connect()
        .await
        .unwrap();
    let mut events = client.subscribe();

    server.send(Control::Drop);

    next_matching(&mut events, |e| matches!(e, RconEvent::Disconnected { .. })).await;
    next_matching(&mut events, |e| matches!(e, RconEvent::Connected)).await;
    client.wait_ready().await.unwrap();

    let map = client.next_map().await.unwrap();
    assert_eq!(map.layer.as_deref(), Some("Narva_AAS_v1"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_keep_alive_does_not_disturb_commands() {
    let server = FakeServer::start(Script::new().respond("A", &["a"])).await;
    let client = server
        .client()
        .ping_interval(Duration::from_millis(20))
        .connect()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.execute("A").await.unwrap(), "a");
    assert_eq!(client.status().state, ConnectionState::Ready);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_transport_error_converts() {
    let err: RconError = TransportError::ConnectTimeout("127.0.0.1:1".into()).into();
    assert!(err.as_session().is_none());
    assert_eq!(err.to_string(), "connect to 127.0.0.1:1 timed out");
}

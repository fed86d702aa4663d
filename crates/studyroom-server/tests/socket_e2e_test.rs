//! End-to-end tests over a real WebSocket connection.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use studyroom_proto::{
    AuthenticatePayload, ClientEvent, ErrorCode, RoomId, RoomPayload, SendMessagePayload,
    ServerEvent, UserId,
};
use studyroom_server::{JwtVerifier, MemoryStorage, Server, ServerRuntimeConfig};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SECRET: &str = "socket-test-secret";
const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Boot a server on an ephemeral port and return its WS URL.
async fn boot_server() -> String {
    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        jwt_secret: SECRET.to_string(),
        ..ServerRuntimeConfig::default()
    };
    let server = Server::bind(config, MemoryStorage::new()).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    format!("ws://{addr}/ws")
}

fn token(user: &str) -> String {
    JwtVerifier::new(SECRET)
        .unwrap()
        .issue(&UserId::new(user), None, Duration::from_secs(600))
        .unwrap()
}

async fn send(ws: &mut WsStream, event: ClientEvent) {
    ws.send(Message::text(event.encode().unwrap())).await.unwrap();
}

async fn recv(ws: &mut WsStream) -> ServerEvent {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return ServerEvent::decode(&text).unwrap();
        }
    }
}

async fn login(url: &str, user: &str) -> WsStream {
    let (mut ws, _) = connect_async(url).await.unwrap();
    send(&mut ws, ClientEvent::Authenticate(AuthenticatePayload { access_token: token(user) }))
        .await;
    assert!(matches!(recv(&mut ws).await, ServerEvent::Authenticated(_)));
    ws
}

fn join(room: &str) -> ClientEvent {
    ClientEvent::JoinRoom(RoomPayload { room_id: RoomId::new(room) })
}

#[tokio::test]
async fn message_round_trip_between_two_clients() {
    let url = boot_server().await;
    let mut alice = login(&url, "alice").await;
    let mut bob = login(&url, "bob").await;

    send(&mut alice, join("g1")).await;
    assert_eq!(recv(&mut alice).await, ServerEvent::ChatHistory(Vec::new()));
    send(&mut bob, join("g1")).await;
    assert_eq!(recv(&mut bob).await, ServerEvent::ChatHistory(Vec::new()));

    let payload =
        SendMessagePayload { room_id: RoomId::new("g1"), content: "hi bob".to_string() };
    send(&mut alice, ClientEvent::Message(payload)).await;

    let ServerEvent::Message(at_alice) = recv(&mut alice).await else {
        panic!("alice expected message");
    };
    let ServerEvent::Message(at_bob) = recv(&mut bob).await else {
        panic!("bob expected message");
    };
    assert_eq!(at_alice, at_bob);
    assert_eq!(at_bob.sender, UserId::new("alice"));

    send(&mut alice, ClientEvent::DeleteMessage(at_bob.id)).await;
    assert_eq!(recv(&mut bob).await, ServerEvent::MessageDeleted(at_bob.id));
}

#[tokio::test]
async fn invalid_token_closes_socket() {
    let url = boot_server().await;
    let (mut ws, _) = connect_async(&url).await.unwrap();

    let payload = AuthenticatePayload { access_token: "not-a-jwt".to_string() };
    send(&mut ws, ClientEvent::Authenticate(payload)).await;

    let ServerEvent::Error(error) = recv(&mut ws).await else {
        panic!("expected error reply");
    };
    assert_eq!(error.code, ErrorCode::InvalidToken);

    let closed = timeout(TIMEOUT, async {
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                return true;
            }
        }
        true
    })
    .await
    .expect("socket should close");
    assert!(closed);
}

#[tokio::test]
async fn malformed_frame_gets_error_and_connection_survives() {
    let url = boot_server().await;
    let mut ws = login(&url, "alice").await;

    ws.send(Message::text("{not json")).await.unwrap();
    let ServerEvent::Error(error) = recv(&mut ws).await else {
        panic!("expected error reply");
    };
    assert_eq!(error.code, ErrorCode::InvalidPayload);

    send(&mut ws, join("g1")).await;
    assert_eq!(recv(&mut ws).await, ServerEvent::ChatHistory(Vec::new()));
}

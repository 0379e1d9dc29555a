use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};

use crate::ws::events::ChatEvent;
use crate::ws::state::RelayState;

/// Accept loop for the relay listener. Each connection gets its own task.
pub async fn run_relay(listener: TcpListener, state: Arc<RelayState>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    match tokio_tungstenite::accept_async(stream).await {
                        Ok(ws_stream) => handle_connection(ws_stream, state).await,
                        Err(e) => warn!("WebSocket handshake failed for {}: {}", addr, e),
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept relay connection: {}", e);
            }
        }
    }
}

/// Handle a single relay connection until the peer disconnects.
pub async fn handle_connection(ws_stream: WebSocketStream<TcpStream>, state: Arc<RelayState>) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn_id = state.register(tx.clone());

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Read error on connection {}: {}", conn_id, e);
                break;
            }
        };

        match frame {
            Message::Text(text) => match serde_json::from_str::<ChatEvent>(&text) {
                Ok(event) => handle_event(conn_id, event, &state, &tx),
                Err(e) => {
                    send_event(&tx, &ChatEvent::Error {
                        message: format!("Unrecognized event: {}", e),
                    });
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.unregister(conn_id);
    send_task.abort();
    info!(
        "Connection {} closed ({} still connected)",
        conn_id,
        state.connection_count()
    );
}

fn handle_event(
    conn_id: u64,
    event: ChatEvent,
    state: &RelayState,
    tx: &mpsc::UnboundedSender<String>,
) {
    match event {
        ChatEvent::JoinRoom { room, user_id } => {
            info!("Connection {} joined room {} as {}", conn_id, room, user_id);
            state.join_room(conn_id, room, user_id);
        }
        ChatEvent::SendMessage { room, message } => {
            if state.room_of(conn_id).as_deref() != Some(room.as_str()) {
                send_event(tx, &ChatEvent::Error {
                    message: "Join the room before sending".to_string(),
                });
                return;
            }
            let out = ChatEvent::ReceiveMessage {
                room: room.clone(),
                message,
            };
            broadcast(state, &room, conn_id, &out);
        }
        ChatEvent::TypingStart { room, user_id } => {
            if state.room_of(conn_id).as_deref() == Some(room.as_str()) {
                let out = ChatEvent::TypingStart {
                    room: room.clone(),
                    user_id,
                };
                broadcast(state, &room, conn_id, &out);
            }
        }
        ChatEvent::TypingStop { room, user_id } => {
            if state.room_of(conn_id).as_deref() == Some(room.as_str()) {
                let out = ChatEvent::TypingStop {
                    room: room.clone(),
                    user_id,
                };
                broadcast(state, &room, conn_id, &out);
            }
        }
        // server-to-client events; clients sending them are ignored
        ChatEvent::ReceiveMessage { .. } | ChatEvent::Error { .. } => {}
    }
}

fn broadcast(state: &RelayState, room: &str, exclude_conn: u64, event: &ChatEvent) {
    match serde_json::to_string(event) {
        Ok(json) => state.broadcast_to_room(room, exclude_conn, &json),
        Err(e) => error!("Failed to serialize relay event: {}", e),
    }
}

fn send_event(tx: &mpsc::UnboundedSender<String>, event: &ChatEvent) {
    if let Ok(json) = serde_json::to_string(event) {
        let _ = tx.send(json);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_tungstenite::{connect_async, MaybeTlsStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start_relay() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(RelayState::new());
        tokio::spawn(run_relay(listener, state));
        tokio::time::sleep(Duration::from_millis(50)).await;
        port
    }

    async fn connect(port: u16) -> Client {
        let (ws, _) = connect_async(format!("ws://127.0.0.1:{}", port))
            .await
            .expect("Failed to connect");
        ws
    }

    async fn send_json(client: &mut Client, value: serde_json::Value) {
        client
            .send(Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    async fn join(client: &mut Client, room: &str, user_id: &str) {
        send_json(
            client,
            json!({ "event": "join_room", "room": room, "user_id": user_id }),
        )
        .await;
        // join has no ack; give the relay a moment to process it
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    async fn next_json(client: &mut Client) -> serde_json::Value {
        loop {
            let frame = timeout(Duration::from_secs(5), client.next())
                .await
                .expect("Timed out waiting for frame")
                .expect("Stream closed")
                .expect("Read error");
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn assert_silent(client: &mut Client) {
        let result = timeout(Duration::from_millis(300), client.next()).await;
        assert!(result.is_err(), "expected no frame, got {:?}", result);
    }

    #[tokio::test]
    async fn message_is_relayed_to_the_other_room_member() {
        let port = start_relay().await;
        let mut alice = connect(port).await;
        let mut bob = connect(port).await;

        join(&mut alice, "u1_u2", "u1").await;
        join(&mut bob, "u1_u2", "u2").await;

        send_json(
            &mut alice,
            json!({
                "event": "send_message",
                "room": "u1_u2",
                "message": { "content": "Hi", "sender": "u1" }
            }),
        )
        .await;

        let received = next_json(&mut bob).await;
        assert_eq!(received["event"], "receive_message");
        assert_eq!(received["room"], "u1_u2");
        assert_eq!(received["message"]["content"], "Hi");
    }

    #[tokio::test]
    async fn sender_does_not_receive_its_own_message() {
        let port = start_relay().await;
        let mut alice = connect(port).await;
        let mut bob = connect(port).await;

        join(&mut alice, "u1_u2", "u1").await;
        join(&mut bob, "u1_u2", "u2").await;

        send_json(
            &mut alice,
            json!({
                "event": "send_message",
                "room": "u1_u2",
                "message": { "content": "Hi" }
            }),
        )
        .await;

        assert_silent(&mut alice).await;
    }

    #[tokio::test]
    async fn other_rooms_are_not_disturbed() {
        let port = start_relay().await;
        let mut alice = connect(port).await;
        let mut bob = connect(port).await;
        let mut carol = connect(port).await;

        join(&mut alice, "u1_u2", "u1").await;
        join(&mut bob, "u1_u2", "u2").await;
        join(&mut carol, "u3_u4", "u3").await;

        send_json(
            &mut alice,
            json!({
                "event": "send_message",
                "room": "u1_u2",
                "message": { "content": "private" }
            }),
        )
        .await;

        let received = next_json(&mut bob).await;
        assert_eq!(received["event"], "receive_message");
        assert_silent(&mut carol).await;
    }

    #[tokio::test]
    async fn typing_events_are_relayed() {
        let port = start_relay().await;
        let mut alice = connect(port).await;
        let mut bob = connect(port).await;

        join(&mut alice, "u1_u2", "u1").await;
        join(&mut bob, "u1_u2", "u2").await;

        send_json(
            &mut alice,
            json!({ "event": "typing_start", "room": "u1_u2", "user_id": "u1" }),
        )
        .await;

        let received = next_json(&mut bob).await;
        assert_eq!(received["event"], "typing_start");
        assert_eq!(received["user_id"], "u1");

        send_json(
            &mut alice,
            json!({ "event": "typing_stop", "room": "u1_u2", "user_id": "u1" }),
        )
        .await;

        let received = next_json(&mut bob).await;
        assert_eq!(received["event"], "typing_stop");
    }

    #[tokio::test]
    async fn sending_without_joining_returns_an_error_event() {
        let port = start_relay().await;
        let mut alice = connect(port).await;

        send_json(
            &mut alice,
            json!({
                "event": "send_message",
                "room": "u1_u2",
                "message": { "content": "Hi" }
            }),
        )
        .await;

        let received = next_json(&mut alice).await;
        assert_eq!(received["event"], "error");
    }

    #[tokio::test]
    async fn malformed_event_returns_an_error_event() {
        let port = start_relay().await;
        let mut alice = connect(port).await;

        alice
            .send(Message::Text("not json at all".to_string().into()))
            .await
            .unwrap();

        let received = next_json(&mut alice).await;
        assert_eq!(received["event"], "error");
    }
}

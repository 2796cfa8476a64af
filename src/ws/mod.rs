//! WebSocket transport: one task per connection, with an unbounded channel
//! as the outbound side so game logic never blocks on a slow socket.

pub mod handlers;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::ConnId;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn: ConnId = ulid::Ulid::new().to_string();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.register_conn(conn.clone(), tx).await;
    tracing::debug!(%conn, "websocket connected");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(msg) = outbound else { break };
                let Ok(text) = serde_json::to_string(&msg) else { continue };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => {
                                if let Some(reply) =
                                    handlers::handle_message(msg, &conn, &state).await
                                {
                                    state.send_to(&conn, reply).await;
                                }
                            }
                            Err(e) => {
                                tracing::debug!(%conn, error = %e, "unparseable client message");
                                state
                                    .send_to(
                                        &conn,
                                        ServerMessage::ErrorMessage {
                                            message: "Invalid message.".to_string(),
                                        },
                                    )
                                    .await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(%conn, error = %e, "websocket error");
                        break;
                    }
                }
            }
        }
    }

    state.unregister_conn(&conn).await;
    state.handle_disconnect(&conn).await;
    tracing::debug!(%conn, "websocket disconnected");
}

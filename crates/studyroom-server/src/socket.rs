//! Per-connection WebSocket loop.
//!
//! Each socket gets a fresh session id, a bounded outbound channel drained
//! by a writer task, and a read loop that hands frames to the gateway one at
//! a time. A frame's actions are executed before the next frame is read, so
//! one connection's events are handled strictly in arrival order.

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::{
    AppState,
    dispatcher::Outbound,
    gateway::GatewayEvent,
    storage::MessageStore,
};

/// How long a closing connection's writer may take to flush.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Drive one WebSocket connection until either side closes it.
pub(crate) async fn run_socket<S: MessageStore>(socket: WebSocket, state: AppState<S>) {
    let session_id = state.allocate_session_id();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(state.outbound_capacity);

    state.dispatcher.register(session_id, tx).await;

    let opened = state.gateway.process_event(GatewayEvent::ConnectionOpened { session_id }).await;
    let refused = match opened {
        Ok(actions) => state.dispatcher.execute(actions).await.contains(&session_id),
        Err(e) => {
            tracing::error!(session_id, error = %e, "failed to open session");
            state.dispatcher.unregister(session_id).await;
            return;
        },
    };

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                Outbound::Text(text) => {
                    if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                        break;
                    }
                },
                Outbound::Close(reason) => {
                    let close = CloseFrame { code: close_code::POLICY, reason: reason.into() };
                    if ws_tx.send(Message::Close(Some(close))).await.is_err() {
                        tracing::debug!(session_id, "close frame not delivered");
                    }
                    break;
                },
            }
        }

        if ws_tx.close().await.is_err() {
            tracing::trace!(session_id, "socket already closed");
        }
    });

    let mut writer_done = false;
    while !refused {
        tokio::select! {
            frame = ws_rx.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text.to_string(),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => text,
                        Err(_) => {
                            tracing::debug!(session_id, "dropping non-UTF-8 binary frame");
                            continue;
                        },
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(session_id, error = %e, "read error");
                        break;
                    },
                };

                let event = GatewayEvent::FrameReceived { session_id, text };
                match state.gateway.process_event(event).await {
                    Ok(actions) => {
                        if state.dispatcher.execute(actions).await.contains(&session_id) {
                            break;
                        }
                    },
                    Err(e) => tracing::warn!(session_id, error = %e, "frame processing error"),
                }
            }
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        }
    }

    let closed = GatewayEvent::ConnectionClosed {
        session_id,
        reason: "connection closed".to_string(),
    };
    match state.gateway.process_event(closed).await {
        Ok(actions) => {
            state.dispatcher.execute(actions).await;
        },
        Err(e) => tracing::warn!(session_id, error = %e, "close processing error"),
    }

    state.dispatcher.unregister(session_id).await;

    if !writer_done && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        tracing::debug!(session_id, "writer did not drain in time");
    }
}

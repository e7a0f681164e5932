//! Live game protocol over WebSocket.
//!
//! Each connection is bound to a player id at upgrade time and speaks
//! the tagged-JSON protocol: `join`/`leave`/`place-bet`/`cash-out`
//! inbound, `GameEvent` outbound. Broadcast events and per-connection
//! acks share one outbound queue, so a connection's event stream is
//! ordered; the round loop itself never blocks on a slow socket.

use super::handlers::AppState;
use crate::broadcast::GameEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Inbound client commands.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ClientMessage {
    Join,
    Leave,
    PlaceBet { amount: u64 },
    CashOut { bet_id: u64 },
}

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Stable player id; resolved by the surrounding app's auth layer.
    pub player_id: u64,
}

/// WebSocket endpoint handler.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, params.player_id, state))
}

async fn handle_connection(socket: WebSocket, player_id: u64, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    state.metrics.connected_clients.inc();
    state.ledger.ensure_account(player_id);
    info!(%connection_id, player_id, "🔌 client connected");

    let (mut sink, mut stream) = socket.split();

    // Single outbound queue per connection keeps acks and broadcast
    // events ordered relative to each other.
    let (out_tx, mut out_rx) = mpsc::channel::<GameEvent>(256);

    let writer: JoinHandle<()> = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let message = match serde_json::to_string(&event) {
                Ok(json) => Message::Text(json),
                Err(e) => {
                    warn!(error = %e, "failed to serialize outbound event");
                    continue;
                }
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut forwarder: Option<JoinHandle<()>> = None;

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let parsed: Result<ClientMessage, _> = serde_json::from_str(&text);
                let Ok(command) = parsed else {
                    // Malformed payloads are rejected locally and never
                    // reach round state.
                    warn!(%connection_id, "dropping malformed message");
                    continue;
                };
                if !dispatch(command, connection_id, player_id, &state, &out_tx, &mut forwarder)
                    .await
                {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!(%connection_id, "client requested close");
                break;
            }
            Ok(_) => {} // ping/pong/binary
            Err(e) => {
                warn!(%connection_id, error = %e, "websocket error");
                break;
            }
        }
    }

    if let Some(task) = forwarder.take() {
        task.abort();
    }
    state.hub.unsubscribe(connection_id);
    drop(out_tx);
    let _ = writer.await;
    state.metrics.connected_clients.dec();
    info!(%connection_id, player_id, "🔌 client disconnected");
}

/// Handle one inbound command. Returns false when the engine is gone
/// and the connection should close.
async fn dispatch(
    command: ClientMessage,
    connection_id: Uuid,
    player_id: u64,
    state: &Arc<AppState>,
    out_tx: &mpsc::Sender<GameEvent>,
    forwarder: &mut Option<JoinHandle<()>>,
) -> bool {
    match command {
        ClientMessage::Join => {
            if forwarder.is_none() {
                let rx = state.hub.subscribe(connection_id);
                *forwarder = Some(spawn_forwarder(rx, out_tx.clone()));
            }
            match state.engine.snapshot().await {
                Ok(current) => {
                    let _ = out_tx.send(current.into()).await;
                    true
                }
                Err(_) => false,
            }
        }
        ClientMessage::Leave => {
            if let Some(task) = forwarder.take() {
                task.abort();
            }
            state.hub.unsubscribe(connection_id);
            true
        }
        ClientMessage::PlaceBet { amount } => match state.engine.place_bet(player_id, amount).await
        {
            Ok(Ok(bet)) => {
                let _ = out_tx.send(GameEvent::BetPlaced { bet }).await;
                true
            }
            Ok(Err(reason)) => {
                let _ = out_tx
                    .send(GameEvent::BetError {
                        reason: reason.to_string(),
                    })
                    .await;
                true
            }
            Err(_) => false,
        },
        ClientMessage::CashOut { bet_id } => {
            match state.engine.cash_out(player_id, bet_id).await {
                Ok(Ok(bet)) => {
                    let _ = out_tx.send(GameEvent::CashoutSuccess { bet }).await;
                    true
                }
                Ok(Err(reason)) => {
                    let _ = out_tx
                        .send(GameEvent::CashoutError {
                            reason: reason.to_string(),
                        })
                        .await;
                    true
                }
                Err(_) => false,
            }
        }
    }
}

/// Pump broadcast events into the connection's outbound queue. A lagged
/// receiver drops the missed events; the client can resync with `join`.
fn spawn_forwarder(
    mut rx: broadcast::Receiver<GameEvent>,
    out: mpsc::Sender<GameEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if out.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagging, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_parse_from_wire_format() {
        let join: ClientMessage = serde_json::from_str(r#"{"type":"join"}"#).unwrap();
        assert!(matches!(join, ClientMessage::Join));

        let bet: ClientMessage =
            serde_json::from_str(r#"{"type":"place-bet","amount":100}"#).unwrap();
        assert!(matches!(bet, ClientMessage::PlaceBet { amount: 100 }));

        let cashout: ClientMessage =
            serde_json::from_str(r#"{"type":"cash-out","bet_id":7}"#).unwrap();
        assert!(matches!(cashout, ClientMessage::CashOut { bet_id: 7 }));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"explode"}"#).is_err());
    }
}

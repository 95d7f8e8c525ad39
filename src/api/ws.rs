// =============================================================================
// WebSocket gateway — /ws/market
// =============================================================================
//
// On upgrade the client is registered on the hub with the default
// subscription (all symbols, all topics) and immediately receives a snapshot
// envelope per symbol that has one. After that the connection is a drain of
// the client's hub queue plus a reader for subscribe/unsubscribe ops.
//
//   {"op":"subscribe","topics":["tick"],"symbols":["NIFTY"]}
//   {"op":"unsubscribe","topics":[...],"symbols":[...]}
//
// Unrecognized ops are ignored. Malformed JSON closes the socket with
// code 1003. Writes carry a 2-second deadline; a slower client is dropped.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::hub::{ClientHandle, Envelope, EnvelopeKind, Topic};
use crate::session::ist_now;
use crate::types::Symbol;

/// Writes slower than this drop the client.
const WRITE_DEADLINE: Duration = Duration::from_secs(2);
/// 1003: unsupported data.
const CLOSE_UNSUPPORTED: u16 = 1003;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

#[derive(Debug, Deserialize)]
struct ClientOp {
    op: String,
    #[serde(default)]
    topics: Vec<Topic>,
    #[serde(default)]
    symbols: Vec<String>,
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let client = state.hub.register();
    info!(client = client.id, "ws client connected");

    let (mut sender, mut receiver) = socket.split();

    // Initial burst: one snapshot envelope per warm symbol so the client is
    // immediately usable.
    for symbol in Symbol::ALL {
        if let Some(data) = state.hub.last_snapshot(symbol) {
            let envelope = Envelope {
                kind: EnvelopeKind::Snapshot,
                symbol: Some(symbol),
                data,
                ts: ist_now().timestamp_millis(),
            };
            if write_envelope(&mut sender, &envelope).await.is_err() {
                state.hub.unregister(client.id);
                return;
            }
        }
    }

    loop {
        tokio::select! {
            batch = client.next_batch() => {
                let mut failed = false;
                for envelope in batch {
                    if write_envelope(&mut sender, &envelope).await.is_err() {
                        failed = true;
                        break;
                    }
                }
                if failed {
                    debug!(client = client.id, "write failed or timed out — dropping client");
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match handle_client_message(&client, &text) {
                            MessageOutcome::Ack(op) => {
                                let ack = serde_json::json!({"type": "ack", "op": op});
                                if write_text(&mut sender, ack.to_string()).await.is_err() {
                                    break;
                                }
                            }
                            MessageOutcome::Ignored => {}
                            MessageOutcome::Malformed => {
                                warn!(client = client.id, "malformed ws message — closing 1003");
                                let _ = sender
                                    .send(Message::Close(Some(CloseFrame {
                                        code: CLOSE_UNSUPPORTED,
                                        reason: "malformed JSON".into(),
                                    })))
                                    .await;
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(client = client.id, "ws client disconnected");
                        break;
                    }
                    Some(Ok(_)) => {} // Pong / binary ignored.
                    Some(Err(e)) => {
                        debug!(client = client.id, error = %e, "ws receive error");
                        break;
                    }
                }
            }
        }
    }

    state.hub.unregister(client.id);
    info!(
        client = client.id,
        dropped = client.dropped_count(),
        "ws client cleaned up"
    );
}

enum MessageOutcome {
    Ack(&'static str),
    Ignored,
    Malformed,
}

/// Apply one inbound client message to the subscription.
fn handle_client_message(client: &ClientHandle, text: &str) -> MessageOutcome {
    let parsed: Result<ClientOp, _> = serde_json::from_str(text);
    let Ok(op) = parsed else {
        return MessageOutcome::Malformed;
    };

    // Unknown symbol strings are dropped silently; the rest apply.
    let symbols: Vec<Symbol> = op.symbols.iter().filter_map(|s| Symbol::parse(s)).collect();

    match op.op.as_str() {
        "subscribe" => {
            client.update_subscription(|sub| sub.subscribe(&op.topics, &symbols));
            MessageOutcome::Ack("subscribe")
        }
        "unsubscribe" => {
            client.update_subscription(|sub| sub.unsubscribe(&op.topics, &symbols));
            MessageOutcome::Ack("unsubscribe")
        }
        other => {
            debug!(op = other, "unrecognized ws op ignored");
            MessageOutcome::Ignored
        }
    }
}

async fn write_envelope<S>(sender: &mut S, envelope: &Envelope) -> Result<(), ()>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    match serde_json::to_string(envelope) {
        Ok(text) => write_text(sender, text).await,
        Err(e) => {
            // A serialization failure is a bug in the payload, not the link.
            warn!(error = %e, "failed to serialize envelope");
            Ok(())
        }
    }
}

async fn write_text<S>(sender: &mut S, text: String) -> Result<(), ()>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    match tokio::time::timeout(WRITE_DEADLINE, sender.send(Message::Text(text.into()))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) | Err(_) => Err(()),
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::FanoutHub;

    #[test]
    fn subscribe_op_updates_subscription() {
        let hub = FanoutHub::new();
        let client = hub.register();
        client.update_subscription(|s| {
            s.topics.clear();
            s.symbols.clear();
        });

        let outcome = handle_client_message(
            &client,
            r#"{"op":"subscribe","topics":["decision"],"symbols":["banknifty"]}"#,
        );
        assert!(matches!(outcome, MessageOutcome::Ack("subscribe")));
        let sub = client.subscription();
        assert!(sub.matches(Topic::Decision, Symbol::BankNifty));
        assert!(!sub.matches(Topic::Tick, Symbol::BankNifty));
    }

    #[test]
    fn unsubscribe_op_removes_topics() {
        let hub = FanoutHub::new();
        let client = hub.register();
        let outcome = handle_client_message(
            &client,
            r#"{"op":"unsubscribe","topics":["tick"],"symbols":[]}"#,
        );
        assert!(matches!(outcome, MessageOutcome::Ack("unsubscribe")));
        assert!(!client.subscription().topics.contains(&Topic::Tick));
        assert!(client.subscription().topics.contains(&Topic::Snapshot));
    }

    #[test]
    fn unknown_op_is_ignored() {
        let hub = FanoutHub::new();
        let client = hub.register();
        let outcome = handle_client_message(&client, r#"{"op":"dance"}"#);
        assert!(matches!(outcome, MessageOutcome::Ignored));
    }

    #[test]
    fn malformed_json_is_flagged() {
        let hub = FanoutHub::new();
        let client = hub.register();
        let outcome = handle_client_message(&client, "{not json");
        assert!(matches!(outcome, MessageOutcome::Malformed));
    }

    #[test]
    fn unknown_symbols_are_dropped_silently() {
        let hub = FanoutHub::new();
        let client = hub.register();
        client.update_subscription(|s| s.symbols.clear());
        let outcome = handle_client_message(
            &client,
            r#"{"op":"subscribe","topics":[],"symbols":["DOGE","NIFTY"]}"#,
        );
        assert!(matches!(outcome, MessageOutcome::Ack(_)));
        let sub = client.subscription();
        assert!(sub.symbols.contains(&Symbol::Nifty));
        assert_eq!(sub.symbols.len(), 1);
    }
}

//! Per-connection WebSocket session loop.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::proto::{self, ClientMessage};
use crate::server::AppState;
use crate::subscription::OUT_QUEUE_CAPACITY;

/// Drive one client connection: register it, split the socket, and dispatch
/// inbound frames until the peer goes away.
pub async fn session(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUT_QUEUE_CAPACITY);
    let client = state.registry.add(out_tx.clone());
    debug!(
        client = client.id(),
        clients = state.registry.client_count(),
        "client connected"
    );

    // Writer task: everything the client sees funnels through one channel,
    // so per-subscription order survives the fan-in.
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                debug!(client = client.id(), error = %e, "socket error");
                break;
            }
        };
        let txt = match msg {
            Message::Text(txt) => txt,
            Message::Close(_) => break,
            _ => continue,
        };
        match ClientMessage::decode(&txt) {
            Ok(ClientMessage::Publish(ev)) => {
                let id = ev.id.clone();
                let res = state.relay.accept(&ev);
                if out_tx
                    .send(proto::ok_frame(&id, res.accepted, &res.reason))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(ClientMessage::Subscribe { sub_id, filters }) => {
                client.subscribe(state.store.clone(), sub_id, filters);
            }
            Ok(ClientMessage::Count { sub_id, filters }) => {
                let frame = match state.store.count(&filters) {
                    Ok(n) => proto::count_frame(&sub_id, n),
                    Err(e) => {
                        warn!(error = %e, "count query failed");
                        proto::notice_frame("error: database error")
                    }
                };
                if out_tx.send(frame).await.is_err() {
                    break;
                }
            }
            Ok(ClientMessage::Unsubscribe { sub_id }) => {
                client.unsubscribe(&sub_id);
            }
            Err(e) => {
                let notice = proto::notice_frame(&format!("could not parse message: {e}"));
                if out_tx.send(notice).await.is_err() {
                    break;
                }
            }
        }
    }

    state.registry.remove(&client);
    debug!(client = client.id(), "client disconnected");
    // The writer drains until every sender clone is gone: the session's own
    // handle, the client's, and those held by just-cancelled sender tasks.
    drop(client);
    drop(out_tx);
    let _ = writer.await;
}

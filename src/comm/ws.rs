use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_sessions::Session;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{AppResult, AppState, session::current_user};

use super::{Caller, CommHub, protocol::Invocation};

/// Identity is read here, once, and bound to the connection for its lifetime.
/// Anonymous sockets are accepted; every invocation on them completes with
/// `unauthenticated`.
#[debug_handler(state = AppState)]
pub async fn comm_ws(State(hub): State<CommHub>, session: Session, ws: WebSocketUpgrade) -> AppResult<Response> {
    let user_id = current_user(&session).await?;

    Ok(ws.on_upgrade(move |socket| serve_connection(hub, user_id, socket)))
}

async fn serve_connection(hub: CommHub, user_id: Option<String>, socket: WebSocket) {
    let caller = Caller {
        conn_id: Uuid::now_v7(),
        user_id,
    };
    let (tx, mut rx) = mpsc::channel(hub.outbox_capacity());

    hub.connect(caller.conn_id, tx.clone()).await;
    info!(conn = %caller.conn_id, user_id = caller.user_id.as_deref(), "ws: open");

    let (mut sender, mut receiver) = socket.split();

    let mut outbound = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "ws: unserializable frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let Some(Ok(msg)) = incoming else {
                    break;
                };

                let text = match msg {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };

                let invocation: Invocation = match serde_json::from_str(text.as_str()) {
                    Ok(invocation) => invocation,
                    Err(e) => {
                        debug!(conn = %caller.conn_id, error = %e, "ws: ignoring malformed frame");
                        continue;
                    }
                };

                // one invocation at a time keeps a sender's events in order
                if let Some(completion) = hub.dispatch(&caller, invocation).await {
                    if tx.send(completion).await.is_err() {
                        break;
                    }
                }
            }
            _ = &mut outbound => break,
        }
    }

    hub.disconnect(caller.conn_id).await;
    outbound.abort();
    info!(conn = %caller.conn_id, "ws: closed");
}

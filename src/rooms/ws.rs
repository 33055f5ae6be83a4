use axum::{debug_handler, extract::{State, WebSocketUpgrade, ws::{Message, WebSocket}}, response::IntoResponse};
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::rooms::{msg::ClientEvent, relay::{ConnId, Relay}};

#[debug_handler(state = crate::AppState)]
pub async fn relay_ws(
    State(relay): State<Relay>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| handle_socket(stream, relay).await)
}

async fn handle_socket(stream: WebSocket, relay: Relay) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = relay.connect(tx);
    let (mut sender, mut receiver) = stream.split();

    let mut outbox_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event.encode() {
                Ok(text) => text,
                Err(err) => {
                    debug!(%conn, %err, "failed to encode event");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let reason = tokio::select! {
        reason = read_loop(&mut receiver, &relay, conn) => reason,
        _ = &mut outbox_task => "send failed",
    };

    relay.disconnect(conn);
    outbox_task.abort();
    info!(%conn, reason, "client disconnected");
}

async fn read_loop<S>(receiver: &mut S, relay: &Relay, conn: ConnId) -> &'static str
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Close(_)) => return "client close",
            Ok(msg @ (Message::Text(_) | Message::Binary(_))) => msg,
            Ok(_) => continue,
            Err(err) => {
                debug!(%conn, %err, "socket error");
                return "transport error";
            }
        };

        let Ok(event) = ClientEvent::decode(&msg.into_data()) else {
            debug!(%conn, "dropping malformed frame");
            continue;
        };

        match event {
            ClientEvent::JoinRoom(join) => relay.join(conn, join),
            ClientEvent::SendMessage(send) => relay.send_message(conn, send),
        }
    }

    "transport closed"
}

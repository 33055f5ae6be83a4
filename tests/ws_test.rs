use std::{net::SocketAddr, time::Duration};

use anyhow::{Result, anyhow};
use futures_util::{SinkExt, StreamExt};
use roomrelay::{config::Config, rooms::Relay, serve_until};
use serde_json::{Value, json};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const READ_TIMEOUT: Duration = Duration::from_secs(2);

async fn spawn_server(relay: Relay) -> Result<(SocketAddr, oneshot::Sender<()>, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        let _ = serve_until(listener, relay, &Config::default(), shutdown).await;
    });
    Ok((addr, shutdown_tx, server))
}

async fn connect(addr: SocketAddr) -> Result<Socket> {
    let (socket, _) = connect_async(format!("ws://{addr}/ws")).await?;
    Ok(socket)
}

async fn emit(socket: &mut Socket, event: &str, data: Value) -> Result<()> {
    let frame = json!({ "event": event, "data": data }).to_string();
    socket.send(Message::text(frame)).await?;
    Ok(())
}

async fn next_event(socket: &mut Socket) -> Result<Value> {
    loop {
        let msg = timeout(READ_TIMEOUT, socket.next())
            .await?
            .ok_or_else(|| anyhow!("socket closed"))??;
        if let Message::Text(text) = msg {
            return Ok(serde_json::from_str(text.as_str())?);
        }
    }
}

async fn join(socket: &mut Socket, room: &str, username: &str) -> Result<()> {
    emit(socket, "join_room", json!({ "room": room, "username": username })).await
}

#[tokio::test]
async fn lobby_over_websocket() -> Result<()> {
    let relay = Relay::new();
    let (addr, shutdown, server) = spawn_server(relay.clone()).await?;

    let mut alice = connect(addr).await?;
    join(&mut alice, "lobby", "alice").await?;
    assert_eq!(
        next_event(&mut alice).await?,
        json!({ "event": "room_users", "data": { "room": "lobby", "users": ["alice"] } })
    );

    let mut bob = connect(addr).await?;
    join(&mut bob, "lobby", "bob").await?;

    let notice = next_event(&mut alice).await?;
    assert_eq!(notice["event"], "receive_message");
    assert_eq!(notice["data"]["message"], "bob joined the room");
    assert_eq!(notice["data"]["username"], "system");
    assert_eq!(notice["data"]["senderId"], "system");
    assert_eq!(notice["data"]["type"], "system");
    let users = json!({ "event": "room_users", "data": { "room": "lobby", "users": ["alice", "bob"] } });
    assert_eq!(next_event(&mut alice).await?, users);
    assert_eq!(next_event(&mut bob).await?, users);

    // malformed frames are dropped without closing the connection
    alice.send(Message::text("garbage")).await?;
    emit(&mut alice, "leave_room", json!({ "room": "lobby" })).await?;

    emit(&mut alice, "send_message", json!({
        "room": "lobby",
        "username": "alice",
        "message": "hi",
        "to": "all",
    })).await?;
    let hi = next_event(&mut bob).await?;
    assert_eq!(hi["event"], "receive_message");
    assert_eq!(hi["data"]["message"], "hi");
    assert_eq!(hi["data"]["type"], "user");
    let alice_id = hi["data"]["senderId"].as_str().unwrap_or_default().to_owned();
    assert!(!alice_id.is_empty() && alice_id != "system");

    emit(&mut alice, "send_message", json!({
        "room": "lobby",
        "username": "alice",
        "message": "secret",
        "to": "bob",
        "time": "12:34",
    })).await?;
    let secret = next_event(&mut bob).await?;
    assert_eq!(secret["data"]["message"], "secret");
    assert_eq!(secret["data"]["type"], "dm");
    assert_eq!(secret["data"]["to"], "bob");
    assert_eq!(secret["data"]["time"], "12:34");
    assert_eq!(secret["data"]["senderId"], alice_id.as_str());

    bob.close(None).await?;

    let left = next_event(&mut alice).await?;
    assert_eq!(left["data"]["message"], "bob left the room");
    assert_eq!(
        next_event(&mut alice).await?,
        json!({ "event": "room_users", "data": { "room": "lobby", "users": ["alice"] } })
    );
    assert_eq!(relay.connection_count(), 1);
    assert_eq!(relay.room_count(), 1);

    // alice never saw her own broadcast or the dm
    assert!(timeout(Duration::from_millis(100), alice.next()).await.is_err());

    alice.close(None).await?;
    timeout(READ_TIMEOUT, async {
        while relay.connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }).await?;
    assert_eq!(relay.room_count(), 0);

    let _ = shutdown.send(());
    server.await?;
    Ok(())
}

#[tokio::test]
async fn dropped_socket_counts_as_leave() -> Result<()> {
    let relay = Relay::new();
    let (addr, shutdown, server) = spawn_server(relay.clone()).await?;

    let mut alice = connect(addr).await?;
    join(&mut alice, "lobby", "alice").await?;
    next_event(&mut alice).await?;

    let mut bob = connect(addr).await?;
    join(&mut bob, "lobby", "bob").await?;
    next_event(&mut bob).await?;
    next_event(&mut alice).await?;
    next_event(&mut alice).await?;

    drop(bob);

    let left = next_event(&mut alice).await?;
    assert_eq!(left["data"]["message"], "bob left the room");
    assert_eq!(next_event(&mut alice).await?["data"]["users"], json!(["alice"]));

    alice.close(None).await?;
    let _ = shutdown.send(());
    server.await?;
    Ok(())
}

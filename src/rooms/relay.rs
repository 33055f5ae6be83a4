use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::rooms::msg::{JoinRoom, MessageKind, ReceiveMessage, RoomUsers, SendMessage, ServerEvent, time_now};

pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(Uuid);

impl ConnId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub room: String,
    pub username: String,
}

#[derive(Default)]
struct Registry {
    outboxes: HashMap<ConnId, Outbox>,
    // room -> username -> connections
    rooms: HashMap<String, BTreeMap<String, BTreeSet<ConnId>>>,
    presence: HashMap<ConnId, Presence>,
}

#[derive(Clone, Default)]
pub struct Relay {
    registry: Arc<Mutex<Registry>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connect(&self, outbox: Outbox) -> ConnId {
        let conn = ConnId::new();
        self.lock().outboxes.insert(conn, outbox);
        info!(%conn, "connection opened");
        conn
    }

    pub fn join(&self, conn: ConnId, JoinRoom { room, username }: JoinRoom) {
        if room.is_empty() || username.is_empty() {
            debug!(%conn, "ignoring join without room or username");
            return;
        }

        let mut registry = self.lock();
        if !registry.outboxes.contains_key(&conn) {
            debug!(%conn, "ignoring join from unknown connection");
            return;
        }

        let unchanged = registry
            .presence
            .get(&conn)
            .map(|current| current.room == room && current.username == username);
        match unchanged {
            Some(true) => {
                debug!(%conn, %room, %username, "already joined");
                return;
            }
            Some(false) => registry.leave(conn),
            None => {}
        }

        registry.presence.insert(conn, Presence { room: room.clone(), username: username.clone() });
        registry.rooms
            .entry(room.clone())
            .or_default()
            .entry(username.clone())
            .or_default()
            .insert(conn);
        info!(%conn, %room, %username, "joined room");

        let notice = ServerEvent::ReceiveMessage(ReceiveMessage::system(&room, format!("{username} joined the room")));
        registry.broadcast(&room, Some(conn), &notice);
        registry.broadcast_users(&room);
    }

    pub fn send_message(&self, conn: ConnId, msg: SendMessage) {
        if msg.room.is_empty() || msg.username.is_empty() || msg.message.is_empty() {
            debug!(%conn, "ignoring incomplete message");
            return;
        }

        let registry = self.lock();
        let recipient = msg.recipient().map(str::to_owned);
        let room = msg.room.clone();
        let payload = ServerEvent::ReceiveMessage(ReceiveMessage {
            kind: if recipient.is_some() { MessageKind::Dm } else { MessageKind::User },
            time: msg.time.filter(|time| !time.is_empty()).unwrap_or_else(time_now),
            sender_id: conn.to_string(),
            room: msg.room,
            username: msg.username,
            message: msg.message,
            to: msg.to,
        });

        match recipient {
            None => registry.broadcast(&room, Some(conn), &payload),
            Some(to) => {
                let Some(targets) = registry.rooms.get(&room).and_then(|users| users.get(&to)) else {
                    debug!(%conn, %room, %to, "dropping direct message to absent user");
                    return;
                };
                for target in targets {
                    registry.deliver(*target, &payload);
                }
            }
        }
    }

    // safe to call more than once
    pub fn disconnect(&self, conn: ConnId) {
        let mut registry = self.lock();
        registry.outboxes.remove(&conn);
        registry.leave(conn);
        info!(%conn, "connection closed");
    }

    pub fn users(&self, room: &str) -> Vec<String> {
        self.lock().users(room)
    }

    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.lock().outboxes.len()
    }

    pub fn presence(&self, conn: ConnId) -> Option<Presence> {
        self.lock().presence.get(&conn).cloned()
    }
}

impl Registry {
    fn users(&self, room: &str) -> Vec<String> {
        self.rooms
            .get(room)
            .map(|users| users.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn leave(&mut self, conn: ConnId) {
        let Some(Presence { room, username }) = self.presence.remove(&conn) else {
            return;
        };

        if let Some(users) = self.rooms.get_mut(&room) {
            if let Some(conns) = users.get_mut(&username) {
                conns.remove(&conn);
                if conns.is_empty() {
                    users.remove(&username);
                }
            }
            if users.is_empty() {
                self.rooms.remove(&room);
            }
        }
        info!(%conn, %room, %username, "left room");

        let notice = ServerEvent::ReceiveMessage(ReceiveMessage::system(&room, format!("{username} left the room")));
        self.broadcast(&room, None, &notice);
        self.broadcast_users(&room);
    }

    fn broadcast(&self, room: &str, except: Option<ConnId>, event: &ServerEvent) {
        let Some(users) = self.rooms.get(room) else {
            return;
        };
        for conn in users.values().flatten() {
            if Some(*conn) != except {
                self.deliver(*conn, event);
            }
        }
    }

    fn broadcast_users(&self, room: &str) {
        let event = ServerEvent::RoomUsers(RoomUsers {
            room: room.to_owned(),
            users: self.users(room),
        });
        self.broadcast(room, None, &event);
    }

    fn deliver(&self, conn: ConnId, event: &ServerEvent) {
        let Some(outbox) = self.outboxes.get(&conn) else {
            return;
        };
        if outbox.send(event.clone()).is_err() {
            debug!(%conn, "outbox closed, dropping event");
        }
    }
}

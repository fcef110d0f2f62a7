//! Room membership and broadcast: a single `tokio::sync::Mutex` around a
//! `HashMap<room, HashSet<ConnectionId>>`,
//! snapshot-then-iterate so a slow or failing send to one member cannot
//! hold the lock for the whole broadcast.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use super::message::Message;

pub type ConnectionId = u64;

/// An outbound handle for a connection, used so the room manager can fan
/// out a message without owning the connection itself — each upgraded
/// connection's task holds the receiving half and forwards to the socket.
#[derive(Clone)]
pub struct Outbox(mpsc::UnboundedSender<Message>);

impl Outbox {
    pub fn send(&self, message: Message) -> bool {
        self.0.send(message).is_ok()
    }
}

pub fn outbox_pair() -> (Outbox, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Outbox(tx), rx)
}

#[derive(Default)]
struct RoomState {
    rooms: HashMap<String, HashSet<ConnectionId>>,
    outboxes: HashMap<ConnectionId, Outbox>,
}

/// Shared, cloneable room registry. One instance per `Application`.
#[derive(Clone, Default)]
pub struct RoomManager {
    state: Arc<Mutex<RoomState>>,
}

impl RoomManager {
    pub fn new() -> Self {
        RoomManager::default()
    }

    /// Registers a connection's outbox so it can be targeted by
    /// broadcasts; called once when a connection opens.
    pub async fn register(&self, id: ConnectionId, outbox: Outbox) {
        self.state.lock().await.outboxes.insert(id, outbox);
    }

    /// Removes a connection from every room and drops its outbox; called
    /// once when a connection closes.
    pub async fn unregister(&self, id: ConnectionId) {
        let mut state = self.state.lock().await;
        state.outboxes.remove(&id);
        for members in state.rooms.values_mut() {
            members.remove(&id);
        }
        state.rooms.retain(|_, members| !members.is_empty());
    }

    pub async fn join(&self, room: &str, id: ConnectionId) {
        self.state.lock().await.rooms.entry(room.to_string()).or_default().insert(id);
    }

    pub async fn leave(&self, room: &str, id: ConnectionId) {
        let mut state = self.state.lock().await;
        if let Some(members) = state.rooms.get_mut(room) {
            members.remove(&id);
            if members.is_empty() {
                state.rooms.remove(room);
            }
        }
    }

    pub async fn room_size(&self, room: &str) -> usize {
        self.state.lock().await.rooms.get(room).map(HashSet::len).unwrap_or(0)
    }

    /// Number of currently registered connections, checked against
    /// `ws.maxConnections` before a new upgrade is accepted.
    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.outboxes.len()
    }

    /// Broadcasts `message` to every member currently in `room`, skipping
    /// `exclude` if given (the common "echo to everyone but the sender"
    /// shape). Takes a snapshot of member ids under the lock, then sends
    /// outside it so one dead outbox can't block the rest of the room.
    pub async fn broadcast(&self, room: &str, message: Message, exclude: Option<ConnectionId>) {
        let (members, outboxes): (Vec<ConnectionId>, HashMap<ConnectionId, Outbox>) = {
            let state = self.state.lock().await;
            let members = state.rooms.get(room).cloned().unwrap_or_default();
            (members.into_iter().collect(), state.outboxes.clone())
        };

        Self::fan_out(members, &outboxes, message, exclude);
    }

    /// Broadcasts `message` to every currently registered connection,
    /// regardless of room membership (omitting `room` broadcasts to all).
    /// Same snapshot-then-iterate discipline as [`Self::broadcast`].
    pub async fn broadcast_all(&self, message: Message, exclude: Option<ConnectionId>) {
        let outboxes = self.state.lock().await.outboxes.clone();
        let members: Vec<ConnectionId> = outboxes.keys().copied().collect();
        Self::fan_out(members, &outboxes, message, exclude);
    }

    fn fan_out(members: Vec<ConnectionId>, outboxes: &HashMap<ConnectionId, Outbox>, message: Message, exclude: Option<ConnectionId>) {
        for id in members {
            if Some(id) == exclude {
                continue;
            }
            if let Some(outbox) = outboxes.get(&id) {
                if !outbox.send(message.clone()) {
                    log::warn!("dropping broadcast to connection {id}: outbox closed");
                }
            }
        }
    }
}

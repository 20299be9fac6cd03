//! In-memory registry of live signaling connections, one room per meeting.
//!
//! Meetings are independent, so each room sits behind its own lock; the
//! outer map is only touched on connect/disconnect. Message delivery clones
//! the recipient senders out of the lock first — sends never hold it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use cf_domain::signaling::{ParticipantInfo, Role, ServerMessage};

/// Channel the gateway pushes outbound messages into; the socket's writer
/// task drains it. Dropping the sender closes the writer.
pub type MessageSender = mpsc::Sender<ServerMessage>;

struct Room {
    participants: HashMap<String, ParticipantInfo>,
    senders: HashMap<String, MessageSender>,
    /// Monotonic connection generation per user; lets a displaced socket's
    /// cleanup recognize it no longer owns the entry.
    generations: HashMap<String, u64>,
}

impl Room {
    fn new() -> Self {
        Self {
            participants: HashMap::new(),
            senders: HashMap::new(),
            generations: HashMap::new(),
        }
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    rooms: RwLock<HashMap<String, Arc<Mutex<Room>>>>,
    next_generation: std::sync::atomic::AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn room(&self, meeting_id: &str) -> Arc<Mutex<Room>> {
        if let Some(room) = self.rooms.read().get(meeting_id) {
            return room.clone();
        }
        self.rooms
            .write()
            .entry(meeting_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Room::new())))
            .clone()
    }

    /// Register a connection. A prior connection for the same
    /// `(meeting_id, user_id)` is displaced: its sender is returned so the
    /// caller can emit leave semantics and let the old socket close. The
    /// returned generation tags this connection for
    /// [`disconnect_if`](Self::disconnect_if).
    pub fn connect(
        &self,
        meeting_id: &str,
        participant: ParticipantInfo,
        sender: MessageSender,
    ) -> (Option<MessageSender>, u64) {
        let generation = self
            .next_generation
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let room = self.room(meeting_id);
        let mut room = room.lock();
        let user_id = participant.user_id.clone();
        let displaced = room.senders.insert(user_id.clone(), sender);
        room.participants.insert(user_id.clone(), participant);
        room.generations.insert(user_id.clone(), generation);
        if displaced.is_some() {
            tracing::info!(meeting_id, user_id = %user_id, "connection displaced by newer socket");
        }
        (displaced, generation)
    }

    /// Remove a connection only if `generation` still owns it. A displaced
    /// socket's cleanup is a no-op; its successor stays registered.
    pub fn disconnect_if(&self, meeting_id: &str, user_id: &str, generation: u64) -> bool {
        let owns = {
            let room = self.room(meeting_id);
            let room = room.lock();
            room.generations.get(user_id) == Some(&generation)
        };
        if !owns {
            return false;
        }
        self.disconnect(meeting_id, user_id)
    }

    /// Remove a connection. Returns whether it existed. Empty rooms are
    /// dropped from the outer map.
    pub fn disconnect(&self, meeting_id: &str, user_id: &str) -> bool {
        let room = self.room(meeting_id);
        let removed = {
            let mut room = room.lock();
            room.senders.remove(user_id);
            room.generations.remove(user_id);
            room.participants.remove(user_id).is_some()
        };
        if removed {
            let mut rooms = self.rooms.write();
            let empty = rooms
                .get(meeting_id)
                .map(|r| r.lock().participants.is_empty())
                .unwrap_or(false);
            if empty {
                rooms.remove(meeting_id);
            }
        }
        removed
    }

    /// Point-to-point send; drops silently if the recipient is absent.
    pub async fn send_to_user(&self, meeting_id: &str, user_id: &str, message: ServerMessage) {
        let sender = {
            let room = self.room(meeting_id);
            let room = room.lock();
            room.senders.get(user_id).cloned()
        };
        if let Some(sender) = sender {
            if sender.send(message).await.is_err() {
                tracing::debug!(meeting_id, user_id, "recipient channel closed, message dropped");
            }
        }
    }

    /// Fan-out to every participant, optionally excluding one. Each
    /// per-recipient send failure is isolated.
    pub async fn broadcast(
        &self,
        meeting_id: &str,
        message: ServerMessage,
        exclude_user_id: Option<&str>,
    ) {
        let recipients: Vec<(String, MessageSender)> = {
            let room = self.room(meeting_id);
            let room = room.lock();
            room.senders
                .iter()
                .filter(|(user_id, _)| Some(user_id.as_str()) != exclude_user_id)
                .map(|(user_id, sender)| (user_id.clone(), sender.clone()))
                .collect()
        };
        for (user_id, sender) in recipients {
            if sender.send(message.clone()).await.is_err() {
                tracing::debug!(meeting_id, user_id = %user_id, "broadcast recipient gone");
            }
        }
    }

    /// Local mute-state update only; callers broadcast separately.
    pub fn update_mute_status(&self, meeting_id: &str, user_id: &str, muted: bool) {
        let room = self.room(meeting_id);
        if let Some(participant) = room.lock().participants.get_mut(user_id) {
            participant.audio_muted = muted;
        };
    }

    pub fn participant(&self, meeting_id: &str, user_id: &str) -> Option<ParticipantInfo> {
        let room = self.room(meeting_id);
        let room = room.lock();
        room.participants.get(user_id).cloned()
    }

    pub fn participants(&self, meeting_id: &str) -> Vec<ParticipantInfo> {
        let room = self.room(meeting_id);
        let room = room.lock();
        let mut list: Vec<ParticipantInfo> = room.participants.values().cloned().collect();
        list.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        list
    }

    pub fn is_host(&self, meeting_id: &str, user_id: &str) -> bool {
        self.participant(meeting_id, user_id)
            .map(|p| p.role == Role::Host)
            .unwrap_or(false)
    }
}

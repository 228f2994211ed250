//! Room fan-out for the relay backend.
//!
//! Each document gets a room; every member of a room owns an outbound queue.
//! A message broadcast into a room is delivered to every member except the
//! sender (N-1 fan-out).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::protocol::{ParticipantDescriptor, ServerMessage};

/// Outbound queue of one relay connection.
pub type MemberSender = mpsc::UnboundedSender<ServerMessage>;

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    /// Deliveries that failed because the member's connection was gone.
    pub messages_dropped: u64,
    pub active_members: usize,
}

/// Lock-free counters for the hot path.
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl AtomicBroadcastStats {
    fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }
}

/// One connection joined to a document room.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    sender: MemberSender,
}

impl Member {
    pub fn new(id: Uuid, name: impl Into<String>, sender: MemberSender) -> Self {
        Self {
            id,
            name: name.into(),
            sender,
        }
    }

    pub fn descriptor(&self) -> ParticipantDescriptor {
        ParticipantDescriptor::new(self.id.to_string(), self.name.clone())
    }
}

/// Members of one document, in join order.
#[derive(Debug, Default)]
struct Room {
    members: Vec<Member>,
}

/// Maps document ids to rooms.
///
/// Rooms are created on first join and removed when their last member leaves.
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<String, Room>>>,
    atomic_stats: Arc<AtomicBroadcastStats>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            atomic_stats: Arc::new(AtomicBroadcastStats::new()),
        }
    }

    /// Add `member` to the room of `document_id`.
    ///
    /// Returns the descriptors of members already present, in join order. A
    /// member id already in the room is replaced.
    pub async fn join(&self, document_id: &str, member: Member) -> Vec<ParticipantDescriptor> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(document_id.to_string()).or_default();
        room.members.retain(|m| m.id != member.id);
        let existing = room.members.iter().map(Member::descriptor).collect();
        room.members.push(member);
        existing
    }

    /// Remove a member. Empty rooms are dropped.
    ///
    /// Returns `false` if the member was not in the room.
    pub async fn leave(&self, document_id: &str, member_id: Uuid) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(document_id) else {
            return false;
        };
        let before = room.members.len();
        room.members.retain(|m| m.id != member_id);
        let removed = room.members.len() != before;

        if room.members.is_empty() {
            rooms.remove(document_id);
            log::debug!("Room {document_id} removed (empty)");
        }
        removed
    }

    /// Deliver `msg` to every member of the room except `from`.
    ///
    /// Returns the number of members the message was queued for.
    pub async fn broadcast(&self, document_id: &str, from: Option<Uuid>, msg: &ServerMessage) -> usize {
        let rooms = self.rooms.read().await;
        let Some(room) = rooms.get(document_id) else {
            return 0;
        };

        let mut delivered = 0;
        for member in room.members.iter().filter(|m| Some(m.id) != from) {
            if member.sender.send(msg.clone()).is_ok() {
                delivered += 1;
            } else {
                self.atomic_stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        delivered
    }

    /// Whether `member_id` is in the room of `document_id`.
    pub async fn is_member(&self, document_id: &str, member_id: Uuid) -> bool {
        self.rooms
            .read()
            .await
            .get(document_id)
            .is_some_and(|room| room.members.iter().any(|m| m.id == member_id))
    }

    pub async fn member_count(&self, document_id: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(document_id)
            .map_or(0, |room| room.members.len())
    }

    /// Participants of a room, in join order.
    pub async fn members(&self, document_id: &str) -> Vec<ParticipantDescriptor> {
        self.rooms
            .read()
            .await
            .get(document_id)
            .map(|room| room.members.iter().map(Member::descriptor).collect())
            .unwrap_or_default()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Get all active document IDs.
    pub async fn active_documents(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    pub async fn stats(&self) -> BroadcastStats {
        let rooms = self.rooms.read().await;
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.atomic_stats.messages_dropped.load(Ordering::Relaxed),
            active_members: rooms.values().map(|room| room.members.len()).sum(),
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

use aoiworld_common::{EntityId, Pose};
use aoiworld_kernel::Entity;
use serde::{Deserialize, Serialize};

/// Message families understood by clients, with their protocol ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Tells a newly connected client its entity id.
    AssignId,
    /// Chat, spawn position or movement of some entity.
    Broadcast,
    /// An entity left the client's neighborhood for good.
    Departed,
    /// Full list of entities visible to a newly arrived client.
    Neighbors,
}

impl MessageKind {
    pub fn msg_id(self) -> u32 {
        match self {
            MessageKind::AssignId => 1,
            MessageKind::Broadcast => 200,
            MessageKind::Departed => 201,
            MessageKind::Neighbors => 202,
        }
    }
}

/// Sub-type carried inside a [`MessageKind::Broadcast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BroadcastKind {
    Talk,
    Spawned,
    Moved,
}

impl BroadcastKind {
    pub fn tp(self) -> u32 {
        match self {
            BroadcastKind::Talk => 1,
            BroadcastKind::Spawned => 2,
            BroadcastKind::Moved => 4,
        }
    }
}

/// An entity id with the pose a client should render it at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    pub id: EntityId,
    pub pose: Pose,
}

impl From<&Entity> for Presence {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id,
            pose: entity.pose,
        }
    }
}

/// Typed payload handed to the transport for one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    AssignId { id: EntityId },
    Talk { id: EntityId, text: String },
    Spawned { id: EntityId, pose: Pose },
    Moved { id: EntityId, pose: Pose },
    Departed { id: EntityId },
    Neighbors { entities: Vec<Presence> },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::AssignId { .. } => MessageKind::AssignId,
            Message::Talk { .. } | Message::Spawned { .. } | Message::Moved { .. } => {
                MessageKind::Broadcast
            }
            Message::Departed { .. } => MessageKind::Departed,
            Message::Neighbors { .. } => MessageKind::Neighbors,
        }
    }

    pub fn broadcast_kind(&self) -> Option<BroadcastKind> {
        match self {
            Message::Talk { .. } => Some(BroadcastKind::Talk),
            Message::Spawned { .. } => Some(BroadcastKind::Spawned),
            Message::Moved { .. } => Some(BroadcastKind::Moved),
            _ => None,
        }
    }

    /// The entity the message is about, if it is about a single one.
    pub fn subject(&self) -> Option<EntityId> {
        match self {
            Message::AssignId { id }
            | Message::Talk { id, .. }
            | Message::Spawned { id, .. }
            | Message::Moved { id, .. }
            | Message::Departed { id } => Some(*id),
            Message::Neighbors { .. } => None,
        }
    }

    /// JSON rendering for logs and wire-level debugging.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

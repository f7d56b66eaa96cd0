use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a live entity.
///
/// Assigned once at registration and never reused while the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque handle of the transport connection an entity is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{:.8}", self.0.to_string())
    }
}

/// Where an entity stands and which way it faces.
///
/// `position.x` and `position.z` are the ground-plane coordinates used for
/// spatial indexing. `position.y` is elevation and only travels to clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    /// Facing angle in degrees, 0-360.
    pub facing: f32,
}

impl Pose {
    pub fn new(x: f32, y: f32, z: f32, facing: f32) -> Self {
        Self {
            position: Vec3::new(x, y, z),
            facing,
        }
    }

    /// Ground-plane coordinates `(x, z)`.
    pub fn ground(&self) -> (f32, f32) {
        (self.position.x, self.position.z)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            facing: 0.0,
        }
    }
}

//! Common: identifiers and value types shared by every aoiworld crate.

mod types;

pub use types::{ConnectionId, EntityId, Pose};

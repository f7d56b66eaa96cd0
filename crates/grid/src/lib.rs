//! Grid: uniform partition of a bounded 2D world into cells.
//!
//! # Invariants
//! - Cells tile the configured bounds exactly; every id in `[0, cols * rows)`
//!   exists once, numbered row-major.
//! - Each cell guards its own member set. There is no grid-wide lock.
//! - A neighborhood is the cell itself plus its up-to-8 adjacent cells.

mod cell;
mod config;
mod index;

pub use cell::{Cell, CellBounds, CellId};
pub use config::GridConfig;
pub use index::SpatialIndex;

use aoiworld_common::EntityId;

/// Errors raised by grid construction and membership operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("degenerate grid configuration: {reason}")]
    Degenerate { reason: String },
    #[error("position ({x}, {z}) lies outside the world bounds")]
    OutOfRange { x: f32, z: f32 },
    #[error("cell {0} does not exist")]
    UnknownCell(CellId),
    #[error("entity {entity} is not a member of cell {cell}")]
    MemberNotFound { entity: EntityId, cell: CellId },
}

pub fn crate_info() -> &'static str {
    "aoiworld-grid v0.1.0"
}

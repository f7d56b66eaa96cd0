//! Developer tooling: read-only views over a running world.
//!
//! # Invariants
//! - Tools never mutate the registry or the grid.

pub mod inspector;

pub use inspector::{EntityInfo, Violation, WorldInspector, WorldSummary};

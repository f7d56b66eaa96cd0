//! World Kernel: the authoritative entity registry and its startup config.
//!
//! # Invariants
//! - Every registered entity is a member of exactly one grid cell, the cell
//!   containing its last committed position.
//! - Positions change only through `EntityRegistry::update_position`.
//! - Entity ids are unique and monotonic for the lifetime of a registry.

pub mod config;
pub mod ids;
pub mod registry;
pub mod spawn;

pub use config::{ConfigError, WorldConfig};
pub use ids::IdAllocator;
pub use registry::{
    CellTransition, Entity, EntityRegistry, RegistryError, RegistrySnapshot, Surroundings,
};
pub use spawn::{splitmix64, SpawnArea, SpawnPicker};

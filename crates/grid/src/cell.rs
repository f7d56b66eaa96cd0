use std::fmt;

use aoiworld_common::EntityId;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::GridError;

/// Row-major cell identifier: `row * cols + col`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub u32);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open rectangle `[min_x, max_x) x [min_z, max_z)` covered by a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellBounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_z: i32,
    pub max_z: i32,
}

impl CellBounds {
    pub fn contains(&self, x: f32, z: f32) -> bool {
        let (x, z) = (f64::from(x), f64::from(z));
        x >= f64::from(self.min_x)
            && x < f64::from(self.max_x)
            && z >= f64::from(self.min_z)
            && z < f64::from(self.max_z)
    }

    pub fn area(&self) -> i64 {
        (i64::from(self.max_x) - i64::from(self.min_x)) * (i64::from(self.max_z) - i64::from(self.min_z))
    }

    /// True when the two rectangles share any interior area.
    pub fn overlaps(&self, other: &CellBounds) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_z < other.max_z
            && other.min_z < self.max_z
    }
}

/// A single grid square and the entities currently standing in it.
///
/// The member set sits behind a lock owned by this cell alone, so mutations
/// of unrelated cells never contend.
pub struct Cell {
    id: CellId,
    bounds: CellBounds,
    members: RwLock<FxHashSet<EntityId>>,
}

impl Cell {
    pub fn new(id: CellId, bounds: CellBounds) -> Self {
        Self {
            id,
            bounds,
            members: RwLock::new(FxHashSet::default()),
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn bounds(&self) -> CellBounds {
        self.bounds
    }

    /// Insert an entity. Idempotent; returns `true` if it was not already present.
    pub fn add(&self, entity: EntityId) -> bool {
        self.members.write().insert(entity)
    }

    /// Remove an entity, failing if it is not a member.
    pub fn remove(&self, entity: EntityId) -> Result<(), GridError> {
        if self.members.write().remove(&entity) {
            Ok(())
        } else {
            Err(GridError::MemberNotFound {
                entity,
                cell: self.id,
            })
        }
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.members.read().contains(&entity)
    }

    /// Copy of the current members. The lock is released before returning.
    pub fn snapshot(&self) -> Vec<EntityId> {
        self.members.read().iter().copied().collect()
    }

    /// Append the current members to `out` under a single read lock.
    pub fn collect_into(&self, out: &mut Vec<EntityId>) {
        out.extend(self.members.read().iter().copied());
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.id)
            .field("bounds", &self.bounds)
            .field("members", &self.len())
            .finish()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut members = self.snapshot();
        members.sort();
        let members: Vec<String> = members.iter().map(ToString::to_string).collect();
        write!(
            f,
            "Cell {} x[{}, {}) z[{}, {}) members=[{}]",
            self.id,
            self.bounds.min_x,
            self.bounds.max_x,
            self.bounds.min_z,
            self.bounds.max_z,
            members.join(", ")
        )
    }
}

use aoiworld_common::{ConnectionId, EntityId, Pose};
use aoiworld_grid::{CellId, GridConfig, GridError, SpatialIndex};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ids::IdAllocator;

/// A live participant tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub connection: ConnectionId,
    pub pose: Pose,
}

/// Cells an entity left and entered during a position update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellTransition {
    pub from: CellId,
    pub to: CellId,
}

impl CellTransition {
    /// Whether the update moved the entity into a different cell.
    pub fn crossed(&self) -> bool {
        self.from != self.to
    }
}

/// An entity together with everything in its 3x3 neighborhood, captured at
/// one instant. `neighbors` never includes the entity itself.
#[derive(Debug, Clone)]
pub struct Surroundings {
    pub entity: Entity,
    pub neighbors: Vec<Entity>,
}

/// Consistent copy of the registry and of every cell's membership.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub grid: GridConfig,
    /// Sorted by id.
    pub entities: Vec<Entity>,
    /// `(cell, members)` for every cell, in cell id order.
    pub cells: Vec<(CellId, Vec<EntityId>)>,
}

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("entity {0} not found")]
    NotFound(EntityId),
    #[error("entity {0} is already registered")]
    AlreadyRegistered(EntityId),
    #[error("entity id space exhausted")]
    IdsExhausted,
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Authoritative map of live entities, kept in lockstep with the grid.
///
/// Every mutation holds the registry write lock across its whole cell
/// membership sequence, so a reader going through the registry sees each
/// entity in exactly one cell: the one containing its committed pose.
/// Lock order is always registry, then cell.
pub struct EntityRegistry {
    index: SpatialIndex,
    ids: IdAllocator,
    entities: RwLock<FxHashMap<EntityId, Entity>>,
}

impl EntityRegistry {
    pub fn new(index: SpatialIndex, ids: IdAllocator) -> Self {
        Self {
            index,
            ids,
            entities: RwLock::new(FxHashMap::default()),
        }
    }

    /// Registry over a fresh index built from `config`, ids starting at 1.
    pub fn with_config(config: GridConfig) -> Result<Self, RegistryError> {
        Ok(Self::new(SpatialIndex::new(config)?, IdAllocator::new()))
    }

    /// Read-only access to the grid. Mutating membership directly bypasses
    /// the registry's consistency guarantees.
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.read().contains_key(&id)
    }

    /// Allocate a fresh id for `connection` and register it at `pose`.
    ///
    /// The pose is checked before an id is spent. Ids already taken through
    /// [`register`](Self::register) are skipped.
    pub fn spawn(&self, connection: ConnectionId, pose: Pose) -> Result<Entity, RegistryError> {
        let (x, z) = pose.ground();
        let cell = self.index.cell_id_for(x, z)?;

        let mut entities = self.entities.write();
        let id = loop {
            let id = self.ids.allocate().ok_or(RegistryError::IdsExhausted)?;
            if !entities.contains_key(&id) {
                break id;
            }
            tracing::debug!(entity = %id, "skipping id taken by an explicit registration");
        };
        let entity = Entity {
            id,
            connection,
            pose,
        };
        self.insert_locked(&mut entities, entity, cell)?;
        Ok(entity)
    }

    /// Insert an entity with a caller-chosen id into the id map and into the
    /// cell matching its pose.
    pub fn register(&self, entity: Entity) -> Result<CellId, RegistryError> {
        let (x, z) = entity.pose.ground();
        let cell = self.index.cell_id_for(x, z)?;

        let mut entities = self.entities.write();
        if entities.contains_key(&entity.id) {
            return Err(RegistryError::AlreadyRegistered(entity.id));
        }
        self.insert_locked(&mut entities, entity, cell)?;
        Ok(cell)
    }

    /// Remove an entity from its cell and then from the id map.
    ///
    /// Unknown ids are a no-op, so duplicate disconnects are harmless.
    pub fn unregister(&self, id: EntityId) -> Option<Entity> {
        let mut entities = self.entities.write();
        let removed = self.remove_locked(&mut entities, id);
        drop(entities);

        if removed.is_none() {
            tracing::debug!(entity = %id, "unregister of unknown entity ignored");
        }
        removed
    }

    /// Like [`unregister`](Self::unregister), but first captures the
    /// neighborhood of the entity's last position. Both happen under one
    /// write lock, so the witnesses are exactly those who could see it.
    pub fn depart(&self, id: EntityId) -> Option<Surroundings> {
        let mut entities = self.entities.write();
        let surroundings = match self.surroundings_locked(&entities, id) {
            Ok(s) => s,
            Err(err) => {
                tracing::debug!(entity = %id, %err, "departure of unknown entity ignored");
                return None;
            }
        };
        self.remove_locked(&mut entities, id);
        Some(surroundings)
    }

    /// Commit a new pose, moving the entity between cells when needed.
    ///
    /// This is the only path that changes a registered entity's position.
    /// An out-of-bounds pose is refused and leaves the entity untouched.
    pub fn update_position(&self, id: EntityId, pose: Pose) -> Result<CellTransition, RegistryError> {
        let (x, z) = pose.ground();
        let to = self.index.cell_id_for(x, z)?;

        let mut entities = self.entities.write();
        let entity = entities.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        let (old_x, old_z) = entity.pose.ground();
        let from = self.index.cell_id_for(old_x, old_z)?;

        if from != to {
            if let Err(err) = self.index.remove_member(id, from) {
                tracing::warn!(entity = %id, %err, "stale membership while moving");
            }
            self.index.add_member(id, to)?;
        }
        entity.pose = pose;
        drop(entities);

        let transition = CellTransition { from, to };
        if transition.crossed() {
            tracing::trace!(entity = %id, %from, %to, "entity changed cell");
        }
        Ok(transition)
    }

    pub fn get(&self, id: EntityId) -> Option<Entity> {
        self.entities.read().get(&id).copied()
    }

    /// Copy of every live entity, sorted by id.
    pub fn all(&self) -> Vec<Entity> {
        let mut all: Vec<Entity> = self.entities.read().values().copied().collect();
        all.sort_by_key(|e| e.id);
        all
    }

    /// Cell holding the entity's committed position.
    pub fn cell_of(&self, id: EntityId) -> Option<CellId> {
        let entity = self.get(id)?;
        let (x, z) = entity.pose.ground();
        self.index.cell_id_for(x, z).ok()
    }

    /// Ids in the 3x3 neighborhood of `(x, z)`.
    pub fn members_near(&self, x: f32, z: f32) -> Result<Vec<EntityId>, RegistryError> {
        let _entities = self.entities.read();
        Ok(self.index.members_near(x, z)?)
    }

    /// Entities visible from `pose`, optionally leaving one out.
    pub fn visible_from(&self, pose: &Pose, exclude: Option<EntityId>) -> Result<Vec<Entity>, RegistryError> {
        let entities = self.entities.read();
        let (x, z) = pose.ground();
        let ids = self.index.members_near(x, z)?;
        Ok(resolve(&entities, ids, exclude))
    }

    /// The entity and its current neighborhood, read under one lock.
    pub fn surroundings(&self, id: EntityId) -> Result<Surroundings, RegistryError> {
        let entities = self.entities.read();
        self.surroundings_locked(&entities, id)
    }

    /// Consistent copy of the registry and every cell's members.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let entities = self.entities.read();
        let mut all: Vec<Entity> = entities.values().copied().collect();
        all.sort_by_key(|e| e.id);
        let cells = self
            .index
            .cells()
            .iter()
            .map(|cell| {
                let mut members = cell.snapshot();
                members.sort();
                (cell.id(), members)
            })
            .collect();
        RegistrySnapshot {
            grid: *self.index.config(),
            entities: all,
            cells,
        }
    }

    fn surroundings_locked(
        &self,
        entities: &FxHashMap<EntityId, Entity>,
        id: EntityId,
    ) -> Result<Surroundings, RegistryError> {
        let entity = *entities.get(&id).ok_or(RegistryError::NotFound(id))?;
        let (x, z) = entity.pose.ground();
        let ids = self.index.members_near(x, z)?;
        Ok(Surroundings {
            entity,
            neighbors: resolve(entities, ids, Some(id)),
        })
    }

    fn insert_locked(
        &self,
        entities: &mut FxHashMap<EntityId, Entity>,
        entity: Entity,
        cell: CellId,
    ) -> Result<(), RegistryError> {
        self.index.add_member(entity.id, cell)?;
        entities.insert(entity.id, entity);
        let (x, z) = entity.pose.ground();
        tracing::debug!(entity = %entity.id, %cell, x, z, "entity registered");
        Ok(())
    }

    fn remove_locked(&self, entities: &mut FxHashMap<EntityId, Entity>, id: EntityId) -> Option<Entity> {
        let entity = *entities.get(&id)?;
        let (x, z) = entity.pose.ground();
        match self.index.cell_id_for(x, z) {
            Ok(cell) => {
                if let Err(err) = self.index.remove_member(id, cell) {
                    tracing::warn!(entity = %id, %err, "entity missing from its cell on removal");
                }
            }
            Err(err) => tracing::warn!(entity = %id, %err, "entity held an unindexable position"),
        }
        entities.remove(&id);
        tracing::debug!(entity = %id, "entity unregistered");
        Some(entity)
    }
}

fn resolve(
    entities: &FxHashMap<EntityId, Entity>,
    ids: Vec<EntityId>,
    exclude: Option<EntityId>,
) -> Vec<Entity> {
    let mut resolved: Vec<Entity> = ids
        .into_iter()
        .filter(|id| Some(*id) != exclude)
        .filter_map(|id| entities.get(&id).copied())
        .collect();
    resolved.sort_by_key(|e| e.id);
    resolved
}

use std::collections::BTreeMap;

use aoiworld_common::{ConnectionId, EntityId};
use aoiworld_grid::{CellId, GridError, SpatialIndex};
use aoiworld_kernel::{EntityRegistry, RegistrySnapshot};
use serde::Serialize;

/// World inspector for developer tooling.
///
/// Works on a [`RegistrySnapshot`] so every view of one call agrees with the
/// others.
pub struct WorldInspector;

impl WorldInspector {
    /// Produce a summary of the world state.
    pub fn summary(snapshot: &RegistrySnapshot) -> WorldSummary {
        let grid = snapshot.grid;
        let busiest = snapshot
            .cells
            .iter()
            .filter(|(_, members)| !members.is_empty())
            .max_by_key(|(id, members)| (members.len(), std::cmp::Reverse(*id)))
            .map(|(id, members)| (*id, members.len()));
        WorldSummary {
            entities: snapshot.entities.len(),
            cols: grid.cols,
            rows: grid.rows,
            cell_width: grid.cell_width(),
            cell_height: grid.cell_height(),
            occupied_cells: snapshot
                .cells
                .iter()
                .filter(|(_, members)| !members.is_empty())
                .count(),
            busiest_cell: busiest.map(|(id, _)| id),
            busiest_count: busiest.map_or(0, |(_, n)| n),
        }
    }

    /// Member count per cell, indexed by cell id.
    pub fn occupancy(snapshot: &RegistrySnapshot) -> Vec<usize> {
        snapshot.cells.iter().map(|(_, members)| members.len()).collect()
    }

    /// One line per grid row, lowest z first. Empty cells print as `.`,
    /// counts above 99 as `++`.
    pub fn occupancy_map(snapshot: &RegistrySnapshot) -> String {
        let cols = snapshot.grid.cols.max(1) as usize;
        let counts = Self::occupancy(snapshot);
        let mut out = String::new();
        for row in counts.chunks(cols) {
            for (i, n) in row.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                match *n {
                    0 => out.push_str(" ."),
                    n if n > 99 => out.push_str("++"),
                    n => out.push_str(&format!("{n:>2}")),
                }
            }
            out.push('\n');
        }
        out
    }

    /// Check that every entity sits in exactly the cell containing its pose
    /// and that no cell holds an unknown id. An empty result means the
    /// snapshot is consistent.
    pub fn audit(snapshot: &RegistrySnapshot) -> Vec<Violation> {
        let index = match SpatialIndex::new(snapshot.grid) {
            Ok(index) => index,
            Err(err) => return vec![Violation::Geometry(err)],
        };

        let mut found: BTreeMap<EntityId, Vec<CellId>> = snapshot
            .entities
            .iter()
            .map(|e| (e.id, Vec::new()))
            .collect();
        let mut violations = Vec::new();

        for (cell, members) in &snapshot.cells {
            for member in members {
                match found.get_mut(member) {
                    Some(cells) => cells.push(*cell),
                    None => violations.push(Violation::Orphan {
                        entity: *member,
                        cell: *cell,
                    }),
                }
            }
        }

        for entity in &snapshot.entities {
            let (x, z) = entity.pose.ground();
            let expected = match index.cell_id_for(x, z) {
                Ok(cell) => cell,
                Err(_) => {
                    violations.push(Violation::Unindexable { entity: entity.id });
                    continue;
                }
            };
            let cells = found.remove(&entity.id).unwrap_or_default();
            match cells.as_slice() {
                [] => violations.push(Violation::Missing {
                    entity: entity.id,
                    expected,
                }),
                [only] if *only != expected => violations.push(Violation::Misplaced {
                    entity: entity.id,
                    expected,
                    found: *only,
                }),
                [_] => {}
                _ => violations.push(Violation::Duplicated {
                    entity: entity.id,
                    cells,
                }),
            }
        }

        if !violations.is_empty() {
            tracing::warn!(count = violations.len(), "membership audit failed");
        }
        violations
    }

    /// Details for one live entity.
    pub fn inspect_entity(registry: &EntityRegistry, id: EntityId) -> Option<EntityInfo> {
        let surroundings = registry.surroundings(id).ok()?;
        let entity = surroundings.entity;
        let (x, z) = entity.pose.ground();
        let cell = registry.index().cell_id_for(x, z).ok()?;
        let p = entity.pose.position;
        Some(EntityInfo {
            id,
            connection: entity.connection,
            position: [p.x, p.y, p.z],
            facing: entity.pose.facing,
            cell,
            neighbors: surroundings.neighbors.len(),
        })
    }
}

/// Summary of world state for the inspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldSummary {
    pub entities: usize,
    pub cols: u32,
    pub rows: u32,
    pub cell_width: i32,
    pub cell_height: i32,
    pub occupied_cells: usize,
    pub busiest_cell: Option<CellId>,
    pub busiest_count: usize,
}

impl std::fmt::Display for WorldSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "World: entities={} grid={}x{} cells of {}x{} occupied={}",
            self.entities,
            self.cols,
            self.rows,
            self.cell_width,
            self.cell_height,
            self.occupied_cells
        )?;
        if let Some(cell) = self.busiest_cell {
            write!(f, " busiest=cell {cell} ({})", self.busiest_count)?;
        }
        Ok(())
    }
}

/// Detailed info about a single entity.
#[derive(Debug, Clone, Serialize)]
pub struct EntityInfo {
    pub id: EntityId,
    pub connection: ConnectionId,
    pub position: [f32; 3],
    pub facing: f32,
    pub cell: CellId,
    pub neighbors: usize,
}

impl std::fmt::Display for EntityInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Entity {} {} pos=({:.2}, {:.2}, {:.2}) facing={:.1} cell={} neighbors={}",
            self.id,
            self.connection,
            self.position[0],
            self.position[1],
            self.position[2],
            self.facing,
            self.cell,
            self.neighbors,
        )
    }
}

/// A broken membership rule found by [`WorldInspector::audit`].
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// Registered but in no cell.
    Missing { entity: EntityId, expected: CellId },
    /// Registered and in more than one cell.
    Duplicated { entity: EntityId, cells: Vec<CellId> },
    /// In one cell, but not the one containing its pose.
    Misplaced {
        entity: EntityId,
        expected: CellId,
        found: CellId,
    },
    /// A cell member the registry does not know.
    Orphan { entity: EntityId, cell: CellId },
    /// Registered with a pose outside the world.
    Unindexable { entity: EntityId },
    /// The snapshot's grid does not describe a valid partition.
    Geometry(GridError),
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing { entity, expected } => {
                write!(f, "{entity} is in no cell, expected cell {expected}")
            }
            Self::Duplicated { entity, cells } => {
                write!(f, "{entity} is in {} cells: {cells:?}", cells.len())
            }
            Self::Misplaced {
                entity,
                expected,
                found,
            } => write!(f, "{entity} is in cell {found}, expected cell {expected}"),
            Self::Orphan { entity, cell } => write!(f, "cell {cell} holds unknown {entity}"),
            Self::Unindexable { entity } => write!(f, "{entity} has a position outside the world"),
            Self::Geometry(err) => write!(f, "bad grid: {err}"),
        }
    }
}

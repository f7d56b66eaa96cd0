use std::fmt;

use aoiworld_common::EntityId;

use crate::cell::{Cell, CellBounds, CellId};
use crate::config::GridConfig;
use crate::GridError;

/// Fixed uniform grid over the world bounds.
///
/// Maps ground-plane coordinates to cells and cells to their 3x3
/// neighborhood. The set of cells never changes after construction; only the
/// membership inside each cell does, under that cell's own lock.
pub struct SpatialIndex {
    config: GridConfig,
    cell_width: i32,
    cell_height: i32,
    cells: Vec<Cell>,
}

impl SpatialIndex {
    /// Build every cell of a validated grid.
    pub fn new(config: GridConfig) -> Result<Self, GridError> {
        config.validate()?;

        let cell_width = config.cell_width();
        let cell_height = config.cell_height();
        let mut cells = Vec::with_capacity(config.cell_count() as usize);
        for row in 0..config.rows {
            for col in 0..config.cols {
                let id = CellId(row * config.cols + col);
                let min_x = config.min_x + col as i32 * cell_width;
                let min_z = config.min_z + row as i32 * cell_height;
                cells.push(Cell::new(
                    id,
                    CellBounds {
                        min_x,
                        max_x: min_x + cell_width,
                        min_z,
                        max_z: min_z + cell_height,
                    },
                ));
            }
        }

        tracing::debug!(
            cols = config.cols,
            rows = config.rows,
            cell_width,
            cell_height,
            "spatial index built"
        );

        Ok(Self {
            config,
            cell_width,
            cell_height,
            cells,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id.0 as usize)
    }

    /// All cells in id order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Cell containing the ground-plane point `(x, z)`.
    ///
    /// Positions outside `[min_x, max_x) x [min_z, max_z)` are rejected rather
    /// than clamped.
    pub fn cell_id_for(&self, x: f32, z: f32) -> Result<CellId, GridError> {
        let c = &self.config;
        // f64 holds every i32 exactly; f32 does not past 2^24.
        let (px, pz) = (f64::from(x), f64::from(z));
        let inside = x.is_finite()
            && z.is_finite()
            && px >= f64::from(c.min_x)
            && px < f64::from(c.max_x)
            && pz >= f64::from(c.min_z)
            && pz < f64::from(c.max_z);
        if !inside {
            return Err(GridError::OutOfRange { x, z });
        }

        let col = ((px - f64::from(c.min_x)) / f64::from(self.cell_width)).floor() as i64;
        let row = ((pz - f64::from(c.min_z)) / f64::from(self.cell_height)).floor() as i64;
        if !(0..i64::from(c.cols)).contains(&col) || !(0..i64::from(c.rows)).contains(&row) {
            return Err(GridError::OutOfRange { x, z });
        }
        let id = row as u64 * u64::from(c.cols) + col as u64;
        u32::try_from(id)
            .map(CellId)
            .map_err(|_| GridError::OutOfRange { x, z })
    }

    /// The cell itself plus every edge or corner neighbor inside the grid.
    ///
    /// Unknown ids yield an empty neighborhood.
    pub fn neighbors_of(&self, id: CellId) -> Vec<CellId> {
        if self.cell(id).is_none() {
            return Vec::new();
        }

        let cols = i64::from(self.config.cols);
        let rows = i64::from(self.config.rows);
        let col = i64::from(id.0) % cols;
        let row = i64::from(id.0) / cols;

        let mut neighbors = Vec::with_capacity(9);
        neighbors.push(id);
        for dr in -1..=1 {
            for dc in -1..=1 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let (r, c) = (row + dr, col + dc);
                if (0..rows).contains(&r) && (0..cols).contains(&c) {
                    neighbors.push(CellId((r * cols + c) as u32));
                }
            }
        }
        neighbors
    }

    /// Every entity in the 3x3 neighborhood of the cell containing `(x, z)`.
    pub fn members_near(&self, x: f32, z: f32) -> Result<Vec<EntityId>, GridError> {
        let center = self.cell_id_for(x, z)?;
        let mut members = Vec::new();
        for id in self.neighbors_of(center) {
            if let Some(cell) = self.cell(id) {
                cell.collect_into(&mut members);
            }
        }
        Ok(members)
    }

    /// Entities in one cell.
    pub fn members_of(&self, id: CellId) -> Result<Vec<EntityId>, GridError> {
        self.cell(id)
            .map(Cell::snapshot)
            .ok_or(GridError::UnknownCell(id))
    }

    pub fn add_member(&self, entity: EntityId, id: CellId) -> Result<(), GridError> {
        let cell = self.cell(id).ok_or(GridError::UnknownCell(id))?;
        cell.add(entity);
        Ok(())
    }

    pub fn remove_member(&self, entity: EntityId, id: CellId) -> Result<(), GridError> {
        self.cell(id).ok_or(GridError::UnknownCell(id))?.remove(entity)
    }

    /// Total membership across all cells.
    pub fn total_members(&self) -> usize {
        self.cells.iter().map(Cell::len).sum()
    }
}

impl fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("config", &self.config)
            .field("cell_width", &self.cell_width)
            .field("cell_height", &self.cell_height)
            .field("cells", &self.cells.len())
            .finish()
    }
}

impl fmt::Display for SpatialIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.config;
        writeln!(
            f,
            "SpatialIndex: x[{}, {}) z[{}, {}) {}x{} cells of {}x{}",
            c.min_x, c.max_x, c.min_z, c.max_z, c.cols, c.rows, self.cell_width, self.cell_height
        )?;
        for cell in &self.cells {
            writeln!(f, "  {cell}")?;
        }
        Ok(())
    }
}

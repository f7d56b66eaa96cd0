use serde::{Deserialize, Serialize};

use crate::GridError;

/// World bounds and grid resolution, fixed for the lifetime of an index.
///
/// The grid spans `[min_x, max_x)` by `[min_z, max_z)` on the ground plane and
/// is cut into `cols` by `rows` equal cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub min_x: i32,
    pub max_x: i32,
    pub min_z: i32,
    pub max_z: i32,
    pub cols: u32,
    pub rows: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            min_x: 0,
            max_x: 250,
            min_z: 0,
            max_z: 250,
            cols: 5,
            rows: 5,
        }
    }
}

impl GridConfig {
    /// Extent along x.
    pub fn width(&self) -> i64 {
        i64::from(self.max_x) - i64::from(self.min_x)
    }

    /// Extent along z.
    pub fn height(&self) -> i64 {
        i64::from(self.max_z) - i64::from(self.min_z)
    }

    /// Width of a single cell. Only meaningful on a validated config.
    pub fn cell_width(&self) -> i32 {
        (self.width() / i64::from(self.cols.max(1))) as i32
    }

    /// Height of a single cell. Only meaningful on a validated config.
    pub fn cell_height(&self) -> i32 {
        (self.height() / i64::from(self.rows.max(1))) as i32
    }

    pub fn cell_count(&self) -> u32 {
        self.cols.saturating_mul(self.rows)
    }

    /// Reject configurations that would produce empty, uneven, or
    /// unaddressable cells.
    pub fn validate(&self) -> Result<(), GridError> {
        let degenerate = |reason: String| Err(GridError::Degenerate { reason });

        if self.width() <= 0 || self.height() <= 0 {
            return degenerate(format!(
                "empty world bounds x[{}, {}) z[{}, {})",
                self.min_x, self.max_x, self.min_z, self.max_z
            ));
        }
        if self.width() > i64::from(i32::MAX) || self.height() > i64::from(i32::MAX) {
            return degenerate("world extent does not fit in i32".into());
        }
        if self.cols == 0 || self.rows == 0 {
            return degenerate(format!("resolution {}x{} has no cells", self.cols, self.rows));
        }
        if i64::from(self.cols) > self.width() || i64::from(self.rows) > self.height() {
            return degenerate(format!(
                "resolution {}x{} yields zero-sized cells for a {}x{} world",
                self.cols,
                self.rows,
                self.width(),
                self.height()
            ));
        }
        if self.width() % i64::from(self.cols) != 0 || self.height() % i64::from(self.rows) != 0 {
            return degenerate(format!(
                "resolution {}x{} does not evenly divide a {}x{} world",
                self.cols,
                self.rows,
                self.width(),
                self.height()
            ));
        }
        if self.cols.checked_mul(self.rows).is_none() {
            return degenerate("cell count overflows u32".into());
        }
        Ok(())
    }
}

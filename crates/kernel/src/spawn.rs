use aoiworld_common::Pose;
use aoiworld_grid::GridConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Rectangle on the ground plane where newly connected entities appear.
///
/// Start positions are integer offsets in `[min_x, max_x) x [min_z, max_z)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnArea {
    pub min_x: i32,
    pub max_x: i32,
    pub min_z: i32,
    pub max_z: i32,
    pub elevation: f32,
}

impl Default for SpawnArea {
    fn default() -> Self {
        Self {
            min_x: 160,
            max_x: 170,
            min_z: 140,
            max_z: 160,
            elevation: 0.0,
        }
    }
}

impl SpawnArea {
    pub fn is_empty(&self) -> bool {
        self.max_x <= self.min_x || self.max_z <= self.min_z
    }

    /// True when every possible start position lies inside the grid.
    pub fn fits(&self, grid: &GridConfig) -> bool {
        !self.is_empty()
            && self.min_x >= grid.min_x
            && self.max_x <= grid.max_x
            && self.min_z >= grid.min_z
            && self.max_z <= grid.max_z
    }
}

/// Deterministic start-position generator over a [`SpawnArea`].
///
/// Shared between connection workers; each draw advances one seeded
/// splitmix64 stream so a given seed always yields the same sequence.
#[derive(Debug)]
pub struct SpawnPicker {
    area: SpawnArea,
    state: Mutex<u64>,
}

impl SpawnPicker {
    pub fn new(area: SpawnArea, seed: u64) -> Self {
        Self {
            area,
            state: Mutex::new(seed),
        }
    }

    pub fn area(&self) -> &SpawnArea {
        &self.area
    }

    pub fn next_pose(&self) -> Pose {
        let (a, b) = {
            let mut state = self.state.lock();
            *state = splitmix64(*state);
            let a = *state;
            *state = splitmix64(*state);
            (a, *state)
        };
        let x = offset(self.area.min_x, self.area.max_x, a);
        let z = offset(self.area.min_z, self.area.max_z, b);
        Pose::new(x, self.area.elevation, z, 0.0)
    }
}

fn offset(min: i32, max: i32, roll: u64) -> f32 {
    let span = (i64::from(max) - i64::from(min)).max(1) as u64;
    (i64::from(min) + (roll % span) as i64) as f32
}

/// Splitmix64 step: advances `state` and returns a well-mixed 64-bit value.
pub fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

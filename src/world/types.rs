//! Geometry and map types shared by the managers and the task variants.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Occupancy values at or above this are treated as blocked.
pub const OCCUPIED_THRESHOLD: i8 = 50;

/// A planar position in map coordinates (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A robot or model pose. Orientation is a yaw angle around z.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub yaw: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, z: 0.0, yaw }
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }

    /// Keep-clear circle of `radius` around this pose.
    pub fn forbidden_zone(&self, radius: f64) -> ForbiddenZone {
        ForbiddenZone {
            x: self.x,
            y: self.y,
            radius,
        }
    }
}

/// A circular region obstacles must not be placed inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForbiddenZone {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl ForbiddenZone {
    /// Whether a circle of `clearance` around `pos` intersects this zone.
    pub fn overlaps(&self, pos: &Position, clearance: f64) -> bool {
        Position::new(self.x, self.y).distance(pos) < self.radius + clearance
    }
}

/// An occupancy grid snapshot, row-major from the bottom-left origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyGrid {
    pub width: usize,
    pub height: usize,
    /// Metres per cell.
    pub resolution: f64,
    /// World position of cell (0, 0).
    pub origin: Position,
    /// `-1` unknown, `0` free, `>= OCCUPIED_THRESHOLD` occupied.
    pub data: Vec<i8>,
}

impl OccupancyGrid {
    /// An open rectangular room with a one-cell wall around the border.
    pub fn walled_room(width: usize, height: usize, resolution: f64) -> Self {
        let mut data = vec![0i8; width * height];
        for row in 0..height {
            for col in 0..width {
                if row == 0 || col == 0 || row + 1 == height || col + 1 == width {
                    data[row * width + col] = 100;
                }
            }
        }
        Self {
            width,
            height,
            resolution,
            origin: Position::default(),
            data,
        }
    }

    /// Cell containing a world position, if it lies on the map.
    pub fn world_to_cell(&self, pos: &Position) -> Option<(usize, usize)> {
        let col = ((pos.x - self.origin.x) / self.resolution).floor();
        let row = ((pos.y - self.origin.y) / self.resolution).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        (col < self.width && row < self.height).then_some((col, row))
    }

    /// World position of a cell centre.
    pub fn cell_center(&self, col: usize, row: usize) -> Position {
        Position::new(
            self.origin.x + (col as f64 + 0.5) * self.resolution,
            self.origin.y + (row as f64 + 0.5) * self.resolution,
        )
    }

    fn cell_free(&self, col: usize, row: usize) -> bool {
        self.data
            .get(row * self.width + col)
            .is_some_and(|value| (0..OCCUPIED_THRESHOLD).contains(value))
    }

    /// Whether every cell within `clearance` of `pos` is known and free.
    pub fn is_free(&self, pos: &Position, clearance: f64) -> bool {
        let Some((col, row)) = self.world_to_cell(pos) else {
            return false;
        };
        let reach = (clearance / self.resolution).ceil() as isize;
        for dr in -reach..=reach {
            for dc in -reach..=reach {
                let (c, r) = (col as isize + dc, row as isize + dr);
                if c < 0 || r < 0 || c as usize >= self.width || r as usize >= self.height {
                    return false;
                }
                if !self.cell_free(c as usize, r as usize) {
                    return false;
                }
            }
        }
        true
    }

    /// Draw a random free position with the given clearance.
    ///
    /// Gives up after `samples` draws.
    pub fn sample_free<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        clearance: f64,
        samples: usize,
        accept: impl Fn(&Position) -> bool,
    ) -> Option<Position> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        (0..samples).find_map(|_| {
            let pos = self.cell_center(rng.gen_range(0..self.width), rng.gen_range(0..self.height));
            (self.is_free(&pos, clearance) && accept(&pos)).then_some(pos)
        })
    }
}

/// A pedestrian agent definition as spawned into the crowd simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PedestrianAgent {
    pub id: u32,
    #[serde(default = "default_agent_kind")]
    pub kind: String,
    pub position: Position,
    #[serde(default)]
    pub waypoints: Vec<Position>,
    #[serde(default = "default_vmax")]
    pub vmax: f64,
}

fn default_agent_kind() -> String {
    "adult".to_string()
}

fn default_vmax() -> f64 {
    1.0
}

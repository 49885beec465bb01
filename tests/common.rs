//! Test fixtures for localization scenarios.
//!
//! Provides a dense occupancy grid with the three-state cell convention
//! (free / unknown / occupied) so tests can carve rooms and corridors.

#![allow(dead_code)]

use disha_mcl::OccupancyMap;

/// Cell known to be free space.
pub const CELL_FREE: i8 = -1;
/// Cell never observed.
pub const CELL_UNKNOWN: i8 = 0;
/// Cell known to be occupied.
pub const CELL_OCCUPIED: i8 = 1;

/// Dense occupancy grid centered on the world origin.
pub struct GridMap {
    resolution: f32,
    width: usize,
    height: usize,
    cells: Vec<i8>,
}

impl GridMap {
    /// Grid with every cell in the given state.
    pub fn filled(width_m: f32, height_m: f32, resolution: f32, state: i8) -> Self {
        let width = (width_m / resolution).ceil() as usize;
        let height = (height_m / resolution).ceil() as usize;
        Self {
            resolution,
            width,
            height,
            cells: vec![state; width * height],
        }
    }

    /// Grid of entirely free space.
    pub fn open(width_m: f32, height_m: f32, resolution: f32) -> Self {
        Self::filled(width_m, height_m, resolution, CELL_FREE)
    }

    /// Grid of entirely unknown space.
    pub fn unknown(width_m: f32, height_m: f32, resolution: f32) -> Self {
        Self::filled(width_m, height_m, resolution, CELL_UNKNOWN)
    }

    /// Paint every cell inside the world-frame rectangle.
    pub fn fill_rect(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, state: i8) {
        let mut y = y0;
        while y <= y1 {
            let mut x = x0;
            while x <= x1 {
                if let Some(idx) = self.cell_index(x, y) {
                    self.cells[idx] = state;
                }
                x += self.resolution;
            }
            y += self.resolution;
        }
    }

    fn cell_index(&self, x: f32, y: f32) -> Option<usize> {
        let cx = ((x + self.width as f32 * self.resolution / 2.0) / self.resolution).floor();
        let cy = ((y + self.height as f32 * self.resolution / 2.0) / self.resolution).floor();
        if cx >= 0.0 && cy >= 0.0 {
            let cx = cx as usize;
            let cy = cy as usize;
            if cx < self.width && cy < self.height {
                return Some(cy * self.width + cx);
            }
        }
        None
    }
}

impl OccupancyMap for GridMap {
    fn world_width(&self) -> f32 {
        self.width as f32 * self.resolution
    }

    fn world_height(&self) -> f32 {
        self.height as f32 * self.resolution
    }

    fn contains(&self, x: f32, y: f32) -> bool {
        self.cell_index(x, y).is_some()
    }

    fn is_free(&self, x: f32, y: f32) -> bool {
        self.cell_index(x, y)
            .map(|idx| self.cells[idx] == CELL_FREE)
            .unwrap_or(false)
    }
}

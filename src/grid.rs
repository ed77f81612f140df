//! Uniform-bucket broad-phase index. Rebuilt at the start of every tick;
//! read-only for the rest of it. Consumers scan a 3x3 neighbourhood of
//! cells rather than querying a radius directly, matching the cheap
//! bucket-and-scan shape used by the aquarium's flocking grid.

use crate::math::Vec2;

#[derive(Debug, Clone, Copy)]
pub enum GridItem {
    SoftBodyPoint { body: u64, point_index: usize, pos: Vec2, radius: f32 },
    Particle { index: usize, pos: Vec2 },
}

impl GridItem {
    pub fn pos(&self) -> Vec2 {
        match self {
            GridItem::SoftBodyPoint { pos, .. } => *pos,
            GridItem::Particle { pos, .. } => *pos,
        }
    }
}

pub struct BroadPhaseGrid {
    cell_size: f32,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<GridItem>>,
}

impl BroadPhaseGrid {
    pub fn new(world_width: f32, world_height: f32, cell_size: f32) -> Self {
        let cols = (world_width / cell_size).ceil().max(1.0) as usize + 1;
        let rows = (world_height / cell_size).ceil().max(1.0) as usize + 1;
        Self {
            cell_size,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
        }
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    fn cell_coords(&self, pos: Vec2) -> Option<(usize, usize)> {
        if !pos.is_finite() {
            return None;
        }
        let col = (pos.x / self.cell_size).floor();
        let row = (pos.y / self.cell_size).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        if col >= self.cols || row >= self.rows {
            return None;
        }
        Some((col, row))
    }

    pub fn insert(&mut self, pos: Vec2, item: GridItem) {
        // Out-of-range positions are skipped silently per the broad-phase contract.
        if let Some((col, row)) = self.cell_coords(pos) {
            self.cells[row * self.cols + col].push(item);
        }
    }

    pub fn cell_of(&self, pos: Vec2) -> Option<(usize, usize)> {
        self.cell_coords(pos)
    }

    /// Iterate every item in the 3x3 neighbourhood of `pos`'s cell.
    pub fn neighbourhood(&self, pos: Vec2) -> Vec<GridItem> {
        let mut out = Vec::new();
        let Some((col, row)) = self.cell_coords(pos) else {
            return out;
        };
        let col = col as i64;
        let row = row as i64;
        for dr in -1..=1i64 {
            for dc in -1..=1i64 {
                let r = row + dr;
                let c = col + dc;
                if r < 0 || c < 0 || r as usize >= self.rows || c as usize >= self.cols {
                    continue;
                }
                out.extend_from_slice(&self.cells[r as usize * self.cols + c as usize]);
            }
        }
        out
    }

    pub fn contains_point(&self, pos: Vec2, body: u64, point_index: usize) -> bool {
        let Some((col, row)) = self.cell_coords(pos) else {
            return false;
        };
        self.cells[row * self.cols + col].iter().any(|item| {
            matches!(item, GridItem::SoftBodyPoint { body: b, point_index: p, .. } if *b == body && *p == point_index)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_point_is_found_in_its_own_cell() {
        let mut grid = BroadPhaseGrid::new(100.0, 100.0, 10.0);
        let pos = Vec2::new(25.0, 35.0);
        grid.insert(pos, GridItem::SoftBodyPoint { body: 1, point_index: 0, pos, radius: 5.0 });
        assert!(grid.contains_point(pos, 1, 0));
    }

    #[test]
    fn neighbourhood_covers_adjacent_cells() {
        let mut grid = BroadPhaseGrid::new(100.0, 100.0, 10.0);
        let pos = Vec2::new(21.0, 21.0);
        grid.insert(pos, GridItem::SoftBodyPoint { body: 1, point_index: 0, pos, radius: 5.0 });
        let found = grid.neighbourhood(Vec2::new(29.0, 29.0));
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn out_of_range_insert_is_skipped() {
        let mut grid = BroadPhaseGrid::new(100.0, 100.0, 10.0);
        grid.insert(Vec2::new(-5.0, -5.0), GridItem::Particle { index: 0, pos: Vec2::new(-5.0, -5.0) });
        grid.insert(Vec2::new(f32::NAN, 0.0), GridItem::Particle { index: 1, pos: Vec2::new(f32::NAN, 0.0) });
        let found = grid.neighbourhood(Vec2::new(5.0, 5.0));
        assert!(found.is_empty());
    }

    #[test]
    fn clear_empties_all_cells() {
        let mut grid = BroadPhaseGrid::new(100.0, 100.0, 10.0);
        grid.insert(Vec2::new(5.0, 5.0), GridItem::Particle { index: 0, pos: Vec2::new(5.0, 5.0) });
        grid.clear();
        assert!(grid.neighbourhood(Vec2::new(5.0, 5.0)).is_empty());
    }
}

use crate::world::position::Position;

/// Grids along one side of a map.
pub const MAX_NUMBER_OF_GRIDS: u32 = 64;
/// Cells along one side of a grid.
pub const MAX_NUMBER_OF_CELLS: u32 = 8;
pub const TOTAL_NUMBER_OF_CELLS_PER_MAP: u32 = MAX_NUMBER_OF_GRIDS * MAX_NUMBER_OF_CELLS;
pub const SIZE_OF_GRIDS: f64 = 533.333_333_3;
pub const SIZE_OF_GRID_CELL: f64 = SIZE_OF_GRIDS / MAX_NUMBER_OF_CELLS as f64;
/// World coordinates span `[-MAP_HALF_SIZE, MAP_HALF_SIZE)` on both axes.
pub const MAP_HALF_SIZE: f64 = SIZE_OF_GRIDS * (MAX_NUMBER_OF_GRIDS / 2) as f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoord {
    pub x: u32,
    pub y: u32,
}

/// Global cell address across the whole map, not local to one grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub x: u32,
    pub y: u32,
}

fn axis_index(value: f32, unit: f64, limit: u32) -> Option<u32> {
    if !value.is_finite() {
        return None;
    }
    let offset = (f64::from(value) + MAP_HALF_SIZE) / unit;
    if offset < 0.0 {
        return None;
    }
    let index = offset.floor();
    if index >= f64::from(limit) {
        return None;
    }
    Some(index as u32)
}

impl GridCoord {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn from_position(position: Position) -> Option<Self> {
        let x = axis_index(position.x, SIZE_OF_GRIDS, MAX_NUMBER_OF_GRIDS)?;
        let y = axis_index(position.y, SIZE_OF_GRIDS, MAX_NUMBER_OF_GRIDS)?;
        Some(Self { x, y })
    }

    pub fn from_id(id: u32) -> Option<Self> {
        let coord = Self {
            x: id % MAX_NUMBER_OF_GRIDS,
            y: id / MAX_NUMBER_OF_GRIDS,
        };
        coord.is_valid().then_some(coord)
    }

    pub fn is_valid(self) -> bool {
        self.x < MAX_NUMBER_OF_GRIDS && self.y < MAX_NUMBER_OF_GRIDS
    }

    /// Dense id used by respawn entries and persistence.
    pub fn id(self) -> u32 {
        self.y * MAX_NUMBER_OF_GRIDS + self.x
    }

    pub fn cell(self, local_x: u32, local_y: u32) -> CellCoord {
        CellCoord {
            x: self.x * MAX_NUMBER_OF_CELLS + local_x.min(MAX_NUMBER_OF_CELLS - 1),
            y: self.y * MAX_NUMBER_OF_CELLS + local_y.min(MAX_NUMBER_OF_CELLS - 1),
        }
    }

    pub fn center(self) -> Position {
        let x = (f64::from(self.x) + 0.5) * SIZE_OF_GRIDS - MAP_HALF_SIZE;
        let y = (f64::from(self.y) + 0.5) * SIZE_OF_GRIDS - MAP_HALF_SIZE;
        Position::new(x as f32, y as f32, 0.0)
    }
}

impl CellCoord {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn from_position(position: Position) -> Option<Self> {
        let x = axis_index(position.x, SIZE_OF_GRID_CELL, TOTAL_NUMBER_OF_CELLS_PER_MAP)?;
        let y = axis_index(position.y, SIZE_OF_GRID_CELL, TOTAL_NUMBER_OF_CELLS_PER_MAP)?;
        Some(Self { x, y })
    }

    pub fn is_valid(self) -> bool {
        self.x < TOTAL_NUMBER_OF_CELLS_PER_MAP && self.y < TOTAL_NUMBER_OF_CELLS_PER_MAP
    }

    pub fn grid(self) -> GridCoord {
        GridCoord {
            x: self.x / MAX_NUMBER_OF_CELLS,
            y: self.y / MAX_NUMBER_OF_CELLS,
        }
    }

    /// Offset of this cell inside its grid.
    pub fn local(self) -> (u32, u32) {
        (self.x % MAX_NUMBER_OF_CELLS, self.y % MAX_NUMBER_OF_CELLS)
    }

    pub fn center(self) -> Position {
        let x = (f64::from(self.x) + 0.5) * SIZE_OF_GRID_CELL - MAP_HALF_SIZE;
        let y = (f64::from(self.y) + 0.5) * SIZE_OF_GRID_CELL - MAP_HALF_SIZE;
        Position::new(x as f32, y as f32, 0.0)
    }
}

impl std::fmt::Display for GridCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "grid[{},{}]", self.x, self.y)
    }
}

impl std::fmt::Display for CellCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cell[{},{}]", self.x, self.y)
    }
}

/// Inclusive rectangle of cells, clamped to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellArea {
    pub low: CellCoord,
    pub high: CellCoord,
}

impl CellArea {
    pub fn around(center: CellCoord, radius_cells: u32) -> Self {
        let max = TOTAL_NUMBER_OF_CELLS_PER_MAP - 1;
        Self {
            low: CellCoord {
                x: center.x.saturating_sub(radius_cells),
                y: center.y.saturating_sub(radius_cells),
            },
            high: CellCoord {
                x: center.x.saturating_add(radius_cells).min(max),
                y: center.y.saturating_add(radius_cells).min(max),
            },
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        (self.low.y..=self.high.y)
            .flat_map(move |y| (self.low.x..=self.high.x).map(move |x| CellCoord { x, y }))
    }

    pub fn grids(&self) -> Vec<GridCoord> {
        let low = self.low.grid();
        let high = self.high.grid();
        let mut grids = Vec::new();
        for y in low.y..=high.y {
            for x in low.x..=high.x {
                grids.push(GridCoord { x, y });
            }
        }
        grids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_and_grid_agree() {
        let position = GridCoord::new(3, 3).center();
        let cell = CellCoord::from_position(position).expect("cell");
        assert_eq!(cell.grid(), GridCoord::new(3, 3));
        assert_eq!(GridCoord::from_position(position), Some(GridCoord::new(3, 3)));
    }

    #[test]
    fn off_map_positions_have_no_cell() {
        let edge = MAP_HALF_SIZE as f32 + 1.0;
        assert_eq!(CellCoord::from_position(Position::new(edge, 0.0, 0.0)), None);
        assert_eq!(CellCoord::from_position(Position::new(0.0, -edge, 0.0)), None);
        assert_eq!(CellCoord::from_position(Position::new(f32::NAN, 0.0, 0.0)), None);
    }

    #[test]
    fn cell_center_maps_back_to_same_cell() {
        for (x, y) in [(0, 0), (17, 300), (511, 511), (256, 3)] {
            let cell = CellCoord::new(x, y);
            assert_eq!(CellCoord::from_position(cell.center()), Some(cell));
        }
    }

    #[test]
    fn grid_id_roundtrip() {
        let coord = GridCoord::new(12, 40);
        assert_eq!(GridCoord::from_id(coord.id()), Some(coord));
        assert_eq!(GridCoord::from_id(MAX_NUMBER_OF_GRIDS * MAX_NUMBER_OF_GRIDS), None);
    }

    #[test]
    fn area_is_clamped_at_map_edge() {
        let area = CellArea::around(CellCoord::new(0, 0), 2);
        assert_eq!(area.low, CellCoord::new(0, 0));
        assert_eq!(area.high, CellCoord::new(2, 2));
        assert_eq!(area.cells().count(), 9);
        assert_eq!(area.grids(), vec![GridCoord::new(0, 0)]);
    }

    #[test]
    fn area_spanning_grid_border_lists_both_grids() {
        let border_cell = GridCoord::new(3, 3).cell(MAX_NUMBER_OF_CELLS - 1, 4);
        let area = CellArea::around(border_cell, 1);
        assert!(area.grids().contains(&GridCoord::new(3, 3)));
        assert!(area.grids().contains(&GridCoord::new(4, 3)));
    }
}

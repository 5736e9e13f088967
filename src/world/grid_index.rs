use crate::telemetry::logging;
use crate::world::cell::{GridCoord, MAX_NUMBER_OF_GRIDS};
use crate::world::grid::Grid;
use crate::world::terrain::{TerrainCache, TerrainData};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const TERRAIN_CACHE_GRIDS: usize = 256;

/// Dense 2-D array of grids for one map, created on demand.
pub struct GridIndex {
    map_id: u32,
    grids: Vec<Option<Box<Grid>>>,
    terrain: TerrainCache,
    unload_delay: Duration,
    created: usize,
}

impl GridIndex {
    pub fn new(map_id: u32, unload_delay: Duration, terrain_root: Option<PathBuf>) -> Self {
        let slots = (MAX_NUMBER_OF_GRIDS * MAX_NUMBER_OF_GRIDS) as usize;
        let mut grids = Vec::with_capacity(slots);
        grids.resize_with(slots, || None);
        Self {
            map_id,
            grids,
            terrain: TerrainCache::new(map_id, TERRAIN_CACHE_GRIDS, terrain_root),
            unload_delay,
            created: 0,
        }
    }

    fn slot(coord: GridCoord) -> usize {
        if !coord.is_valid() {
            panic!("invalid grid coordinate {}", coord);
        }
        coord.id() as usize
    }

    /// Idempotent. Returns true when the grid was allocated by this call.
    pub fn ensure_created(&mut self, coord: GridCoord) -> bool {
        let slot = Self::slot(coord);
        if self.grids[slot].is_some() {
            return false;
        }
        let terrain = match self.terrain.get(coord) {
            Ok(terrain) => terrain,
            Err(err) => {
                let msg = format!("worldgrid: terrain load failed for {}: {}", coord, err);
                eprintln!("{msg}");
                logging::log_error(self.map_id, &msg);
                Arc::new(TerrainData::flat())
            }
        };
        self.grids[slot] = Some(Box::new(Grid::new(coord, terrain, self.unload_delay)));
        self.created += 1;
        true
    }

    pub fn get(&self, coord: GridCoord) -> Option<&Grid> {
        if !coord.is_valid() {
            return None;
        }
        self.grids[coord.id() as usize].as_deref()
    }

    pub fn get_mut(&mut self, coord: GridCoord) -> Option<&mut Grid> {
        if !coord.is_valid() {
            return None;
        }
        self.grids[coord.id() as usize].as_deref_mut()
    }

    /// Like `get_mut` but a missing grid is a broken invariant.
    pub(crate) fn expect_mut(&mut self, coord: GridCoord) -> &mut Grid {
        match self.get_mut(coord) {
            Some(grid) => grid,
            None => panic!("{} is not created", coord),
        }
    }

    pub fn is_created(&self, coord: GridCoord) -> bool {
        self.get(coord).is_some()
    }

    pub fn is_loaded(&self, coord: GridCoord) -> bool {
        self.get(coord).map_or(false, Grid::is_objects_loaded)
    }

    pub(crate) fn destroy(&mut self, coord: GridCoord) -> Option<Box<Grid>> {
        let slot = Self::slot(coord);
        let grid = self.grids[slot].take();
        if grid.is_some() {
            self.created -= 1;
        }
        grid
    }

    /// Coordinates of every created grid, in id order.
    pub fn coords(&self) -> Vec<GridCoord> {
        self.grids
            .iter()
            .filter_map(|grid| grid.as_ref().map(|grid| grid.coord()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.created
    }

    pub fn is_empty(&self) -> bool {
        self.created == 0
    }

    pub fn terrain_cache(&self) -> &TerrainCache {
        &self.terrain
    }
}

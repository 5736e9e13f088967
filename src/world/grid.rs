use crate::entities::object::{ContainerKind, ObjectKey};
use crate::world::cell::{CellCoord, GridCoord, MAX_NUMBER_OF_CELLS};
use crate::world::terrain::TerrainData;
use crate::world::time::IntervalTimer;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a created grid. A grid that does not exist is the implicit `INVALID` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridState {
    Idle,
    Active,
    Removal,
}

impl GridState {
    fn allows(self, next: GridState) -> bool {
        matches!(
            (self, next),
            (GridState::Idle, GridState::Active)
                | (GridState::Active, GridState::Active)
                | (GridState::Active, GridState::Idle)
                | (GridState::Idle, GridState::Removal)
                | (GridState::Active, GridState::Removal)
        )
    }
}

/// What the owning map has to do after a grid's per-tick update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridAction {
    None,
    NotifyRelocations,
    Evict,
}

#[derive(Debug, Clone, Default)]
pub struct GridCell {
    grid_objects: Vec<ObjectKey>,
    world_objects: Vec<ObjectKey>,
}

impl GridCell {
    fn container_mut(&mut self, container: ContainerKind) -> &mut Vec<ObjectKey> {
        match container {
            ContainerKind::Grid => &mut self.grid_objects,
            ContainerKind::World => &mut self.world_objects,
        }
    }

    pub fn grid_objects(&self) -> &[ObjectKey] {
        &self.grid_objects
    }

    pub fn world_objects(&self) -> &[ObjectKey] {
        &self.world_objects
    }

    pub fn is_empty(&self) -> bool {
        self.grid_objects.is_empty() && self.world_objects.is_empty()
    }
}

#[derive(Debug)]
pub struct Grid {
    coord: GridCoord,
    state: GridState,
    cells: Vec<GridCell>,
    terrain: Arc<TerrainData>,
    expiry: IntervalTimer,
    unload_locks: u32,
    pinned: bool,
    objects_loaded: bool,
    blocking_residents: u32,
    residents: usize,
}

impl Grid {
    pub fn new(coord: GridCoord, terrain: Arc<TerrainData>, unload_delay: Duration) -> Self {
        Self {
            coord,
            state: GridState::Idle,
            cells: vec![GridCell::default(); (MAX_NUMBER_OF_CELLS * MAX_NUMBER_OF_CELLS) as usize],
            terrain,
            expiry: IntervalTimer::new(unload_delay),
            unload_locks: 0,
            pinned: false,
            objects_loaded: false,
            blocking_residents: 0,
            residents: 0,
        }
    }

    pub fn coord(&self) -> GridCoord {
        self.coord
    }

    pub fn state(&self) -> GridState {
        self.state
    }

    pub fn terrain(&self) -> &TerrainData {
        &self.terrain
    }

    pub fn is_objects_loaded(&self) -> bool {
        self.objects_loaded
    }

    pub(crate) fn mark_objects_loaded(&mut self) {
        self.objects_loaded = true;
    }

    pub fn unload_locks(&self) -> u32 {
        self.unload_locks
    }

    pub fn inc_unload_lock(&mut self) {
        self.unload_locks = self.unload_locks.saturating_add(1);
    }

    pub fn dec_unload_lock(&mut self) {
        self.unload_locks = self.unload_locks.saturating_sub(1);
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }

    pub fn residents(&self) -> usize {
        self.residents
    }

    pub fn blocking_residents(&self) -> u32 {
        self.blocking_residents
    }

    pub fn expiry_remaining(&self) -> Duration {
        self.expiry.remaining()
    }

    pub fn can_unload(&self) -> bool {
        !self.pinned && self.unload_locks == 0 && self.blocking_residents == 0
    }

    /// An active entity needs this grid: force `Active` and restart the expiry timer.
    pub fn activate(&mut self) {
        self.transition(GridState::Active);
        self.expiry.reset();
    }

    /// Moves straight to `Removal`, used by forced teardown.
    pub(crate) fn begin_removal(&mut self) {
        if self.state != GridState::Removal {
            self.transition(GridState::Removal);
        }
    }

    fn transition(&mut self, next: GridState) {
        if !self.state.allows(next) {
            panic!(
                "illegal grid state transition {:?} -> {:?} for {}",
                self.state, next, self.coord
            );
        }
        self.state = next;
    }

    fn cell_index(&self, cell: CellCoord) -> usize {
        if cell.grid() != self.coord {
            panic!("{} does not belong to {}", cell, self.coord);
        }
        let (x, y) = cell.local();
        (y * MAX_NUMBER_OF_CELLS + x) as usize
    }

    pub fn cell(&self, cell: CellCoord) -> &GridCell {
        &self.cells[self.cell_index(cell)]
    }

    pub(crate) fn add(&mut self, key: ObjectKey, cell: CellCoord, container: ContainerKind, blocks_unload: bool) {
        let index = self.cell_index(cell);
        let objects = self.cells[index].container_mut(container);
        if objects.contains(&key) {
            panic!("object inserted twice into {}", cell);
        }
        objects.push(key);
        self.residents += 1;
        if blocks_unload {
            self.blocking_residents += 1;
        }
    }

    pub(crate) fn remove(&mut self, key: ObjectKey, cell: CellCoord, container: ContainerKind, blocks_unload: bool) -> bool {
        let index = self.cell_index(cell);
        let objects = self.cells[index].container_mut(container);
        let Some(slot) = objects.iter().position(|entry| *entry == key) else {
            return false;
        };
        objects.swap_remove(slot);
        self.residents = self.residents.saturating_sub(1);
        if blocks_unload {
            self.blocking_residents = self.blocking_residents.saturating_sub(1);
        }
        true
    }

    /// Adjusts the blocking count when a resident toggles its active flag.
    pub(crate) fn set_resident_blocking(&mut self, blocking: bool) {
        if blocking {
            self.blocking_residents += 1;
        } else {
            self.blocking_residents = self.blocking_residents.saturating_sub(1);
        }
    }

    pub fn objects(&self) -> Vec<ObjectKey> {
        let mut all = Vec::with_capacity(self.residents);
        for cell in &self.cells {
            all.extend_from_slice(&cell.world_objects);
            all.extend_from_slice(&cell.grid_objects);
        }
        all
    }
}

/// Single per-tick update hook for every state.
///
/// `Active` grids ask for relocation notification, `Idle` grids only check whether they may
/// unload, and a grid reaching `Removal` asks the map to run eviction once.
pub fn advance(grid: &mut Grid, elapsed: Duration) -> GridAction {
    match grid.state {
        GridState::Active => {
            grid.expiry.update(elapsed);
            if grid.expiry.passed() {
                if grid.can_unload() {
                    grid.transition(GridState::Removal);
                    return GridAction::Evict;
                }
                if grid.blocking_residents == 0 {
                    grid.transition(GridState::Idle);
                }
                grid.expiry.reset();
            }
            GridAction::NotifyRelocations
        }
        GridState::Idle => {
            grid.expiry.update(elapsed);
            if grid.expiry.passed() {
                if grid.can_unload() {
                    grid.transition(GridState::Removal);
                    return GridAction::Evict;
                }
                grid.expiry.reset();
            }
            GridAction::None
        }
        GridState::Removal => GridAction::Evict,
    }
}

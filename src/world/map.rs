use crate::config::MapConfig;
use crate::entities::object::{
    ContainerKind, ObjectGuid, ObjectKey, ObjectKind, ObjectLocation, SpawnKey, WorldObject,
};
use crate::persistence::flush::{FlushConfig, FlushReport, RespawnJournal, RespawnWriter};
use crate::persistence::store::{SpawnRecord, SpawnStore};
use crate::telemetry::logging;
use crate::world::cell::{CellArea, CellCoord, GridCoord};
use crate::world::dynamic_tree::DynamicTree;
use crate::world::grid::{self, Grid, GridAction, GridState};
use crate::world::grid_index::GridIndex;
use crate::world::hooks::{Intent, MapHooks};
use crate::world::move_list::{MoveCommand, MoveList, MOVABLE_KINDS};
use crate::world::position::Position;
use crate::world::respawn::{
    check_respawn, LinkedRespawn, RespawnCheck, RespawnConditions, RespawnInfo,
    RespawnScheduler, ScheduleOutcome,
};
use crate::world::rng::WorldRng;
use crate::world::spawn_group::{SpawnGroupRegistry, SpawnGroupTemplates};
use crate::world::terrain::TerrainStats;
use crate::world::time::{GameClock, GameTime, IntervalTimer};
use crate::world::updates::{ObjectUpdate, UpdateBatch};
use crate::world::weather::{WeatherState, WeatherSystem};
use slotmap::SlotMap;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Extra seconds added to a linked respawn so dependents don't all appear on the same tick.
const LINKED_JITTER_SECS: (u32, u32) = (5, 15);

#[derive(Debug, Clone, Default)]
pub struct MapOptions {
    pub instance_id: u32,
    /// Clock start; the system time when unset.
    pub start: Option<GameTime>,
    pub terrain_root: Option<PathBuf>,
    pub seed: Option<u64>,
}

/// An object leaving one map for another; applied by the destination on its next tick.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub source_map: u32,
    pub destination_map: u32,
    pub object: WorldObject,
}

pub type ScriptCallback = Box<dyn FnOnce(&mut Map) + Send>;

struct ScheduledScript {
    due: Duration,
    sequence: u64,
    callback: ScriptCallback,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapStats {
    pub ticks: u64,
    pub grids_created: u64,
    pub grid_loads: u64,
    pub grid_unloads: u64,
    pub objects_spawned: u64,
    pub relocations: u64,
    pub relocation_notifications: u64,
    pub failed_relocations: u64,
    pub returned_home: u64,
    pub removals: u64,
    pub respawns_scheduled: u64,
    pub respawns_fired: u64,
    pub respawns_deferred: u64,
    pub respawns_cancelled: u64,
    pub respawns_rescheduled: u64,
    pub pool_notifications: u64,
    pub transfers_in: u64,
    pub transfers_out: u64,
    pub scripts_run: u64,
    pub lag_ticks: u64,
    /// Bad references in spawn data, each dropped and logged.
    pub content_errors: u64,
}

/// One instance of the world: grids, the objects in them and everything that brings
/// removed content back.
pub struct Map {
    id: u32,
    instance_id: u32,
    config: MapConfig,
    clock: GameClock,
    grids: GridIndex,
    objects: SlotMap<ObjectKey, WorldObject>,
    by_spawn: HashMap<SpawnKey, Vec<ObjectKey>>,
    players: BTreeSet<ObjectKey>,
    active: BTreeSet<ObjectKey>,
    home_locks: HashMap<GridCoord, u32>,
    moves: MoveList,
    /// Cell each relocated object left, until its grid's next active pass notifies it.
    relocated: HashMap<ObjectKey, CellCoord>,
    removals: Vec<ObjectKey>,
    visited: HashSet<ObjectKey>,
    respawns: RespawnScheduler,
    spawn_groups: SpawnGroupRegistry,
    store: Arc<dyn SpawnStore>,
    journal: RespawnJournal,
    writer: RespawnWriter,
    hooks: MapHooks,
    tree: DynamicTree,
    tree_timer: IntervalTimer,
    respawn_timer: IntervalTimer,
    weather: WeatherSystem,
    updates: UpdateBatch,
    scripts: Vec<ScheduledScript>,
    script_sequence: u64,
    incoming: Vec<Transfer>,
    outgoing: Vec<Transfer>,
    rng: WorldRng,
    next_guid: u64,
    stats: MapStats,
}

impl Map {
    pub fn new(
        id: u32,
        config: MapConfig,
        store: Arc<dyn SpawnStore>,
        templates: SpawnGroupTemplates,
        hooks: MapHooks,
        options: MapOptions,
    ) -> Self {
        let clock = match options.start {
            Some(start) => GameClock::new(start),
            None => GameClock::from_system_time(),
        };
        let mut rng = match options.seed {
            Some(seed) => WorldRng::from_seed(seed),
            None => WorldRng::from_time(),
        };
        let weather_rng = WorldRng::from_seed(u64::from(rng.roll_range(1, u32::MAX)));
        let mut map = Self {
            id,
            instance_id: options.instance_id,
            clock,
            grids: GridIndex::new(id, config.unload_delay(), options.terrain_root),
            objects: SlotMap::with_key(),
            by_spawn: HashMap::new(),
            players: BTreeSet::new(),
            active: BTreeSet::new(),
            home_locks: HashMap::new(),
            moves: MoveList::default(),
            relocated: HashMap::new(),
            removals: Vec::new(),
            visited: HashSet::new(),
            respawns: RespawnScheduler::new(),
            spawn_groups: SpawnGroupRegistry::new(templates),
            writer: RespawnWriter::spawn(id, options.instance_id, store.clone()),
            store,
            journal: RespawnJournal::new(FlushConfig {
                interval_ms: config.respawn_flush_interval_ms,
            }),
            hooks,
            tree: DynamicTree::new(),
            tree_timer: IntervalTimer::new(config.tree_rebalance_interval()),
            respawn_timer: IntervalTimer::new(config.respawn_check_interval()),
            weather: WeatherSystem::new(
                config.weather_zones.clone(),
                config.weather_interval(),
                weather_rng,
            ),
            updates: UpdateBatch::default(),
            scripts: Vec::new(),
            script_sequence: 0,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            rng,
            next_guid: 0,
            stats: MapStats::default(),
            config,
        };
        map.restore_respawns();
        map
    }

    /// Rebuilds the scheduler from the durable store. Entries for spawns that no longer
    /// exist are deleted.
    fn restore_respawns(&mut self) {
        let stored = match self.store.load_respawns(self.id, self.instance_id) {
            Ok(stored) => stored,
            Err(err) => {
                self.report_error(&format!("respawn restore failed: {}", err));
                return;
            }
        };
        for entry in stored {
            let key = entry.key();
            let Some((template_id, grid)) = self
                .store
                .spawn_record(self.id, key)
                .and_then(|record| record.grid().map(|grid| (record.template_id, grid)))
            else {
                self.content_error(&format!("dropping stored respawn for missing {}", key));
                if let Err(err) = self.store.delete_respawn(self.id, self.instance_id, key) {
                    self.report_error(&format!("respawn delete failed for {}: {}", key, err));
                }
                continue;
            };
            self.respawns.insert(RespawnInfo {
                key,
                template_id,
                respawn_time: GameTime(entry.time),
                grid_id: grid.id(),
            });
        }
        if !self.respawns.is_empty() {
            logging::log_respawn(
                self.id,
                &format!("restored {} pending respawns", self.respawns.len()),
            );
        }
    }

    fn report_error(&self, message: &str) {
        eprintln!("worldgrid: map {}: {}", self.id, message);
        logging::log_error(self.id, message);
    }

    fn content_error(&mut self, message: &str) {
        self.stats.content_errors += 1;
        self.report_error(message);
    }

    fn allocate_guid(&mut self) -> ObjectGuid {
        self.next_guid += 1;
        ObjectGuid((u64::from(self.id) << 40) | self.next_guid)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn now(&self) -> GameTime {
        self.clock.now()
    }

    pub fn stats(&self) -> &MapStats {
        &self.stats
    }


    pub fn update(&mut self, diff: Duration) {
        let started = Instant::now();
        let now = self.clock.advance(diff);
        self.stats.ticks += 1;

        self.visited.clear();
        self.tree_timer.update(diff);
        if self.tree_timer.consume() {
            self.tree.balance();
        }

        self.apply_incoming();
        self.update_players();

        self.respawn_timer.update(diff);
        if self.respawn_timer.consume() {
            self.process_due_respawns(now);
            self.update_spawn_group_conditions();
        }

        self.visit_active_areas(diff);
        self.update_grids(diff);

        self.drain_moves();
        self.process_removals();

        self.flush_updates();
        self.run_scripts();

        let changes = self.weather.update(diff);
        if !changes.is_empty() {
            self.hooks.transport.send_weather(self.id, &changes);
        }

        if self.journal.due(diff) && !self.journal.is_empty() {
            if let Err(err) = self.writer.submit(self.journal.take()) {
                self.report_error(&format!("respawn writes dropped: {}", err));
            }
        }

        let took = started.elapsed();
        if took > self.config.lag_threshold() {
            self.stats.lag_ticks += 1;
            logging::log_lag(
                self.id,
                &format!(
                    "tick {} took {} ms, {} grids, {} objects",
                    self.stats.ticks,
                    took.as_millis(),
                    self.grids.len(),
                    self.objects.len()
                ),
            );
        }
    }

    fn apply_incoming(&mut self) {
        for transfer in std::mem::take(&mut self.incoming) {
            let guid = transfer.object.guid;
            match self.add_object(transfer.object) {
                Ok(_) => self.stats.transfers_in += 1,
                Err(err) => self.report_error(&format!(
                    "transfer of {:?} from map {} dropped: {}",
                    guid, transfer.source_map, err
                )),
            }
        }
    }

    fn update_players(&mut self) {
        let players: Vec<ObjectKey> = self.players.iter().copied().collect();
        for key in players {
            let cell = self
                .objects
                .get(key)
                .filter(|object| object.is_in_world())
                .and_then(WorldObject::current_cell);
            if let Some(cell) = cell {
                self.ensure_grid_loaded_for_active(cell);
            }
        }
    }

    fn visit_active_areas(&mut self, diff: Duration) {
        let sources: Vec<ObjectKey> = self.players.iter().chain(self.active.iter()).copied().collect();
        let radius = self.config.activation_radius_cells;
        for source in sources {
            let center = self
                .objects
                .get(source)
                .filter(|object| object.is_in_world())
                .and_then(WorldObject::current_cell);
            let Some(center) = center else {
                continue;
            };
            let area = CellArea::around(center, radius);
            for coord in area.grids() {
                if self.grids.is_loaded(coord) {
                    if let Some(grid) = self.grids.get_mut(coord) {
                        grid.activate();
                    }
                }
            }
            for cell in area.cells() {
                for key in self.cell_residents(cell) {
                    if self.visited.insert(key) {
                        self.update_object(key, diff);
                    }
                }
            }
        }
    }

    fn cell_residents(&self, cell: CellCoord) -> Vec<ObjectKey> {
        match self.grids.get(cell.grid()) {
            Some(grid) => {
                let cell = grid.cell(cell);
                let mut keys = cell.world_objects().to_vec();
                keys.extend_from_slice(cell.grid_objects());
                keys
            }
            None => Vec::new(),
        }
    }

    fn update_object(&mut self, key: ObjectKey, diff: Duration) {
        let intent = match self.objects.get_mut(key) {
            Some(object) if !object.pending_removal => {
                object.update_count += 1;
                self.hooks.behavior.update(object, diff)
            }
            _ => return,
        };
        match intent {
            Intent::Stay => {}
            Intent::MoveTo(destination) => {
                if let Err(err) = self.move_object(key, destination) {
                    self.report_error(&err);
                }
            }
            Intent::Despawn => self.kill_object(key),
        }
    }

    fn update_grids(&mut self, diff: Duration) {
        for coord in self.grids.coords() {
            let Some(grid) = self.grids.get_mut(coord) else {
                continue;
            };
            match grid::advance(grid, diff) {
                GridAction::None => {}
                GridAction::NotifyRelocations => self.notify_relocations(coord),
                GridAction::Evict => self.evict_grid(coord, false),
            }
        }
    }

    /// Publishes cross-cell relocations of the grid's residents. Idle grids keep their
    /// flags until they are active again.
    fn notify_relocations(&mut self, coord: GridCoord) {
        let Some(grid) = self.grids.get(coord) else {
            return;
        };
        for key in grid.objects() {
            let Some(object) = self.objects.get_mut(key) else {
                continue;
            };
            if !object.needs_notify || object.pending_removal {
                continue;
            }
            object.needs_notify = false;
            let Some(location) = object.location else {
                continue;
            };
            let from = self.relocated.remove(&key).unwrap_or(location.cell);
            self.updates.push(ObjectUpdate::Moved {
                guid: object.guid,
                from,
                to: location.cell,
                position: object.position,
            });
            self.stats.relocation_notifications += 1;
        }
    }

    fn drain_moves(&mut self) {
        let max_passes = self.config.max_drain_passes.max(1);
        let mut passes = 0;
        while !self.moves.is_empty() {
            if passes == max_passes {
                self.report_error(&format!(
                    "move list not settled after {} passes, {} moves deferred",
                    passes,
                    self.moves.len()
                ));
                break;
            }
            passes += 1;
            for kind in MOVABLE_KINDS {
                for command in self.moves.take_batch(kind) {
                    self.apply_move(command);
                }
            }
        }
    }

    fn apply_move(&mut self, command: MoveCommand) {
        let Some(object) = self.objects.get(command.key) else {
            return;
        };
        if object.pending_removal {
            return;
        }
        let Some(location) = object.location else {
            return;
        };
        let active = object.active;
        let home = object.home;
        let guid = object.guid;

        if let Some(cell) = CellCoord::from_position(command.destination) {
            let target = cell.grid();
            if active {
                self.ensure_grid_loaded_for_active(cell);
                self.relocate(command.key, command.destination, cell);
                return;
            }
            if target == location.grid || self.grids.is_loaded(target) {
                self.relocate(command.key, command.destination, cell);
                return;
            }
        }

        self.stats.failed_relocations += 1;
        let home_cell = CellCoord::from_position(home)
            .filter(|cell| cell.grid() == location.grid || self.grids.is_loaded(cell.grid()));
        match home_cell {
            Some(cell) => {
                self.relocate(command.key, home, cell);
                self.stats.returned_home += 1;
            }
            None => {
                self.report_error(&format!(
                    "{:?} cannot move to {} nor return home to {}, removing",
                    guid, command.destination, home
                ));
                self.queue_removal(command.key);
            }
        }
    }

    fn process_removals(&mut self) {
        for key in std::mem::take(&mut self.removals) {
            self.remove_object_now(key);
        }
    }

    fn flush_updates(&mut self) {
        if self.updates.is_empty() {
            return;
        }
        let updates = self.updates.take();
        self.hooks.transport.send_updates(self.id, &updates);
    }

    fn run_scripts(&mut self) {
        if self.scripts.is_empty() {
            return;
        }
        let now = self.clock.elapsed();
        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scripts)
            .into_iter()
            .partition(|script| script.due <= now);
        self.scripts = pending;
        due.sort_by_key(|script| (script.due, script.sequence));
        for script in due {
            (script.callback)(self);
            self.stats.scripts_run += 1;
        }
    }

    /// Writes the pending respawn journal and waits for every earlier batch. Failures are
    /// logged by the writer and dropped. Ticks never call this.
    pub fn flush_respawns(&mut self) -> FlushReport {
        self.writer.write_blocking(self.journal.take())
    }


    fn ensure_grid_created(&mut self, coord: GridCoord) -> bool {
        if !self.grids.ensure_created(coord) {
            return false;
        }
        self.stats.grids_created += 1;
        let pin = !self.config.grid_unload;
        let locks = self.home_locks.get(&coord).copied().unwrap_or(0);
        let grid = self.grids.expect_mut(coord);
        if pin {
            grid.set_pinned(true);
        }
        for _ in 0..locks {
            grid.inc_unload_lock();
        }
        true
    }

    /// Creates the grid if needed and loads its spawns once per grid lifetime.
    /// Returns true when this call performed the load.
    pub fn ensure_grid_loaded(&mut self, cell: CellCoord) -> bool {
        let coord = cell.grid();
        self.ensure_grid_created(coord);
        let grid = self.grids.expect_mut(coord);
        if grid.is_objects_loaded() {
            return false;
        }
        grid.mark_objects_loaded();
        self.stats.grid_loads += 1;
        self.load_grid_objects(coord);
        self.tree.balance();
        logging::log_map(self.id, &format!("{} loaded", coord));
        true
    }

    /// Like `ensure_grid_loaded`, and forces the grid active with a fresh expiry timer.
    pub fn ensure_grid_loaded_for_active(&mut self, cell: CellCoord) -> bool {
        let loaded = self.ensure_grid_loaded(cell);
        self.grids.expect_mut(cell.grid()).activate();
        loaded
    }

    fn load_grid_objects(&mut self, coord: GridCoord) {
        let records = match self.store.load_spawns_for_grid(self.id, coord) {
            Ok(records) => records,
            Err(err) => {
                self.report_error(&format!("spawn load for {} failed: {}", coord, err));
                return;
            }
        };
        for record in records {
            if self.spawn_groups.template(record.group_id).is_none() {
                self.content_error(&format!(
                    "{} references unknown spawn group {}, skipped",
                    record.key, record.group_id
                ));
                continue;
            }
            if !self.spawn_groups.is_active(record.group_id)
                || self.respawns.get(record.key).is_some()
                || self.has_live_instance(record.key)
            {
                continue;
            }
            self.spawn_from_record(&record);
        }
    }

    pub fn is_grid_loaded(&self, coord: GridCoord) -> bool {
        self.grids.is_loaded(coord)
    }

    pub fn is_grid_created(&self, coord: GridCoord) -> bool {
        self.grids.is_created(coord)
    }

    pub fn grid(&self, coord: GridCoord) -> Option<&Grid> {
        self.grids.get(coord)
    }

    pub fn grid_state(&self, coord: GridCoord) -> Option<GridState> {
        self.grids.get(coord).map(Grid::state)
    }

    pub fn grid_count(&self) -> usize {
        self.grids.len()
    }

    /// Pinned grids never unload. Creates the grid when it doesn't exist yet.
    pub fn set_grid_pinned(&mut self, coord: GridCoord, pinned: bool) {
        self.ensure_grid_created(coord);
        self.grids.expect_mut(coord).set_pinned(pinned);
    }

    /// Runs the grid through removal. Without `force` a grid that is pinned, locked or
    /// holds blocking residents stays and false is returned.
    pub fn unload_grid(&mut self, coord: GridCoord, force: bool) -> bool {
        let Some(grid) = self.grids.get_mut(coord) else {
            return false;
        };
        if !force && !grid.can_unload() {
            return false;
        }
        grid.begin_removal();
        self.evict_grid(coord, force);
        true
    }

    fn evict_grid(&mut self, coord: GridCoord, force: bool) {
        let residents = match self.grids.get(coord) {
            Some(grid) => grid.objects(),
            None => return,
        };
        let mut returned = 0;
        for key in residents {
            if !force && self.try_return_home(key, coord) {
                returned += 1;
                continue;
            }
            self.remove_object_now(key);
        }
        self.grids.destroy(coord);
        self.stats.grid_unloads += 1;
        logging::log_map(
            self.id,
            &format!(
                "{} unloaded{}, {} residents sent home",
                coord,
                if force { " (forced)" } else { "" },
                returned
            ),
        );
    }

    fn try_return_home(&mut self, key: ObjectKey, evicted: GridCoord) -> bool {
        let Some(object) = self.objects.get(key) else {
            return false;
        };
        if object.pending_removal || object.kind == ObjectKind::Player {
            return false;
        }
        let Some(home_cell) = CellCoord::from_position(object.home) else {
            return false;
        };
        if home_cell.grid() == evicted {
            return false;
        }
        let home = object.home;
        let kind = object.kind;
        if object.active {
            self.ensure_grid_loaded_for_active(home_cell);
        } else if !self.grids.is_loaded(home_cell.grid()) {
            return false;
        }
        self.moves.cancel(kind, key);
        self.relocate(key, home, home_cell);
        self.stats.returned_home += 1;
        true
    }

    /// Force-unloads every grid and writes out pending respawns.
    pub fn unload_all(&mut self) {
        self.process_removals();
        for coord in self.grids.coords() {
            self.unload_grid(coord, true);
        }
        self.removals.clear();
        self.flush_updates();
        self.flush_respawns();
    }

    pub fn ground_height(&self, position: Position) -> Option<f32> {
        let cell = CellCoord::from_position(position)?;
        self.grids
            .get(cell.grid())
            .map(|grid| grid.terrain().height_at(cell))
    }

    pub fn terrain_stats(&self) -> &TerrainStats {
        self.grids.terrain_cache().stats()
    }


    /// Places a new object. Players and active objects load their grid; passive objects
    /// only need it to exist.
    pub fn add_object(&mut self, mut object: WorldObject) -> Result<ObjectKey, String> {
        let cell = CellCoord::from_position(object.position)
            .ok_or_else(|| format!("position {} is off the map", object.position))?;
        if object.guid.0 == 0 {
            object.guid = self.allocate_guid();
        }
        object.location = None;
        object.pending_removal = false;
        object.needs_notify = false;

        if object.kind == ObjectKind::Player || object.active {
            self.ensure_grid_loaded_for_active(cell);
        } else {
            self.ensure_grid_created(cell.grid());
        }

        let kind = object.kind;
        let guid = object.guid;
        let position = object.position;
        let home = object.home;
        let spawn = object.spawn;
        let active = object.active;
        let container = object.container();
        let blocks = object.blocks_unload();

        let key = self.objects.insert(object);
        self.objects[key].location = Some(ObjectLocation {
            map_id: self.id,
            grid: cell.grid(),
            cell,
        });
        self.grids.expect_mut(cell.grid()).add(key, cell, container, blocks);
        if let Some(spawn) = spawn {
            self.by_spawn.entry(spawn).or_default().push(key);
        }
        if kind == ObjectKind::Player {
            self.players.insert(key);
        } else if active {
            self.active.insert(key);
            self.acquire_home_lock(home);
        }
        if kind == ObjectKind::GameObject {
            self.tree.insert(key, position);
        }
        self.updates.push(ObjectUpdate::Created {
            guid,
            kind,
            position,
        });
        Ok(key)
    }

    fn spawn_from_record(&mut self, record: &SpawnRecord) -> Option<ObjectKey> {
        let guid = self.allocate_guid();
        let object = match self.hooks.factory.instantiate(record, guid) {
            Ok(object) => object,
            Err(err) => {
                self.content_error(&format!("spawn of {} skipped: {}", record.key, err));
                return None;
            }
        };
        match self.add_object(object) {
            Ok(key) => {
                self.stats.objects_spawned += 1;
                Some(key)
            }
            Err(err) => {
                self.report_error(&format!("spawn of {} failed: {}", record.key, err));
                None
            }
        }
    }

    pub fn object(&self, key: ObjectKey) -> Option<&WorldObject> {
        self.objects.get(key)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn objects_of_spawn(&self, spawn: SpawnKey) -> Vec<ObjectKey> {
        self.by_spawn.get(&spawn).cloned().unwrap_or_default()
    }

    fn live_instances(&self, spawn: SpawnKey) -> Vec<ObjectKey> {
        self.by_spawn
            .get(&spawn)
            .map(|keys| {
                keys.iter()
                    .copied()
                    .filter(|key| {
                        self.objects
                            .get(*key)
                            .map_or(false, |object| object.alive && !object.pending_removal)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn has_live_instance(&self, spawn: SpawnKey) -> bool {
        !self.live_instances(spawn).is_empty()
    }

    /// Requests a move. Players relocate at once; other movable objects cross cell borders
    /// through the move list on the next drain.
    pub fn move_object(&mut self, key: ObjectKey, destination: Position) -> Result<(), String> {
        let Some(object) = self.objects.get(key) else {
            panic!("move of an object never added to map {}", self.id);
        };
        let Some(location) = object.location else {
            panic!("move of {:?} which has no location", object.guid);
        };
        if object.pending_removal {
            return Ok(());
        }
        let kind = object.kind;
        let cell = CellCoord::from_position(destination)
            .ok_or_else(|| format!("{:?} destination {} is off the map", object.guid, destination))?;
        match kind {
            ObjectKind::Player => {
                self.ensure_grid_loaded_for_active(cell);
                self.relocate(key, destination, cell);
            }
            _ if !kind.is_movable() => {
                return Err(format!("{:?} {:?} cannot move", kind, object.guid));
            }
            _ if cell == location.cell => {
                self.moves.cancel(kind, key);
                self.relocate(key, destination, cell);
            }
            _ => {
                self.moves.enqueue(kind, key, destination);
            }
        }
        Ok(())
    }

    /// Remove from the old cell, add to the new one. The destination grid must exist.
    fn relocate(&mut self, key: ObjectKey, destination: Position, cell: CellCoord) {
        let Some(object) = self.objects.get_mut(key) else {
            panic!("relocation of an object never added to map {}", self.id);
        };
        let Some(old) = object.location else {
            panic!("relocation of {:?} which has no location", object.guid);
        };
        let container = object.container();
        let blocks = object.blocks_unload();
        let guid = object.guid;
        let kind = object.kind;
        object.position = destination;
        object.location = Some(ObjectLocation {
            map_id: self.id,
            grid: cell.grid(),
            cell,
        });
        let pending_notify = object.needs_notify;
        if old.cell != cell {
            object.needs_notify = true;
            if !self.grids.expect_mut(old.grid).remove(key, old.cell, container, blocks) {
                panic!("{:?} missing from {}", guid, old.cell);
            }
            self.grids.expect_mut(cell.grid()).add(key, cell, container, blocks);
            self.relocated.entry(key).or_insert(old.cell);
            self.stats.relocations += 1;
        }
        if kind == ObjectKind::GameObject {
            self.tree.update(key, destination);
        }
        if old.cell == cell && !pending_notify {
            self.updates.push(ObjectUpdate::Moved {
                guid,
                from: cell,
                to: cell,
                position: destination,
            });
        }
    }

    /// Queues the object for removal at the end of the drain; no respawn is scheduled.
    pub fn remove_object(&mut self, key: ObjectKey) {
        self.queue_removal(key);
    }

    /// Removes the object and schedules its spawn to come back after the respawn delay.
    pub fn kill_object(&mut self, key: ObjectKey) {
        let Some(object) = self.objects.get_mut(key) else {
            return;
        };
        if object.pending_removal {
            return;
        }
        object.alive = false;
        let spawn = object.spawn;
        let template_id = object.template_id;
        let delay = object.respawn_delay_secs;
        let home = object.home;
        if let Some(spawn) = spawn {
            let grid_id = GridCoord::from_position(home).map_or(0, GridCoord::id);
            let when = self.clock.now().plus_secs(delay);
            self.schedule_respawn(RespawnInfo {
                key: spawn,
                template_id,
                respawn_time: when,
                grid_id,
            });
        }
        self.queue_removal(key);
    }

    fn queue_removal(&mut self, key: ObjectKey) {
        let Some(object) = self.objects.get_mut(key) else {
            return;
        };
        if object.pending_removal {
            return;
        }
        object.pending_removal = true;
        let kind = object.kind;
        self.moves.cancel(kind, key);
        self.removals.push(key);
    }

    fn remove_object_now(&mut self, key: ObjectKey) {
        let Some(object) = self.objects.remove(key) else {
            return;
        };
        if let Some(location) = object.location {
            if let Some(grid) = self.grids.get_mut(location.grid) {
                grid.remove(key, location.cell, object.container(), object.blocks_unload());
            }
        }
        self.moves.cancel(object.kind, key);
        self.relocated.remove(&key);
        if let Some(spawn) = object.spawn {
            if let Some(keys) = self.by_spawn.get_mut(&spawn) {
                keys.retain(|entry| *entry != key);
                if keys.is_empty() {
                    self.by_spawn.remove(&spawn);
                }
            }
        }
        self.players.remove(&key);
        if self.active.remove(&key) {
            self.release_home_lock(object.home);
        }
        if object.kind == ObjectKind::GameObject {
            self.tree.remove(key);
        }
        self.updates.push(ObjectUpdate::Removed { guid: object.guid });
        self.stats.removals += 1;
    }

    /// Toggles the active flag. Active objects keep their grid loaded and lock their home grid.
    pub fn set_object_active(&mut self, key: ObjectKey, active: bool) {
        let Some(object) = self.objects.get_mut(key) else {
            return;
        };
        if object.kind == ObjectKind::Player || object.active == active || object.pending_removal {
            return;
        }
        object.active = active;
        let home = object.home;
        let location = object.location;
        if let Some(location) = location {
            self.grids
                .expect_mut(location.grid)
                .set_resident_blocking(active);
        }
        if active {
            self.active.insert(key);
            self.acquire_home_lock(home);
            if let Some(location) = location {
                self.ensure_grid_loaded_for_active(location.cell);
            }
        } else {
            self.active.remove(&key);
            self.release_home_lock(home);
        }
    }

    pub fn set_escorted(&mut self, key: ObjectKey, escorted: bool) {
        if let Some(object) = self.objects.get_mut(key) {
            object.escorted = escorted;
        }
    }

    fn acquire_home_lock(&mut self, home: Position) {
        let Some(coord) = GridCoord::from_position(home) else {
            return;
        };
        *self.home_locks.entry(coord).or_default() += 1;
        if let Some(grid) = self.grids.get_mut(coord) {
            grid.inc_unload_lock();
        }
    }

    fn release_home_lock(&mut self, home: Position) {
        let Some(coord) = GridCoord::from_position(home) else {
            return;
        };
        if let Some(count) = self.home_locks.get_mut(&coord) {
            *count -= 1;
            if *count == 0 {
                self.home_locks.remove(&coord);
            }
        }
        if let Some(grid) = self.grids.get_mut(coord) {
            grid.dec_unload_lock();
        }
    }

    pub fn pending_moves(&self) -> usize {
        self.moves.len()
    }

    pub fn pending_removals(&self) -> usize {
        self.removals.len()
    }

    pub fn game_objects_in_radius(&self, center: Position, radius: f32) -> Vec<ObjectKey> {
        self.tree.query(center, radius)
    }

    pub fn weather_at(&self, position: Position) -> WeatherState {
        self.weather.weather_at(position)
    }

    /// Checks that every object sits in the cell its position maps to, inside the right
    /// container of a created grid.
    pub fn verify_cells(&self) -> Result<(), String> {
        for (key, object) in &self.objects {
            let location = object
                .location
                .ok_or_else(|| format!("{:?} has no location", object.guid))?;
            let expected = CellCoord::from_position(object.position)
                .ok_or_else(|| format!("{:?} is off the map at {}", object.guid, object.position))?;
            if expected != location.cell {
                return Err(format!(
                    "{:?} recorded in {} but positioned in {}",
                    object.guid, location.cell, expected
                ));
            }
            let grid = self
                .grids
                .get(location.grid)
                .ok_or_else(|| format!("{:?} points at missing {}", object.guid, location.grid))?;
            let cell = grid.cell(location.cell);
            let held = match object.container() {
                ContainerKind::Grid => cell.grid_objects(),
                ContainerKind::World => cell.world_objects(),
            };
            if !held.contains(&key) {
                return Err(format!("{:?} missing from {}", object.guid, location.cell));
            }
        }
        Ok(())
    }


    /// Earliest wins. Accepted entries are journaled for the store.
    pub fn schedule_respawn(&mut self, info: RespawnInfo) -> ScheduleOutcome {
        let outcome = self.respawns.schedule(info);
        if outcome.accepted() {
            self.journal.record_upsert(info.key, info.respawn_time);
            self.stats.respawns_scheduled += 1;
            logging::log_respawn(
                self.id,
                &format!("{} scheduled for {}", info.key, info.respawn_time),
            );
        }
        outcome
    }

    pub fn cancel_respawn(&mut self, key: SpawnKey) -> Option<RespawnInfo> {
        let cancelled = self.respawns.cancel(key);
        if cancelled.is_some() {
            self.journal.record_delete(key);
        }
        cancelled
    }

    pub fn respawn_time(&self, key: SpawnKey) -> Option<GameTime> {
        self.respawns.respawn_time(key)
    }

    pub fn respawns(&self) -> &RespawnScheduler {
        &self.respawns
    }

    /// Handles every entry due at `now`, earliest first.
    pub fn process_due_respawns(&mut self, now: GameTime) {
        while let Some(info) = self.respawns.pop_due(now) {
            self.journal.record_delete(info.key);
            if let Some(pool_id) = self.hooks.pools.pool_of(info.key) {
                self.hooks.pools.notify_pool_member(self.id, pool_id, info.key);
                self.stats.pool_notifications += 1;
                continue;
            }
            let Some(record) = self.store.spawn_record(self.id, info.key) else {
                self.content_error(&format!("respawn for {} has no spawn record, dropped", info.key));
                self.stats.respawns_cancelled += 1;
                continue;
            };
            if self.spawn_groups.template(record.group_id).is_none() {
                self.content_error(&format!(
                    "respawn for {} references unknown spawn group {}, dropped",
                    info.key, record.group_id
                ));
                self.stats.respawns_cancelled += 1;
                continue;
            }
            let jitter = u64::from(self.rng.roll_range(LINKED_JITTER_SECS.0, LINKED_JITTER_SECS.1));
            match check_respawn(&info, &*self, now, jitter) {
                RespawnCheck::Proceed => self.do_respawn(&info),
                RespawnCheck::Reschedule(when) => {
                    self.stats.respawns_rescheduled += 1;
                    self.schedule_respawn(RespawnInfo {
                        respawn_time: when,
                        ..info
                    });
                }
                RespawnCheck::Cancel(reason) => {
                    self.stats.respawns_cancelled += 1;
                    logging::log_respawn(
                        self.id,
                        &format!("{} cancelled: {:?}", info.key, reason),
                    );
                }
            }
        }
    }

    /// Brings the spawn back if its grid is loaded; otherwise it appears on the next load.
    fn do_respawn(&mut self, info: &RespawnInfo) {
        self.stats.respawns_fired += 1;
        let loaded = GridCoord::from_id(info.grid_id).map_or(false, |coord| self.grids.is_loaded(coord));
        if !loaded {
            self.stats.respawns_deferred += 1;
            return;
        }
        let Some(record) = self.store.spawn_record(self.id, info.key) else {
            return;
        };
        if self.spawn_from_record(&record).is_some() {
            logging::log_respawn(self.id, &format!("{} respawned", info.key));
        }
    }


    pub fn is_spawn_group_active(&self, group_id: u32) -> bool {
        self.spawn_groups.is_active(group_id)
    }

    pub fn set_spawn_group_active(&mut self, group_id: u32, active: bool) -> Result<(), String> {
        self.spawn_groups.set_active(group_id, active)
    }

    fn toggleable_group(&self, group_id: u32) -> Result<(), String> {
        let template = self
            .spawn_groups
            .template(group_id)
            .ok_or_else(|| format!("unknown spawn group {}", group_id))?;
        if template.flags.system {
            return Err(format!("spawn group {} is a system group", group_id));
        }
        Ok(())
    }

    /// Activates the group and spawns its members in loaded grids. Returns how many
    /// objects were created.
    pub fn spawn_group_spawn(
        &mut self,
        group_id: u32,
        ignore_respawn: bool,
        force: bool,
    ) -> Result<usize, String> {
        self.toggleable_group(group_id)?;
        self.spawn_groups.set_active(group_id, true)?;
        let mut spawned = 0;
        for record in self.store.spawns_in_group(self.id, group_id) {
            if ignore_respawn {
                self.cancel_respawn(record.key);
            } else if !force && self.respawns.get(record.key).is_some() {
                continue;
            }
            if !force && self.has_live_instance(record.key) {
                continue;
            }
            if !record.grid().map_or(false, |coord| self.grids.is_loaded(coord)) {
                continue;
            }
            if self.spawn_from_record(&record).is_some() {
                spawned += 1;
            }
        }
        logging::log_map(
            self.id,
            &format!("spawn group {} spawned {} objects", group_id, spawned),
        );
        Ok(spawned)
    }

    /// Removes live members and deactivates the group. Returns how many objects were removed.
    pub fn spawn_group_despawn(&mut self, group_id: u32, delete_respawns: bool) -> Result<usize, String> {
        self.toggleable_group(group_id)?;
        let mut removed = 0;
        for record in self.store.spawns_in_group(self.id, group_id) {
            if delete_respawns {
                self.cancel_respawn(record.key);
            }
            for key in self.live_instances(record.key) {
                self.queue_removal(key);
                removed += 1;
            }
        }
        self.spawn_groups.set_active(group_id, false)?;
        logging::log_map(
            self.id,
            &format!("spawn group {} despawned {} objects", group_id, removed),
        );
        Ok(removed)
    }

    fn update_spawn_group_conditions(&mut self) {
        let groups: Vec<(u32, bool)> = self
            .spawn_groups
            .conditional_groups()
            .iter()
            .map(|template| (template.id, template.flags.despawn_on_condition_failure))
            .collect();
        for (group_id, despawn_on_failure) in groups {
            let active = self.spawn_groups.is_active(group_id);
            let wanted = self.hooks.conditions.evaluate_group_condition(self.id, group_id);
            if active == wanted {
                continue;
            }
            let result = if wanted {
                self.spawn_group_spawn(group_id, false, false).map(|_| ())
            } else if despawn_on_failure {
                self.spawn_group_despawn(group_id, true).map(|_| ())
            } else {
                self.spawn_groups.set_active(group_id, false)
            };
            if let Err(err) = result {
                self.report_error(&format!("spawn group {} condition update: {}", group_id, err));
            }
        }
    }


    /// Marks the object removed here and hands a copy to `destination_map`.
    pub fn transfer_object(
        &mut self,
        key: ObjectKey,
        destination_map: u32,
        position: Position,
    ) -> Result<(), String> {
        let object = self
            .objects
            .get(key)
            .ok_or_else(|| format!("transfer of unknown object on map {}", self.id))?;
        if object.pending_removal {
            return Err(format!("{:?} is already leaving map {}", object.guid, self.id));
        }
        if CellCoord::from_position(position).is_none() {
            return Err(format!("transfer destination {} is off the map", position));
        }
        let mut moving = object.clone();
        moving.position = position;
        moving.home = position;
        moving.location = None;
        moving.spawn = None;
        moving.spawn_group = None;
        self.outgoing.push(Transfer {
            source_map: self.id,
            destination_map,
            object: moving,
        });
        self.stats.transfers_out += 1;
        self.queue_removal(key);
        Ok(())
    }

    pub fn take_outgoing(&mut self) -> Vec<Transfer> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn queue_incoming(&mut self, transfer: Transfer) {
        self.incoming.push(transfer);
    }

    /// Runs `callback` with the map once `delay` of game time has passed.
    pub fn schedule_script(
        &mut self,
        delay: Duration,
        callback: impl FnOnce(&mut Map) + Send + 'static,
    ) {
        self.script_sequence += 1;
        self.scripts.push(ScheduledScript {
            due: self.clock.elapsed().saturating_add(delay),
            sequence: self.script_sequence,
            callback: Box::new(callback),
        });
    }

    pub fn pending_scripts(&self) -> usize {
        self.scripts.len()
    }
}

impl RespawnConditions for Map {
    fn is_group_active(&self, key: SpawnKey) -> bool {
        self.store
            .spawn_record(self.id, key)
            .map_or(false, |record| self.spawn_groups.is_active(record.group_id))
    }

    fn has_blocking_instance(&self, key: SpawnKey) -> bool {
        let Some(keys) = self.by_spawn.get(&key) else {
            return false;
        };
        keys.iter().any(|entry| {
            let Some(object) = self.objects.get(*entry) else {
                return false;
            };
            if !object.alive || object.pending_removal {
                return false;
            }
            let escort_exempt = self.config.dynamic_escort_respawn
                && object.escorted
                && object
                    .spawn_group
                    .map_or(false, |group| self.spawn_groups.is_escort_group(group));
            !escort_exempt
        })
    }

    fn linked_respawn(&self, key: SpawnKey) -> Option<LinkedRespawn> {
        let master = self.store.spawn_record(self.id, key)?.linked_to?;
        if master == key {
            return Some(LinkedRespawn::SelfLinked);
        }
        self.respawns.respawn_time(master).map(LinkedRespawn::Pending)
    }
}

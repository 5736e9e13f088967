mod config;
pub mod entities;
pub mod persistence;
pub mod telemetry;
pub mod world;

pub use config::{AppConfig, MapConfig};
pub use world::manager::MapManager;
pub use world::map::{Map, MapOptions, MapStats, Transfer};

use entities::object::{ObjectGuid, ObjectKind, WorldObject};
use persistence::store::FileSpawnStore;
use std::sync::Arc;
use std::time::Instant;
use world::cell::{GridCoord, MAX_NUMBER_OF_GRIDS};
use world::hooks::MapHooks;
use world::spawn_group::build_templates;

/// Headless run: one map with a single observer player, ticked `ticks` times on
/// simulated time, then torn down.
pub fn run(args: &[String]) -> Result<(), String> {
    let config = AppConfig::from_args(args)?;
    telemetry::logging::init(&config.root)?;
    let map_config = MapConfig::load(&config.root)?;
    let store = Arc::new(FileSpawnStore::open(&config.root)?);
    let spawn_count = store.catalog().in_map(config.map_id).count();
    let observer_position = store
        .catalog()
        .in_map(config.map_id)
        .next()
        .map(|record| record.position)
        .unwrap_or_else(|| {
            GridCoord::new(MAX_NUMBER_OF_GRIDS / 2, MAX_NUMBER_OF_GRIDS / 2).center()
        });

    let templates = build_templates(map_config.spawn_groups.clone());
    let mut map = Map::new(
        config.map_id,
        map_config,
        store.clone(),
        templates,
        MapHooks::default(),
        MapOptions {
            terrain_root: Some(config.root.join("terrain")),
            ..MapOptions::default()
        },
    );
    map.add_object(WorldObject::new(
        ObjectGuid(0),
        ObjectKind::Player,
        0,
        observer_position,
    ))?;

    let mut manager = MapManager::new();
    manager.add_map(map)?;
    telemetry::logging::log_map(
        config.map_id,
        &format!(
            "simulation start: {} ticks of {} ms, {} spawns",
            config.ticks, config.tick_ms, spawn_count
        ),
    );

    let started = Instant::now();
    for _ in 0..config.ticks {
        manager.update(config.tick());
    }
    let wall = started.elapsed();

    let map = manager
        .map(config.map_id)
        .ok_or_else(|| format!("map {} vanished during simulation", config.map_id))?;
    let stats = map.stats().clone();
    let objects = map.object_count();
    let grids = map.grid_count();
    let pending_respawns = map.respawns().len();
    let terrain = map.terrain_stats().clone();
    manager.unload_all();

    println!("worldgrid: map {} simulation", config.map_id);
    println!("- root: {}", config.root.display());
    println!("- spawns: {}", spawn_count);
    println!(
        "- ticks: {} ({} ms simulated, {} ms wall)",
        stats.ticks,
        stats.ticks * config.tick_ms,
        wall.as_millis()
    );
    println!("- grids: {} resident, {} loads, {} unloads", grids, stats.grid_loads, stats.grid_unloads);
    println!("- objects: {} resident, {} spawned, {} removed", objects, stats.objects_spawned, stats.removals);
    println!(
        "- relocations: {} ({} failed, {} sent home)",
        stats.relocations, stats.failed_relocations, stats.returned_home
    );
    println!(
        "- respawns: {} pending, {} fired, {} cancelled, {} rescheduled",
        pending_respawns, stats.respawns_fired, stats.respawns_cancelled, stats.respawns_rescheduled
    );
    println!("- terrain cache: {} hits, {} misses", terrain.hits, terrain.misses);
    if stats.content_errors > 0 {
        println!("- content errors: {}", stats.content_errors);
    }
    if stats.lag_ticks > 0 {
        println!("- slow ticks: {}", stats.lag_ticks);
    }
    telemetry::logging::log_map(
        config.map_id,
        &format!("simulation end: {} ticks, {} grid loads", stats.ticks, stats.grid_loads),
    );
    Ok(())
}

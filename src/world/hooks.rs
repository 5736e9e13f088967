//! Collaborators a map talks to but does not own: entity construction, group conditions,
//! the update transport, pools and per-object behavior.

use crate::entities::object::{ObjectGuid, SpawnKey, WorldObject};
use crate::persistence::store::SpawnRecord;
use crate::telemetry::logging;
use crate::world::position::Position;
use crate::world::updates::ObjectUpdate;
use crate::world::weather::WeatherChange;
use std::collections::HashMap;
use std::time::Duration;

pub trait EntityFactory: Send {
    fn instantiate(&mut self, record: &SpawnRecord, guid: ObjectGuid) -> Result<WorldObject, String>;
}

pub trait ConditionEvaluator: Send {
    fn evaluate_group_condition(&self, map_id: u32, group_id: u32) -> bool;
}

pub trait UpdateTransport: Send {
    fn send_updates(&mut self, map_id: u32, updates: &[ObjectUpdate]);
    fn send_weather(&mut self, map_id: u32, changes: &[WeatherChange]);
}

pub trait PoolManager: Send {
    fn pool_of(&self, key: SpawnKey) -> Option<u32>;
    fn notify_pool_member(&mut self, map_id: u32, pool_id: u32, key: SpawnKey);
}

/// What a resident wants after its per-tick update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    Stay,
    MoveTo(Position),
    Despawn,
}

pub trait ObjectBehavior: Send {
    fn update(&mut self, object: &WorldObject, elapsed: Duration) -> Intent;
}

/// Builds objects straight from their spawn record.
#[derive(Debug, Default)]
pub struct TemplateFactory;

impl EntityFactory for TemplateFactory {
    fn instantiate(&mut self, record: &SpawnRecord, guid: ObjectGuid) -> Result<WorldObject, String> {
        let mut object = WorldObject::new(
            guid,
            record.key.kind.object_kind(),
            record.template_id,
            record.position,
        );
        object.spawn = Some(record.key);
        object.spawn_group = Some(record.group_id);
        object.respawn_delay_secs = record.respawn_delay_secs;
        object.active = record.active;
        object.world_object = record.world_object;
        Ok(object)
    }
}

/// Fixed condition results per group; groups not listed evaluate to `default`.
#[derive(Debug, Clone)]
pub struct StaticConditions {
    pub results: HashMap<u32, bool>,
    pub default: bool,
}

impl Default for StaticConditions {
    fn default() -> Self {
        Self {
            results: HashMap::new(),
            default: true,
        }
    }
}

impl ConditionEvaluator for StaticConditions {
    fn evaluate_group_condition(&self, _map_id: u32, group_id: u32) -> bool {
        self.results.get(&group_id).copied().unwrap_or(self.default)
    }
}

/// Drops object updates and records weather changes in the map log.
#[derive(Debug, Default)]
pub struct LoggingTransport {
    delivered: u64,
}

impl LoggingTransport {
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl UpdateTransport for LoggingTransport {
    fn send_updates(&mut self, _map_id: u32, updates: &[ObjectUpdate]) {
        self.delivered += updates.len() as u64;
    }

    fn send_weather(&mut self, map_id: u32, changes: &[WeatherChange]) {
        for change in changes {
            logging::log_map(
                map_id,
                &format!(
                    "weather zone {} -> {:?} ({:.2})",
                    change.zone_id, change.state, change.grade
                ),
            );
        }
    }
}

#[derive(Debug, Default)]
pub struct NoPools;

impl PoolManager for NoPools {
    fn pool_of(&self, _key: SpawnKey) -> Option<u32> {
        None
    }

    fn notify_pool_member(&mut self, _map_id: u32, _pool_id: u32, _key: SpawnKey) {}
}

#[derive(Debug, Default)]
pub struct IdleBehavior;

impl ObjectBehavior for IdleBehavior {
    fn update(&mut self, _object: &WorldObject, _elapsed: Duration) -> Intent {
        Intent::Stay
    }
}

pub struct MapHooks {
    pub factory: Box<dyn EntityFactory>,
    pub conditions: Box<dyn ConditionEvaluator>,
    pub transport: Box<dyn UpdateTransport>,
    pub pools: Box<dyn PoolManager>,
    pub behavior: Box<dyn ObjectBehavior>,
}

impl Default for MapHooks {
    fn default() -> Self {
        Self {
            factory: Box::new(TemplateFactory::default()),
            conditions: Box::new(StaticConditions::default()),
            transport: Box::new(LoggingTransport::default()),
            pools: Box::new(NoPools),
            behavior: Box::new(IdleBehavior),
        }
    }
}

use crate::world::cell::{CellCoord, GridCoord};
use crate::world::position::Position;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Generational handle for an object stored in a map's arena.
    pub struct ObjectKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectGuid(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Creature,
    GameObject,
    DynamicObject,
    Player,
    Corpse,
}

impl ObjectKind {
    pub fn is_movable(self) -> bool {
        matches!(
            self,
            ObjectKind::Creature | ObjectKind::GameObject | ObjectKind::DynamicObject
        )
    }
}

/// Kinds of content that come from the spawn store and can be respawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpawnKind {
    Creature,
    GameObject,
}

impl SpawnKind {
    pub fn object_kind(self) -> ObjectKind {
        match self {
            SpawnKind::Creature => ObjectKind::Creature,
            SpawnKind::GameObject => ObjectKind::GameObject,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SpawnKind::Creature => "creature",
            SpawnKind::GameObject => "gameobject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("creature") {
            Some(SpawnKind::Creature)
        } else if value.eq_ignore_ascii_case("gameobject") {
            Some(SpawnKind::GameObject)
        } else {
            None
        }
    }
}

/// Identity of a spawn point: at most one respawn entry exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpawnKey {
    pub kind: SpawnKind,
    pub spawn_id: u64,
}

impl SpawnKey {
    pub const fn creature(spawn_id: u64) -> Self {
        Self {
            kind: SpawnKind::Creature,
            spawn_id,
        }
    }

    pub const fn game_object(spawn_id: u64) -> Self {
        Self {
            kind: SpawnKind::GameObject,
            spawn_id,
        }
    }
}

impl std::fmt::Display for SpawnKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} spawn {}", self.kind.as_str(), self.spawn_id)
    }
}

/// Back-reference from an object to the container that holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectLocation {
    pub map_id: u32,
    pub grid: GridCoord,
    pub cell: CellCoord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Passive content that never forces anything to load.
    Grid,
    /// Objects that can be visible targets: players and flagged world objects.
    World,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldObject {
    pub guid: ObjectGuid,
    pub kind: ObjectKind,
    pub template_id: u32,
    pub spawn: Option<SpawnKey>,
    pub spawn_group: Option<u32>,
    pub position: Position,
    /// Respawn point. Passive objects fall back here when they cannot relocate.
    pub home: Position,
    pub location: Option<ObjectLocation>,
    pub active: bool,
    pub world_object: bool,
    pub alive: bool,
    pub escorted: bool,
    pub respawn_delay_secs: u64,
    pub(crate) needs_notify: bool,
    pub(crate) pending_removal: bool,
    pub(crate) update_count: u64,
}

impl WorldObject {
    pub fn new(guid: ObjectGuid, kind: ObjectKind, template_id: u32, position: Position) -> Self {
        Self {
            guid,
            kind,
            template_id,
            spawn: None,
            spawn_group: None,
            position,
            home: position,
            location: None,
            active: kind == ObjectKind::Player,
            world_object: kind == ObjectKind::Player,
            alive: true,
            escorted: false,
            respawn_delay_secs: 0,
            needs_notify: false,
            pending_removal: false,
            update_count: 0,
        }
    }

    pub fn container(&self) -> ContainerKind {
        if self.kind == ObjectKind::Player || self.world_object {
            ContainerKind::World
        } else {
            ContainerKind::Grid
        }
    }

    /// Residents that keep their grid from being evicted.
    pub fn blocks_unload(&self) -> bool {
        self.kind == ObjectKind::Player || self.active
    }

    pub fn is_in_world(&self) -> bool {
        self.location.is_some() && !self.pending_removal
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn current_cell(&self) -> Option<CellCoord> {
        self.location.map(|location| location.cell)
    }
}

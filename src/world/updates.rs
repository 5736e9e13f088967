use crate::entities::object::{ObjectGuid, ObjectKind};
use crate::world::cell::CellCoord;
use crate::world::position::Position;
use std::collections::HashMap;

/// One visibility-relevant change, delivered to the transport at the end of a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectUpdate {
    Created {
        guid: ObjectGuid,
        kind: ObjectKind,
        position: Position,
    },
    Moved {
        guid: ObjectGuid,
        from: CellCoord,
        to: CellCoord,
        position: Position,
    },
    Removed {
        guid: ObjectGuid,
    },
}

impl ObjectUpdate {
    pub fn guid(&self) -> ObjectGuid {
        match self {
            ObjectUpdate::Created { guid, .. }
            | ObjectUpdate::Moved { guid, .. }
            | ObjectUpdate::Removed { guid } => *guid,
        }
    }
}

/// Per-tick change set, one entry per object.
///
/// A move after a create stays a create at the new position, a move after a move keeps
/// the original source cell, and a removal after a create in the same tick cancels both.
#[derive(Debug, Default)]
pub struct UpdateBatch {
    updates: Vec<Option<ObjectUpdate>>,
    index: HashMap<ObjectGuid, usize>,
}

impl UpdateBatch {
    pub fn push(&mut self, update: ObjectUpdate) {
        let guid = update.guid();
        let Some(&slot) = self.index.get(&guid) else {
            self.index.insert(guid, self.updates.len());
            self.updates.push(Some(update));
            return;
        };
        let merged = match (self.updates[slot], update) {
            (Some(ObjectUpdate::Created { kind, .. }), ObjectUpdate::Moved { position, .. }) => {
                Some(ObjectUpdate::Created { guid, kind, position })
            }
            (Some(ObjectUpdate::Moved { from, .. }), ObjectUpdate::Moved { to, position, .. }) => {
                Some(ObjectUpdate::Moved { guid, from, to, position })
            }
            (Some(ObjectUpdate::Created { .. }), ObjectUpdate::Removed { .. }) => None,
            (_, update) => Some(update),
        };
        self.updates[slot] = merged;
    }

    pub fn len(&self) -> usize {
        self.updates.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn take(&mut self) -> Vec<ObjectUpdate> {
        self.index.clear();
        std::mem::take(&mut self.updates).into_iter().flatten().collect()
    }
}

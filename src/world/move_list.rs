use crate::entities::object::{ObjectKey, ObjectKind};
use crate::world::position::Position;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveCommand {
    pub key: ObjectKey,
    pub destination: Position,
}

/// Deferred relocations for one object kind, deduplicated by handle.
#[derive(Debug, Default)]
pub struct MoveQueue {
    commands: Vec<MoveCommand>,
    index: HashMap<ObjectKey, usize>,
}

impl MoveQueue {
    /// Returns false when an existing command was overwritten instead of appended.
    pub fn enqueue(&mut self, key: ObjectKey, destination: Position) -> bool {
        if let Some(&slot) = self.index.get(&key) {
            self.commands[slot].destination = destination;
            return false;
        }
        self.index.insert(key, self.commands.len());
        self.commands.push(MoveCommand { key, destination });
        true
    }

    pub fn cancel(&mut self, key: ObjectKey) -> bool {
        let Some(slot) = self.index.remove(&key) else {
            return false;
        };
        self.commands.swap_remove(slot);
        if let Some(moved) = self.commands.get(slot) {
            self.index.insert(moved.key, slot);
        }
        true
    }

    /// Hands out everything queued so far; commands enqueued while the batch is applied
    /// land in the next batch.
    pub fn take_batch(&mut self) -> Vec<MoveCommand> {
        self.index.clear();
        std::mem::take(&mut self.commands)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct MoveList {
    creatures: MoveQueue,
    game_objects: MoveQueue,
    dynamic_objects: MoveQueue,
}

pub const MOVABLE_KINDS: [ObjectKind; 3] = [
    ObjectKind::Creature,
    ObjectKind::GameObject,
    ObjectKind::DynamicObject,
];

impl MoveList {
    fn queue_mut(&mut self, kind: ObjectKind) -> Option<&mut MoveQueue> {
        match kind {
            ObjectKind::Creature => Some(&mut self.creatures),
            ObjectKind::GameObject => Some(&mut self.game_objects),
            ObjectKind::DynamicObject => Some(&mut self.dynamic_objects),
            ObjectKind::Player | ObjectKind::Corpse => None,
        }
    }

    pub fn enqueue(&mut self, kind: ObjectKind, key: ObjectKey, destination: Position) -> bool {
        match self.queue_mut(kind) {
            Some(queue) => queue.enqueue(key, destination),
            None => panic!("{:?} objects are not moved through the move list", kind),
        }
    }

    pub fn cancel(&mut self, kind: ObjectKind, key: ObjectKey) -> bool {
        self.queue_mut(kind).map_or(false, |queue| queue.cancel(key))
    }

    pub fn take_batch(&mut self, kind: ObjectKind) -> Vec<MoveCommand> {
        self.queue_mut(kind).map(MoveQueue::take_batch).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.creatures.len() + self.game_objects.len() + self.dynamic_objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn keys(count: usize) -> Vec<ObjectKey> {
        let mut map: SlotMap<ObjectKey, ()> = SlotMap::with_key();
        (0..count).map(|_| map.insert(())).collect()
    }

    #[test]
    fn second_enqueue_overwrites_pending_position() {
        let key = keys(1)[0];
        let mut queue = MoveQueue::default();
        assert!(queue.enqueue(key, Position::new(1.0, 1.0, 0.0)));
        assert!(!queue.enqueue(key, Position::new(2.0, 2.0, 0.0)));
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.take_batch(),
            vec![MoveCommand {
                key,
                destination: Position::new(2.0, 2.0, 0.0)
            }]
        );
    }

    #[test]
    fn cancel_keeps_index_consistent() {
        let ks = keys(3);
        let mut queue = MoveQueue::default();
        for (i, key) in ks.iter().enumerate() {
            queue.enqueue(*key, Position::new(i as f32, 0.0, 0.0));
        }
        assert!(queue.cancel(ks[0]));
        assert!(!queue.cancel(ks[0]));
        assert_eq!(queue.len(), 2);
        assert!(!queue.enqueue(ks[2], Position::new(9.0, 0.0, 0.0)));
        let batch = queue.take_batch();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().any(|cmd| cmd.key == ks[2] && cmd.destination.x == 9.0));
    }

    #[test]
    fn take_batch_clears_queue() {
        let ks = keys(2);
        let mut queue = MoveQueue::default();
        queue.enqueue(ks[0], Position::default());
        let batch = queue.take_batch();
        assert_eq!(batch.len(), 1);
        assert!(queue.is_empty());
        assert!(queue.enqueue(ks[0], Position::default()));
    }

    #[test]
    fn kinds_have_separate_queues() {
        let ks = keys(2);
        let mut list = MoveList::default();
        list.enqueue(ObjectKind::Creature, ks[0], Position::default());
        list.enqueue(ObjectKind::GameObject, ks[1], Position::default());
        assert_eq!(list.len(), 2);
        assert_eq!(list.take_batch(ObjectKind::Creature).len(), 1);
        assert_eq!(
            list.take_batch(ObjectKind::GameObject),
            vec![MoveCommand {
                key: ks[1],
                destination: Position::default()
            }]
        );
        assert!(list.take_batch(ObjectKind::Player).is_empty());
    }

    #[test]
    #[should_panic(expected = "not moved through the move list")]
    fn players_cannot_be_enqueued() {
        let key = keys(1)[0];
        MoveList::default().enqueue(ObjectKind::Player, key, Position::default());
    }
}

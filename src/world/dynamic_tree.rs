use crate::entities::object::ObjectKey;
use crate::world::position::Position;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    key: ObjectKey,
    position: Position,
}

/// Radius index over game objects.
///
/// Inserts, moves and removals are staged and become visible to queries on the next
/// `balance`. Committed entries are kept sorted by `x` so a query only scans the slice
/// overlapping its x range.
#[derive(Debug, Default)]
pub struct DynamicTree {
    committed: Vec<Entry>,
    staged: HashMap<ObjectKey, Option<Position>>,
}

impl DynamicTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ObjectKey, position: Position) {
        self.staged.insert(key, Some(position));
    }

    pub fn update(&mut self, key: ObjectKey, position: Position) {
        self.staged.insert(key, Some(position));
    }

    pub fn remove(&mut self, key: ObjectKey) {
        self.staged.insert(key, None);
    }

    /// Applies staged changes and rebuilds the sorted order. No-op when nothing is staged.
    pub fn balance(&mut self) {
        if self.staged.is_empty() {
            return;
        }
        let staged = std::mem::take(&mut self.staged);
        self.committed.retain(|entry| !staged.contains_key(&entry.key));
        self.committed.extend(
            staged
                .into_iter()
                .filter_map(|(key, position)| position.map(|position| Entry { key, position })),
        );
        self.committed
            .sort_by(|a, b| a.position.x.total_cmp(&b.position.x));
    }

    pub fn query(&self, center: Position, radius: f32) -> Vec<ObjectKey> {
        let radius = radius.max(0.0);
        let start = self
            .committed
            .partition_point(|entry| entry.position.x < center.x - radius);
        self.committed[start..]
            .iter()
            .take_while(|entry| entry.position.x <= center.x + radius)
            .filter(|entry| entry.position.distance_2d(center) <= radius)
            .map(|entry| entry.key)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
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
    fn inserts_are_invisible_until_balanced() {
        let ks = keys(1);
        let mut tree = DynamicTree::new();
        tree.insert(ks[0], Position::new(5.0, 5.0, 0.0));
        assert!(tree.query(Position::new(5.0, 5.0, 0.0), 1.0).is_empty());
        tree.balance();
        assert_eq!(tree.query(Position::new(5.0, 5.0, 0.0), 1.0), vec![ks[0]]);
        tree.balance();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn query_filters_by_distance() {
        let ks = keys(3);
        let mut tree = DynamicTree::new();
        tree.insert(ks[0], Position::new(0.0, 0.0, 0.0));
        tree.insert(ks[1], Position::new(3.0, 4.0, 0.0));
        tree.insert(ks[2], Position::new(3.0, 40.0, 0.0));
        tree.balance();
        let mut found = tree.query(Position::default(), 5.0);
        found.sort();
        let mut expected = vec![ks[0], ks[1]];
        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn moves_and_removals_apply_on_balance() {
        let ks = keys(2);
        let mut tree = DynamicTree::new();
        tree.insert(ks[0], Position::new(0.0, 0.0, 0.0));
        tree.insert(ks[1], Position::new(1.0, 0.0, 0.0));
        tree.balance();
        tree.update(ks[0], Position::new(100.0, 0.0, 0.0));
        tree.remove(ks[1]);
        assert_eq!(tree.query(Position::default(), 2.0).len(), 2);
        tree.balance();
        assert!(tree.query(Position::default(), 2.0).is_empty());
        assert_eq!(tree.query(Position::new(100.0, 0.0, 0.0), 1.0), vec![ks[0]]);
        assert_eq!(tree.len(), 1);
    }
}

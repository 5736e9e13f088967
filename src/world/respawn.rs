use crate::entities::object::SpawnKey;
use crate::world::time::GameTime;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

pub const WEEK_SECS: u64 = 7 * 24 * 60 * 60;

/// A scheduled re-creation of a removed spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RespawnInfo {
    pub key: SpawnKey,
    pub template_id: u32,
    pub respawn_time: GameTime,
    pub grid_id: u32,
}

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    time: GameTime,
    sequence: u64,
    key: SpawnKey,
}

/// Min-heap by time, first scheduled first among equal times.
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for HeapEntry {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Inserted,
    /// An existing later entry was replaced; carries the previous time.
    Replaced(GameTime),
    /// An entry at the same or an earlier time already exists; carries that time.
    Rejected(GameTime),
}

impl ScheduleOutcome {
    pub fn accepted(self) -> bool {
        !matches!(self, ScheduleOutcome::Rejected(_))
    }
}

/// Time-ordered respawn queue with an identity index.
///
/// Replaced or cancelled entries stay in the heap as stale nodes and are skipped lazily;
/// an entry is live only while its sequence number matches the index.
#[derive(Debug, Default)]
pub struct RespawnScheduler {
    heap: BinaryHeap<HeapEntry>,
    index: HashMap<SpawnKey, (RespawnInfo, u64)>,
    next_sequence: u64,
}

impl RespawnScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest wins: a request at the same or a later time than the pending one is dropped.
    pub fn schedule(&mut self, info: RespawnInfo) -> ScheduleOutcome {
        if info.respawn_time.0 == 0 {
            return ScheduleOutcome::Rejected(info.respawn_time);
        }
        let previous = match self.index.get(&info.key) {
            Some((existing, _)) if existing.respawn_time <= info.respawn_time => {
                return ScheduleOutcome::Rejected(existing.respawn_time);
            }
            Some((existing, _)) => Some(existing.respawn_time),
            None => None,
        };
        self.push(info);
        match previous {
            Some(time) => ScheduleOutcome::Replaced(time),
            None => ScheduleOutcome::Inserted,
        }
    }

    /// Adds an entry restored from the store. The identity must not be scheduled yet.
    pub fn insert(&mut self, info: RespawnInfo) {
        if self.index.contains_key(&info.key) {
            panic!("respawn for {} inserted twice without cancel", info.key);
        }
        self.push(info);
    }

    fn push(&mut self, info: RespawnInfo) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.index.insert(info.key, (info, sequence));
        self.heap.push(HeapEntry {
            time: info.respawn_time,
            sequence,
            key: info.key,
        });
    }

    pub fn cancel(&mut self, key: SpawnKey) -> Option<RespawnInfo> {
        self.index.remove(&key).map(|(info, _)| info)
    }

    pub fn get(&self, key: SpawnKey) -> Option<&RespawnInfo> {
        self.index.get(&key).map(|(info, _)| info)
    }

    pub fn respawn_time(&self, key: SpawnKey) -> Option<GameTime> {
        self.get(key).map(|info| info.respawn_time)
    }

    fn discard_stale(&mut self) {
        while let Some(top) = self.heap.peek() {
            match self.index.get(&top.key) {
                Some((_, sequence)) if *sequence == top.sequence => return,
                _ => {
                    self.heap.pop();
                }
            }
        }
    }

    /// Removes and returns the earliest entry if it is due. The entry is gone from both the
    /// heap and the index before the caller acts on it.
    pub fn pop_due(&mut self, now: GameTime) -> Option<RespawnInfo> {
        self.discard_stale();
        let top = self.heap.peek()?;
        if top.time > now {
            return None;
        }
        let entry = self.heap.pop()?;
        self.index.remove(&entry.key).map(|(info, _)| info)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    GroupInactive,
    AlreadySpawned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespawnCheck {
    Proceed,
    Reschedule(GameTime),
    Cancel(CancelReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkedRespawn {
    /// The spawn is linked to itself and never respawns on its own.
    SelfLinked,
    /// The spawn it depends on is still waiting to respawn.
    Pending(GameTime),
}

/// Facts about the live world that decide whether a due respawn may happen.
pub trait RespawnConditions {
    fn is_group_active(&self, key: SpawnKey) -> bool;
    fn has_blocking_instance(&self, key: SpawnKey) -> bool;
    fn linked_respawn(&self, key: SpawnKey) -> Option<LinkedRespawn>;
}

/// `jitter_secs` spreads out linked respawns that were waiting on the same master.
pub fn check_respawn(
    info: &RespawnInfo,
    conditions: &impl RespawnConditions,
    now: GameTime,
    jitter_secs: u64,
) -> RespawnCheck {
    if !conditions.is_group_active(info.key) {
        return RespawnCheck::Cancel(CancelReason::GroupInactive);
    }
    if conditions.has_blocking_instance(info.key) {
        return RespawnCheck::Cancel(CancelReason::AlreadySpawned);
    }
    match conditions.linked_respawn(info.key) {
        Some(LinkedRespawn::SelfLinked) => RespawnCheck::Reschedule(now.plus_secs(WEEK_SECS)),
        Some(LinkedRespawn::Pending(master)) => {
            let base = master.max(now);
            RespawnCheck::Reschedule(base.plus_secs(jitter_secs.max(1)))
        }
        None => RespawnCheck::Proceed,
    }
}

use crate::entities::object::{SpawnKey, SpawnKind};
use crate::world::cell::GridCoord;
use crate::world::position::Position;
use crate::world::spawn_group::DEFAULT_GROUP_ID;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Static placement of one piece of spawnable content.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRecord {
    pub key: SpawnKey,
    pub template_id: u32,
    pub map_id: u32,
    pub position: Position,
    pub group_id: u32,
    pub respawn_delay_secs: u64,
    /// Master spawn that has to be up before this one respawns.
    pub linked_to: Option<SpawnKey>,
    pub active: bool,
    pub world_object: bool,
}

impl SpawnRecord {
    pub fn new(key: SpawnKey, template_id: u32, map_id: u32, position: Position) -> Self {
        Self {
            key,
            template_id,
            map_id,
            position,
            group_id: DEFAULT_GROUP_ID,
            respawn_delay_secs: 300,
            linked_to: None,
            active: false,
            world_object: false,
        }
    }

    pub fn grid(&self) -> Option<GridCoord> {
        GridCoord::from_position(self.position)
    }
}

/// Durable respawn entry, keyed by map, instance and spawn identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRespawn {
    pub map_id: u32,
    pub instance_id: u32,
    pub kind: SpawnKind,
    pub spawn_id: u64,
    pub time: u64,
}

impl StoredRespawn {
    pub fn key(&self) -> SpawnKey {
        SpawnKey {
            kind: self.kind,
            spawn_id: self.spawn_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespawnWrite {
    Upsert(u64),
    Delete,
}

pub type RespawnWrites = BTreeMap<SpawnKey, RespawnWrite>;

/// Spawn database and respawn persistence shared by every map.
pub trait SpawnStore: Send + Sync {
    fn load_spawns_for_grid(&self, map_id: u32, grid: GridCoord) -> Result<Vec<SpawnRecord>, String>;
    fn spawn_record(&self, map_id: u32, key: SpawnKey) -> Option<SpawnRecord>;
    fn spawns_in_group(&self, map_id: u32, group_id: u32) -> Vec<SpawnRecord>;
    fn load_respawns(&self, map_id: u32, instance_id: u32) -> Result<Vec<StoredRespawn>, String>;
    fn upsert_respawn(&self, respawn: &StoredRespawn) -> Result<(), String>;
    fn delete_respawn(&self, map_id: u32, instance_id: u32, key: SpawnKey) -> Result<(), String>;

    /// Applies a batch of writes for one map instance and returns the identities whose
    /// write failed. Stores that can write the batch at once override this.
    fn write_respawns(
        &self,
        map_id: u32,
        instance_id: u32,
        writes: &RespawnWrites,
    ) -> Vec<(SpawnKey, String)> {
        let mut errors = Vec::new();
        for (&key, &write) in writes {
            let result = match write {
                RespawnWrite::Upsert(time) => self.upsert_respawn(&StoredRespawn {
                    map_id,
                    instance_id,
                    kind: key.kind,
                    spawn_id: key.spawn_id,
                    time,
                }),
                RespawnWrite::Delete => self.delete_respawn(map_id, instance_id, key),
            };
            if let Err(err) = result {
                errors.push((key, err));
            }
        }
        errors
    }
}

/// Immutable spawn records indexed by grid and identity.
#[derive(Debug, Default)]
pub struct SpawnCatalog {
    records: Vec<SpawnRecord>,
    by_grid: HashMap<(u32, GridCoord), Vec<usize>>,
    by_key: HashMap<(u32, SpawnKey), usize>,
}

impl SpawnCatalog {
    pub fn new(records: Vec<SpawnRecord>) -> Result<Self, String> {
        let mut catalog = SpawnCatalog::default();
        for record in records {
            let grid = record.grid().ok_or_else(|| {
                format!("{} on map {} is outside the map", record.key, record.map_id)
            })?;
            let slot = catalog.records.len();
            if catalog.by_key.insert((record.map_id, record.key), slot).is_some() {
                return Err(format!("duplicate {} on map {}", record.key, record.map_id));
            }
            catalog.by_grid.entry((record.map_id, grid)).or_default().push(slot);
            catalog.records.push(record);
        }
        Ok(catalog)
    }

    pub fn in_grid(&self, map_id: u32, grid: GridCoord) -> Vec<SpawnRecord> {
        self.by_grid
            .get(&(map_id, grid))
            .map(|slots| slots.iter().map(|&slot| self.records[slot].clone()).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, map_id: u32, key: SpawnKey) -> Option<&SpawnRecord> {
        self.by_key.get(&(map_id, key)).map(|&slot| &self.records[slot])
    }

    pub fn in_group(&self, map_id: u32, group_id: u32) -> Vec<SpawnRecord> {
        self.records
            .iter()
            .filter(|record| record.map_id == map_id && record.group_id == group_id)
            .cloned()
            .collect()
    }

    pub fn in_map(&self, map_id: u32) -> impl Iterator<Item = &SpawnRecord> {
        self.records.iter().filter(move |record| record.map_id == map_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

type RespawnTable = HashMap<(u32, u32, SpawnKey), u64>;

/// In-process store, used by tests and by maps without a data root.
#[derive(Default)]
pub struct MemorySpawnStore {
    catalog: SpawnCatalog,
    respawns: Mutex<RespawnTable>,
    grid_loads: AtomicUsize,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemorySpawnStore {
    pub fn new(records: Vec<SpawnRecord>) -> Result<Self, String> {
        Ok(Self {
            catalog: SpawnCatalog::new(records)?,
            ..Self::default()
        })
    }

    pub fn with_respawns(self, respawns: &[StoredRespawn]) -> Self {
        if let Ok(mut table) = self.respawns.lock() {
            for respawn in respawns {
                table.insert(
                    (respawn.map_id, respawn.instance_id, respawn.key()),
                    respawn.time,
                );
            }
        }
        self
    }

    /// Number of `load_spawns_for_grid` calls so far.
    pub fn grid_loads(&self) -> usize {
        self.grid_loads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn stored_respawn(&self, map_id: u32, instance_id: u32, key: SpawnKey) -> Option<u64> {
        self.respawns
            .lock()
            .ok()
            .and_then(|table| table.get(&(map_id, instance_id, key)).copied())
    }

    fn table(&self) -> Result<std::sync::MutexGuard<'_, RespawnTable>, String> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err("respawn store unavailable".to_string());
        }
        self.respawns
            .lock()
            .map_err(|_| "respawn store lock poisoned".to_string())
    }
}

impl SpawnStore for MemorySpawnStore {
    fn load_spawns_for_grid(&self, map_id: u32, grid: GridCoord) -> Result<Vec<SpawnRecord>, String> {
        self.grid_loads.fetch_add(1, Ordering::Relaxed);
        Ok(self.catalog.in_grid(map_id, grid))
    }

    fn spawn_record(&self, map_id: u32, key: SpawnKey) -> Option<SpawnRecord> {
        self.catalog.get(map_id, key).cloned()
    }

    fn spawns_in_group(&self, map_id: u32, group_id: u32) -> Vec<SpawnRecord> {
        self.catalog.in_group(map_id, group_id)
    }

    fn load_respawns(&self, map_id: u32, instance_id: u32) -> Result<Vec<StoredRespawn>, String> {
        let table = self
            .respawns
            .lock()
            .map_err(|_| "respawn store lock poisoned".to_string())?;
        let mut respawns: Vec<StoredRespawn> = table
            .iter()
            .filter(|((map, instance, _), _)| *map == map_id && *instance == instance_id)
            .map(|((map, instance, key), time)| StoredRespawn {
                map_id: *map,
                instance_id: *instance,
                kind: key.kind,
                spawn_id: key.spawn_id,
                time: *time,
            })
            .collect();
        respawns.sort_by_key(|respawn| (respawn.time, respawn.kind, respawn.spawn_id));
        Ok(respawns)
    }

    fn upsert_respawn(&self, respawn: &StoredRespawn) -> Result<(), String> {
        let mut table = self.table()?;
        table.insert(
            (respawn.map_id, respawn.instance_id, respawn.key()),
            respawn.time,
        );
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete_respawn(&self, map_id: u32, instance_id: u32, key: SpawnKey) -> Result<(), String> {
        let mut table = self.table()?;
        table.remove(&(map_id, instance_id, key));
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Spawns from `<root>/spawns.db`, respawn schedules as YAML under `<root>/respawn/`.
pub struct FileSpawnStore {
    catalog: SpawnCatalog,
    respawn_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSpawnStore {
    pub fn open(root: &Path) -> Result<Self, String> {
        let spawn_path = root.join("spawns.db");
        let records = if spawn_path.exists() {
            load_spawn_db(&spawn_path)?
        } else {
            eprintln!(
                "worldgrid: no spawn database at {}, starting empty",
                spawn_path.display()
            );
            Vec::new()
        };
        Ok(Self {
            catalog: SpawnCatalog::new(records)?,
            respawn_dir: root.join("respawn"),
            write_lock: Mutex::new(()),
        })
    }

    pub fn catalog(&self) -> &SpawnCatalog {
        &self.catalog
    }

    fn respawn_path(&self, map_id: u32, instance_id: u32) -> PathBuf {
        self.respawn_dir
            .join(format!("{:03}_{:05}.yaml", map_id, instance_id))
    }

    fn read_file(&self, map_id: u32, instance_id: u32) -> Result<BTreeMap<SpawnKey, u64>, String> {
        let path = self.respawn_path(map_id, instance_id);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => {
                return Err(format!("respawn read failed for {}: {}", path.display(), err));
            }
        };
        let entries: Vec<StoredRespawn> = serde_yaml::from_str(&data)
            .map_err(|err| format!("respawn parse failed for {}: {}", path.display(), err))?;
        Ok(entries
            .into_iter()
            .map(|entry| (entry.key(), entry.time))
            .collect())
    }

    fn write_file(
        &self,
        map_id: u32,
        instance_id: u32,
        entries: &BTreeMap<SpawnKey, u64>,
    ) -> Result<(), String> {
        fs::create_dir_all(&self.respawn_dir).map_err(|err| {
            format!(
                "respawn dir create failed for {}: {}",
                self.respawn_dir.display(),
                err
            )
        })?;
        let rows: Vec<StoredRespawn> = entries
            .iter()
            .map(|(key, time)| StoredRespawn {
                map_id,
                instance_id,
                kind: key.kind,
                spawn_id: key.spawn_id,
                time: *time,
            })
            .collect();
        let data = serde_yaml::to_string(&rows)
            .map_err(|err| format!("respawn serialize failed: {}", err))?;
        let path = self.respawn_path(map_id, instance_id);
        let tmp_path = path.with_extension("yaml.tmp");
        fs::write(&tmp_path, data)
            .map_err(|err| format!("respawn write failed for {}: {}", tmp_path.display(), err))?;
        fs::rename(&tmp_path, &path)
            .map_err(|err| format!("respawn rename failed for {}: {}", path.display(), err))
    }

    fn modify(
        &self,
        map_id: u32,
        instance_id: u32,
        change: impl FnOnce(&mut BTreeMap<SpawnKey, u64>),
    ) -> Result<(), String> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| "respawn file lock poisoned".to_string())?;
        let mut entries = self.read_file(map_id, instance_id)?;
        change(&mut entries);
        self.write_file(map_id, instance_id, &entries)
    }
}

impl SpawnStore for FileSpawnStore {
    fn load_spawns_for_grid(&self, map_id: u32, grid: GridCoord) -> Result<Vec<SpawnRecord>, String> {
        Ok(self.catalog.in_grid(map_id, grid))
    }

    fn spawn_record(&self, map_id: u32, key: SpawnKey) -> Option<SpawnRecord> {
        self.catalog.get(map_id, key).cloned()
    }

    fn spawns_in_group(&self, map_id: u32, group_id: u32) -> Vec<SpawnRecord> {
        self.catalog.in_group(map_id, group_id)
    }

    fn load_respawns(&self, map_id: u32, instance_id: u32) -> Result<Vec<StoredRespawn>, String> {
        let entries = self.read_file(map_id, instance_id)?;
        Ok(entries
            .into_iter()
            .map(|(key, time)| StoredRespawn {
                map_id,
                instance_id,
                kind: key.kind,
                spawn_id: key.spawn_id,
                time,
            })
            .collect())
    }

    fn upsert_respawn(&self, respawn: &StoredRespawn) -> Result<(), String> {
        self.modify(respawn.map_id, respawn.instance_id, |entries| {
            entries.insert(respawn.key(), respawn.time);
        })
    }

    fn delete_respawn(&self, map_id: u32, instance_id: u32, key: SpawnKey) -> Result<(), String> {
        self.modify(map_id, instance_id, |entries| {
            entries.remove(&key);
        })
    }

    fn write_respawns(
        &self,
        map_id: u32,
        instance_id: u32,
        writes: &RespawnWrites,
    ) -> Vec<(SpawnKey, String)> {
        if writes.is_empty() {
            return Vec::new();
        }
        let result = self.modify(map_id, instance_id, |entries| {
            for (&key, &write) in writes {
                match write {
                    RespawnWrite::Upsert(time) => {
                        entries.insert(key, time);
                    }
                    RespawnWrite::Delete => {
                        entries.remove(&key);
                    }
                }
            }
        });
        match result {
            Ok(()) => Vec::new(),
            Err(err) => writes.keys().map(|&key| (key, err.clone())).collect(),
        }
    }
}

/// Parses the spawn database.
///
/// One record per line:
/// `<kind> <spawn-id> <template> <map> <x> <y> <z> <respawn-secs> [group=N] [linked=kind:id] [active] [world]`.
/// `#` starts a comment and a line holding only `0` ends the file.
pub fn load_spawn_db(path: &Path) -> Result<Vec<SpawnRecord>, String> {
    let bytes = fs::read(path).map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(err) => {
            let bytes = err.into_bytes();
            eprintln!(
                "worldgrid: spawn db contained invalid UTF-8; decoding lossy: {}",
                path.display()
            );
            String::from_utf8_lossy(&bytes).into_owned()
        }
    };
    parse_spawn_db(&content)
}

pub fn parse_spawn_db(content: &str) -> Result<Vec<SpawnRecord>, String> {
    let mut records = Vec::new();
    for (line_no, raw_line) in content.lines().enumerate() {
        let line_no = line_no + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        if line == "0" {
            break;
        }
        records.push(parse_spawn_line(line, line_no)?);
    }
    Ok(records)
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn parse_spawn_line(line: &str, line_no: usize) -> Result<SpawnRecord, String> {
    let mut parts = line.split_whitespace();
    let kind = parse_kind(parts.next(), line_no)?;
    let spawn_id = parse_field::<u64>(parts.next(), "spawn id", line_no)?;
    let template_id = parse_field::<u32>(parts.next(), "template", line_no)?;
    let map_id = parse_field::<u32>(parts.next(), "map", line_no)?;
    let x = parse_field::<f32>(parts.next(), "x", line_no)?;
    let y = parse_field::<f32>(parts.next(), "y", line_no)?;
    let z = parse_field::<f32>(parts.next(), "z", line_no)?;
    let respawn_delay_secs = parse_field::<u64>(parts.next(), "respawn", line_no)?;

    let key = SpawnKey { kind, spawn_id };
    let mut record = SpawnRecord::new(key, template_id, map_id, Position::new(x, y, z));
    record.respawn_delay_secs = respawn_delay_secs;
    for option in parts {
        if let Some(value) = option.strip_prefix("group=") {
            record.group_id = parse_field::<u32>(Some(value), "group", line_no)?;
        } else if let Some(value) = option.strip_prefix("linked=") {
            let (kind, id) = value
                .split_once(':')
                .ok_or_else(|| format!("spawn db line {} invalid linked", line_no))?;
            record.linked_to = Some(SpawnKey {
                kind: parse_kind(Some(kind), line_no)?,
                spawn_id: parse_field::<u64>(Some(id), "linked id", line_no)?,
            });
        } else if option.eq_ignore_ascii_case("active") {
            record.active = true;
        } else if option.eq_ignore_ascii_case("world") {
            record.world_object = true;
        } else {
            return Err(format!("spawn db line {} unknown option '{}'", line_no, option));
        }
    }
    Ok(record)
}

fn parse_kind(value: Option<&str>, line_no: usize) -> Result<SpawnKind, String> {
    let value = value.ok_or_else(|| format!("spawn db line {} missing kind", line_no))?;
    SpawnKind::parse(value).ok_or_else(|| format!("spawn db line {} invalid kind '{}'", line_no, value))
}

fn parse_field<T: std::str::FromStr>(value: Option<&str>, label: &str, line_no: usize) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("spawn db line {} missing {}", line_no, label))?;
    value
        .parse::<T>()
        .map_err(|_| format!("spawn db line {} invalid {}", line_no, label))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("worldgrid-store-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    const SAMPLE: &str = "\
# kind id template map x y z respawn options
creature 42 1001 0 10.0 20.0 0.0 120 group=3 active
gameobject 7 55 0 -100 -100 5 30 linked=creature:42 world
creature 43 1001 1 0 0 0 60
0
creature 99 1 0 0 0 0 1
";

    #[test]
    fn parses_spawn_db() {
        let records = parse_spawn_db(SAMPLE).unwrap();
        assert_eq!(records.len(), 3);
        let first = &records[0];
        assert_eq!(first.key, SpawnKey::creature(42));
        assert_eq!(first.group_id, 3);
        assert!(first.active);
        assert_eq!(first.respawn_delay_secs, 120);
        let second = &records[1];
        assert_eq!(second.linked_to, Some(SpawnKey::creature(42)));
        assert!(second.world_object);
        assert_eq!(second.group_id, DEFAULT_GROUP_ID);
    }

    #[test]
    fn reports_line_numbers() {
        let err = parse_spawn_db("creature 1 2 0 0 0 0 5\ncreature x 2 0 0 0 0 5").unwrap_err();
        assert!(err.contains("line 2"), "{err}");
        let err = parse_spawn_db("dragon 1 2 0 0 0 0 5").unwrap_err();
        assert!(err.contains("invalid kind"), "{err}");
        let err = parse_spawn_db("creature 1 2 0 0 0 0 5 shiny").unwrap_err();
        assert!(err.contains("unknown option"), "{err}");
    }

    #[test]
    fn catalog_indexes_by_map_and_grid() {
        let catalog = SpawnCatalog::new(parse_spawn_db(SAMPLE).unwrap()).unwrap();
        let grid = GridCoord::from_position(Position::new(10.0, 20.0, 0.0)).unwrap();
        let in_grid = catalog.in_grid(0, grid);
        assert_eq!(in_grid.len(), 1);
        assert_eq!(in_grid[0].key, SpawnKey::creature(42));
        assert!(catalog.get(1, SpawnKey::creature(43)).is_some());
        assert!(catalog.get(0, SpawnKey::creature(43)).is_none());
        assert_eq!(catalog.in_group(0, 3).len(), 1);
    }

    #[test]
    fn catalog_rejects_duplicates_and_off_map_records() {
        let record = SpawnRecord::new(SpawnKey::creature(1), 1, 0, Position::default());
        assert!(SpawnCatalog::new(vec![record.clone(), record.clone()]).is_err());
        let mut far = record;
        far.position = Position::new(1.0e6, 0.0, 0.0);
        assert!(SpawnCatalog::new(vec![far]).is_err());
    }

    #[test]
    fn memory_store_counts_loads_and_writes() {
        let store = MemorySpawnStore::new(parse_spawn_db(SAMPLE).unwrap()).unwrap();
        store.load_spawns_for_grid(0, GridCoord::new(32, 32)).unwrap();
        assert_eq!(store.grid_loads(), 1);
        let entry = StoredRespawn {
            map_id: 0,
            instance_id: 0,
            kind: SpawnKind::Creature,
            spawn_id: 42,
            time: 500,
        };
        store.upsert_respawn(&entry).unwrap();
        assert_eq!(store.stored_respawn(0, 0, SpawnKey::creature(42)), Some(500));
        assert_eq!(store.load_respawns(0, 0).unwrap(), vec![entry]);
        assert!(store.load_respawns(0, 1).unwrap().is_empty());
        store.delete_respawn(0, 0, SpawnKey::creature(42)).unwrap();
        assert_eq!(store.stored_respawn(0, 0, SpawnKey::creature(42)), None);
        assert_eq!(store.writes(), 2);
        store.set_fail_writes(true);
        assert!(store.upsert_respawn(&entry).is_err());
    }

    #[test]
    fn file_store_persists_respawns_across_reopen() {
        let root = temp_root("reopen");
        fs::write(root.join("spawns.db"), SAMPLE).unwrap();
        let store = FileSpawnStore::open(&root).unwrap();
        assert_eq!(store.catalog().len(), 3);
        let entry = StoredRespawn {
            map_id: 0,
            instance_id: 2,
            kind: SpawnKind::GameObject,
            spawn_id: 7,
            time: 900,
        };
        store.upsert_respawn(&entry).unwrap();
        store
            .upsert_respawn(&StoredRespawn { spawn_id: 8, ..entry })
            .unwrap();
        store.delete_respawn(0, 2, SpawnKey::game_object(8)).unwrap();

        let reopened = FileSpawnStore::open(&root).unwrap();
        assert_eq!(reopened.load_respawns(0, 2).unwrap(), vec![entry]);
        assert!(reopened.load_respawns(0, 0).unwrap().is_empty());
    }

    #[test]
    fn file_store_applies_a_batch_in_one_write() {
        let root = temp_root("batch");
        let store = FileSpawnStore::open(&root).unwrap();
        store
            .upsert_respawn(&StoredRespawn {
                map_id: 1,
                instance_id: 0,
                kind: SpawnKind::Creature,
                spawn_id: 3,
                time: 40,
            })
            .unwrap();
        let mut writes = RespawnWrites::new();
        writes.insert(SpawnKey::creature(3), RespawnWrite::Delete);
        writes.insert(SpawnKey::creature(4), RespawnWrite::Upsert(70));
        writes.insert(SpawnKey::game_object(4), RespawnWrite::Upsert(90));
        assert!(store.write_respawns(1, 0, &writes).is_empty());

        let stored: Vec<(SpawnKey, u64)> = store
            .load_respawns(1, 0)
            .unwrap()
            .iter()
            .map(|entry| (entry.key(), entry.time))
            .collect();
        assert_eq!(
            stored,
            vec![(SpawnKey::creature(4), 70), (SpawnKey::game_object(4), 90)]
        );
        assert!(!root.join("respawn").join("001_00000.yaml.tmp").exists());
    }

    #[test]
    fn failed_batch_reports_every_identity() {
        let root = temp_root("batch-fail");
        fs::write(root.join("respawn"), "not a directory").unwrap();
        let store = FileSpawnStore::open(&root).unwrap();
        let mut writes = RespawnWrites::new();
        writes.insert(SpawnKey::creature(1), RespawnWrite::Upsert(10));
        writes.insert(SpawnKey::creature(2), RespawnWrite::Delete);
        let failed = store.write_respawns(0, 0, &writes);
        let keys: Vec<SpawnKey> = failed.iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, vec![SpawnKey::creature(1), SpawnKey::creature(2)]);
    }

    #[test]
    fn file_store_without_spawn_db_is_empty() {
        let root = temp_root("empty");
        let store = FileSpawnStore::open(&root).unwrap();
        assert!(store.catalog().is_empty());
        assert!(store.load_respawns(0, 0).unwrap().is_empty());
    }
}

use crate::world::cell::{CellCoord, GridCoord, MAX_NUMBER_OF_CELLS};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CELLS_PER_GRID: usize = (MAX_NUMBER_OF_CELLS * MAX_NUMBER_OF_CELLS) as usize;

/// Auxiliary per-grid data loaded when a grid is created.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainData {
    pub base_height: f32,
    pub liquid_level: Option<f32>,
    cell_heights: Vec<Option<f32>>,
}

impl TerrainData {
    pub fn flat() -> Self {
        Self {
            base_height: 0.0,
            liquid_level: None,
            cell_heights: vec![None; CELLS_PER_GRID],
        }
    }

    pub fn height_at(&self, cell: CellCoord) -> f32 {
        let (local_x, local_y) = cell.local();
        let index = (local_y * MAX_NUMBER_OF_CELLS + local_x) as usize;
        self.cell_heights
            .get(index)
            .copied()
            .flatten()
            .unwrap_or(self.base_height)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TerrainStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub evictions: u64,
}

/// Terrain keyed by grid, kept around after a grid unloads so a reload is cheap.
pub struct TerrainCache {
    cache: LruCache<GridCoord, Arc<TerrainData>>,
    map_id: u32,
    backing_path: Option<PathBuf>,
    stats: TerrainStats,
}

impl TerrainCache {
    pub fn new(map_id: u32, capacity: usize, backing_path: Option<PathBuf>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            map_id,
            backing_path,
            stats: TerrainStats::default(),
        }
    }

    pub fn get(&mut self, coord: GridCoord) -> Result<Arc<TerrainData>, String> {
        if let Some(data) = self.cache.get(&coord) {
            self.stats.hits += 1;
            return Ok(Arc::clone(data));
        }
        self.stats.misses += 1;
        let data = Arc::new(self.load(coord)?);
        if let Some((evicted, _)) = self.cache.push(coord, Arc::clone(&data)) {
            if evicted != coord {
                self.stats.evictions += 1;
            }
        }
        self.stats.loads += 1;
        Ok(data)
    }

    pub fn stats(&self) -> &TerrainStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn load(&self, coord: GridCoord) -> Result<TerrainData, String> {
        let Some(root) = self.backing_path.as_ref() else {
            return Ok(TerrainData::flat());
        };
        let path = terrain_path(root, self.map_id, coord);
        if !path.exists() {
            return Ok(TerrainData::flat());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|err| format!("failed to read terrain {}: {}", path.display(), err))?;
        parse_terrain(&content).map_err(|err| format!("terrain {}: {}", path.display(), err))
    }
}

pub fn terrain_path(root: &Path, map_id: u32, coord: GridCoord) -> PathBuf {
    root.join(format!("{:03}_{:02}_{:02}.ter", map_id, coord.x, coord.y))
}

fn parse_terrain(content: &str) -> Result<TerrainData, String> {
    let mut terrain = TerrainData::flat();
    for (line_no, raw_line) in content.lines().enumerate() {
        let line_no = line_no + 1;
        let line = match raw_line.split_once('#') {
            Some((before, _)) => before.trim(),
            None => raw_line.trim(),
        };
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("line {} missing '='", line_no))?;
        let value = value
            .trim()
            .parse::<f32>()
            .map_err(|_| format!("line {} invalid number", line_no))?;
        let mut key_parts = key.split_whitespace();
        match key_parts.next() {
            Some("BaseHeight") => terrain.base_height = value,
            Some("Liquid") => terrain.liquid_level = Some(value),
            Some("Cell") => {
                let x = parse_local(key_parts.next(), "x", line_no)?;
                let y = parse_local(key_parts.next(), "y", line_no)?;
                terrain.cell_heights[(y * MAX_NUMBER_OF_CELLS + x) as usize] = Some(value);
            }
            _ => {}
        }
    }
    Ok(terrain)
}

fn parse_local(value: Option<&str>, label: &str, line_no: usize) -> Result<u32, String> {
    let value = value.ok_or_else(|| format!("line {} missing cell {}", line_no, label))?;
    let parsed = value
        .parse::<u32>()
        .map_err(|_| format!("line {} invalid cell {}", line_no, label))?;
    if parsed >= MAX_NUMBER_OF_CELLS {
        return Err(format!("line {} cell {} out of range", line_no, label));
    }
    Ok(parsed)
}

use crate::world::spawn_group::SpawnGroupTemplate;
use crate::world::weather::Zone;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_TICKS: u64 = 600;
const DEFAULT_TICK_MS: u64 = 100;

#[derive(Debug)]
pub struct AppConfig {
    pub root: PathBuf,
    pub map_id: u32,
    pub ticks: u64,
    pub tick_ms: u64,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        Self::from_args_with(args, |name| std::env::var(name).ok())
    }

    fn from_args_with(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        if args.len() < 2 {
            return Err("usage: worldgrid <data-root> [map-id] [ticks]".to_string());
        }
        let root = Path::new(&args[1]).to_path_buf();
        let map_id = match args.get(2) {
            Some(value) => parse_arg(value, "map-id")?,
            None => env_value(&env, "WORLDGRID_MAP_ID").unwrap_or(0),
        };
        let ticks = match args.get(3) {
            Some(value) => parse_arg(value, "ticks")?,
            None => env_value(&env, "WORLDGRID_TICKS").unwrap_or(DEFAULT_TICKS),
        };
        let tick_ms = env_value(&env, "WORLDGRID_TICK_MS")
            .unwrap_or(DEFAULT_TICK_MS)
            .max(1);
        Ok(Self {
            root,
            map_id,
            ticks,
            tick_ms,
        })
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

fn parse_arg<T: std::str::FromStr>(value: &str, label: &str) -> Result<T, String> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| format!("invalid {} '{}'", label, value))
}

fn env_value<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let value = env(name)?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            eprintln!("worldgrid: invalid {} '{}', ignored", name, value);
            None
        }
    }
}

/// Per-map tuning read from `<data-root>/world.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// When false every grid is pinned and never unloads.
    pub grid_unload: bool,
    pub unload_delay_ms: u64,
    pub respawn_check_interval_ms: u64,
    pub activation_radius_cells: u32,
    pub dynamic_escort_respawn: bool,
    pub weather_interval_ms: u64,
    /// Zero flushes respawn writes at the end of every tick.
    pub respawn_flush_interval_ms: u64,
    pub tree_rebalance_interval_ms: u64,
    pub lag_threshold_ms: u64,
    pub max_drain_passes: u32,
    pub weather_zones: Vec<Zone>,
    pub spawn_groups: Vec<SpawnGroupTemplate>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            grid_unload: true,
            unload_delay_ms: 60_000,
            respawn_check_interval_ms: 5_000,
            activation_radius_cells: 1,
            dynamic_escort_respawn: false,
            weather_interval_ms: 60_000,
            respawn_flush_interval_ms: 0,
            tree_rebalance_interval_ms: 1_000,
            lag_threshold_ms: 100,
            max_drain_passes: 8,
            weather_zones: Vec::new(),
            spawn_groups: Vec::new(),
        }
    }
}

impl MapConfig {
    /// A missing file yields the defaults; environment overrides apply either way.
    pub fn load(root: &Path) -> Result<Self, String> {
        let path = root.join("world.yaml");
        let mut config = match std::fs::read_to_string(&path) {
            Ok(data) => Self::parse(&data)
                .map_err(|err| format!("world config {}: {}", path.display(), err))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                return Err(format!("world config read failed for {}: {}", path.display(), err));
            }
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn parse(data: &str) -> Result<Self, String> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(data).map_err(|err| err.to_string())
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(value) = env_value(&env, "WORLDGRID_UNLOAD_DELAY_MS") {
            self.unload_delay_ms = value;
        }
        if let Some(value) = env_value(&env, "WORLDGRID_RESPAWN_CHECK_MS") {
            self.respawn_check_interval_ms = value;
        }
        if let Some(value) = env_value::<u8>(&env, "WORLDGRID_GRID_UNLOAD") {
            self.grid_unload = value != 0;
        }
    }

    pub fn unload_delay(&self) -> Duration {
        Duration::from_millis(self.unload_delay_ms)
    }

    pub fn respawn_check_interval(&self) -> Duration {
        Duration::from_millis(self.respawn_check_interval_ms)
    }

    pub fn weather_interval(&self) -> Duration {
        Duration::from_millis(self.weather_interval_ms)
    }

    pub fn tree_rebalance_interval(&self) -> Duration {
        Duration::from_millis(self.tree_rebalance_interval_ms)
    }

    pub fn lag_threshold(&self) -> Duration {
        Duration::from_millis(self.lag_threshold_ms)
    }
}

use crate::world::position::Position;
use crate::world::rng::WorldRng;
use crate::world::time::IntervalTimer;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherState {
    Fine,
    Fog,
    Rain,
    Snow,
    Storm,
}

/// A rectangular weather region in world coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: u32,
    pub name: String,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// States the zone cycles through. Empty means fine weather only.
    #[serde(default)]
    pub states: Vec<WeatherState>,
}

impl Zone {
    pub fn new(id: u32, name: impl Into<String>, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let (x1, x2) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let (y1, y2) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        Zone {
            id,
            name: name.into(),
            x1,
            y1,
            x2,
            y2,
            states: Vec::new(),
        }
    }

    pub fn with_states(mut self, states: &[WeatherState]) -> Self {
        self.states = states.to_vec();
        self
    }

    pub fn contains(&self, position: Position) -> bool {
        position.x >= self.x1.min(self.x2)
            && position.x <= self.x1.max(self.x2)
            && position.y >= self.y1.min(self.y2)
            && position.y <= self.y1.max(self.y2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherChange {
    pub zone_id: u32,
    pub state: WeatherState,
    pub grade: f32,
}

#[derive(Debug, Clone)]
struct ZoneWeather {
    zone: Zone,
    state: WeatherState,
    grade: f32,
}

#[derive(Debug)]
pub struct WeatherSystem {
    zones: Vec<ZoneWeather>,
    timer: IntervalTimer,
    rng: WorldRng,
}

impl WeatherSystem {
    pub fn new(zones: Vec<Zone>, interval: Duration, rng: WorldRng) -> Self {
        Self {
            zones: zones
                .into_iter()
                .map(|zone| ZoneWeather {
                    zone,
                    state: WeatherState::Fine,
                    grade: 0.0,
                })
                .collect(),
            timer: IntervalTimer::new(interval),
            rng,
        }
    }

    /// Rolls new weather for every zone once the interval elapses; returns what changed.
    pub fn update(&mut self, elapsed: Duration) -> Vec<WeatherChange> {
        if self.zones.is_empty() || self.timer.interval().is_zero() {
            return Vec::new();
        }
        self.timer.update(elapsed);
        if !self.timer.consume() {
            return Vec::new();
        }
        let mut changes = Vec::new();
        for zone in &mut self.zones {
            let state = if zone.zone.states.is_empty() {
                WeatherState::Fine
            } else {
                let pick = self.rng.roll_range(0, zone.zone.states.len() as u32 - 1);
                zone.zone.states[pick as usize]
            };
            let grade = if state == WeatherState::Fine {
                0.0
            } else {
                self.rng.roll_unit()
            };
            if state != zone.state || (grade - zone.grade).abs() > f32::EPSILON {
                zone.state = state;
                zone.grade = grade;
                changes.push(WeatherChange {
                    zone_id: zone.zone.id,
                    state,
                    grade,
                });
            }
        }
        changes
    }

    pub fn weather_at(&self, position: Position) -> WeatherState {
        self.zones
            .iter()
            .find(|zone| zone.zone.contains(position))
            .map_or(WeatherState::Fine, |zone| zone.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(interval_ms: u64) -> WeatherSystem {
        let zones = vec![
            Zone::new(1, "coast", 100.0, 100.0, -100.0, -100.0)
                .with_states(&[WeatherState::Rain, WeatherState::Storm]),
            Zone::new(2, "desert", 200.0, 200.0, 300.0, 300.0),
        ];
        WeatherSystem::new(zones, Duration::from_millis(interval_ms), WorldRng::from_seed(3))
    }

    #[test]
    fn zone_normalizes_corners() {
        let zone = Zone::new(1, "z", 10.0, 10.0, -10.0, -10.0);
        assert_eq!((zone.x1, zone.x2), (-10.0, 10.0));
        assert!(zone.contains(Position::new(0.0, 0.0, 50.0)));
        assert!(!zone.contains(Position::new(11.0, 0.0, 0.0)));
    }

    #[test]
    fn changes_only_after_interval() {
        let mut weather = system(1_000);
        assert!(weather.update(Duration::from_millis(500)).is_empty());
        let changes = weather.update(Duration::from_millis(500));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].zone_id, 1);
        assert_ne!(weather.weather_at(Position::default()), WeatherState::Fine);
        assert_eq!(weather.weather_at(Position::new(250.0, 250.0, 0.0)), WeatherState::Fine);
    }

    #[test]
    fn zero_interval_disables_weather() {
        let mut weather = system(0);
        assert!(weather.update(Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn zones_deserialize_from_yaml() {
        let zones: Vec<Zone> = serde_yaml::from_str(
            "- id: 4\n  name: peaks\n  x1: 0\n  y1: 0\n  x2: 10\n  y2: 10\n  states: [snow, fog]\n",
        )
        .unwrap();
        assert_eq!(zones[0].states, vec![WeatherState::Snow, WeatherState::Fog]);
    }
}

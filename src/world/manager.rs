use crate::telemetry::logging;
use crate::world::map::{Map, Transfer};
use std::collections::BTreeMap;
use std::time::Duration;

/// Owns every map and ticks them in parallel. Maps share nothing mutable; objects cross
/// between them only through transfers routed here after each tick.
#[derive(Default)]
pub struct MapManager {
    maps: BTreeMap<u32, Map>,
    dropped_transfers: u64,
}

impl MapManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_map(&mut self, map: Map) -> Result<(), String> {
        let id = map.id();
        if self.maps.contains_key(&id) {
            return Err(format!("map {} already registered", id));
        }
        self.maps.insert(id, map);
        Ok(())
    }

    pub fn map(&self, id: u32) -> Option<&Map> {
        self.maps.get(&id)
    }

    pub fn map_mut(&mut self, id: u32) -> Option<&mut Map> {
        self.maps.get_mut(&id)
    }

    pub fn maps(&self) -> impl Iterator<Item = &Map> {
        self.maps.values()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn dropped_transfers(&self) -> u64 {
        self.dropped_transfers
    }

    /// One tick of every map, then transfer routing. A panicking map update is re-raised
    /// once all other maps finished their tick.
    pub fn update(&mut self, diff: Duration) {
        if self.maps.len() == 1 {
            if let Some(map) = self.maps.values_mut().next() {
                map.update(diff);
            }
        } else if !self.maps.is_empty() {
            std::thread::scope(|scope| {
                let handles: Vec<_> = self
                    .maps
                    .values_mut()
                    .map(|map| {
                        let id = map.id();
                        (id, scope.spawn(move || map.update(diff)))
                    })
                    .collect();
                for (id, handle) in handles {
                    if let Err(payload) = handle.join() {
                        eprintln!("worldgrid: map {} update thread panicked", id);
                        std::panic::resume_unwind(payload);
                    }
                }
            });
        }
        self.route_transfers();
    }

    fn route_transfers(&mut self) {
        let transfers: Vec<Transfer> = self
            .maps
            .values_mut()
            .flat_map(|map| map.take_outgoing())
            .collect();
        for transfer in transfers {
            match self.maps.get_mut(&transfer.destination_map) {
                Some(map) => map.queue_incoming(transfer),
                None => {
                    self.dropped_transfers += 1;
                    let msg = format!(
                        "transfer of {:?} to unknown map {} dropped",
                        transfer.object.guid, transfer.destination_map
                    );
                    eprintln!("worldgrid: {}", msg);
                    logging::log_error(transfer.source_map, &msg);
                }
            }
        }
    }

    pub fn unload_all(&mut self) {
        for map in self.maps.values_mut() {
            map.unload_all();
        }
    }
}

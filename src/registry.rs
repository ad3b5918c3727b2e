//! Named heightmap ownership registry.
//!
//! The registry is the sole owner of every GPU raster it holds; all other
//! access is a borrow. Target entities reference entries through
//! [`MapSlots`], and a given id is referenced by at most one slot at a
//! time - slot reassignment never transfers ownership.

use rustc_hash::FxHashMap;

use crate::heightmap::HeightMap;

/// Opaque registry key for a cached heightmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapId(u64);

/// Per-target slot record: the three elevation states of a simulation.
///
/// `base` is the untouched projection, `source` the current simulation
/// input, `result` the latest solver output.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapSlots {
    /// Untouched projected heightmap.
    pub base: Option<MapId>,
    /// Current simulation input.
    pub source: Option<MapId>,
    /// Latest simulation output.
    pub result: Option<MapId>,
}

/// Owns named [`HeightMap`] records keyed by [`MapId`].
#[derive(Default)]
pub struct MapRegistry {
    maps: FxHashMap<MapId, HeightMap>,
    next_id: u64,
}

impl MapRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a map, taking ownership, and return its id.
    pub fn create_map(&mut self, map: HeightMap) -> MapId {
        let id = MapId(self.next_id);
        self.next_id += 1;
        let _ = self.maps.insert(id, map);
        id
    }

    /// Whether the id refers to a live entry. `None` (the empty id) is
    /// never present.
    #[must_use]
    pub fn has_map(&self, id: Option<MapId>) -> bool {
        id.is_some_and(|id| self.maps.contains_key(&id))
    }

    /// Borrow a map by id. Returns `None` for stale or empty ids.
    #[must_use]
    pub fn get_map(&self, id: MapId) -> Option<&HeightMap> {
        self.maps.get(&id)
    }

    /// Release the map behind `id` and deregister it. Idempotent: empty
    /// and stale ids are a no-op.
    pub fn try_release_map(&mut self, id: Option<MapId>) {
        if let Some(map) = id.and_then(|id| self.maps.remove(&id)) {
            map.destroy();
        }
    }

    /// Release every entry (teardown).
    pub fn free_all(&mut self) {
        for (_, map) in self.maps.drain() {
            map.destroy();
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// Whether the registry holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

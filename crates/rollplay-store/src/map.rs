//! Tile-map contract and an in-memory grid implementation.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use rollplay_protocol::MapId;

use crate::StoreError;

/// Answers whether a tile blocks movement.
pub trait ObstacleMap: Send + Sync {
    /// Returns `true` if a character may not stand on `(row, col)`.
    fn is_obstacle_tile(&self, row: i32, col: i32) -> bool;
}

impl<T: ObstacleMap + ?Sized> ObstacleMap for Arc<T> {
    fn is_obstacle_tile(&self, row: i32, col: i32) -> bool {
        (**self).is_obstacle_tile(row, col)
    }
}

/// Loads tile maps by id.
pub trait MapService: Send + Sync + 'static {
    /// The loaded map type.
    type Map: ObstacleMap + 'static;

    /// Loads a map. Returns `Ok(None)` if no such map exists.
    fn load_map(
        &self,
        id: MapId,
    ) -> impl Future<Output = Result<Option<Self::Map>, StoreError>> + Send;
}

/// A rectangular grid with a set of blocked tiles.
///
/// Tiles outside the grid count as obstacles, so nothing can walk off
/// the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridMap {
    rows: i32,
    cols: i32,
    obstacles: HashSet<(i32, i32)>,
}

impl GridMap {
    /// Creates a grid with no obstacles.
    pub fn open(rows: i32, cols: i32) -> Self {
        Self {
            rows,
            cols,
            obstacles: HashSet::new(),
        }
    }

    /// Parses an ASCII grid: `#` is an obstacle, any other char is floor.
    /// The width is the longest line.
    ///
    /// ```rust
    /// use rollplay_store::{GridMap, ObstacleMap};
    ///
    /// let map = GridMap::parse(&["..#", "..."]);
    /// assert!(map.is_obstacle_tile(0, 2));
    /// assert!(!map.is_obstacle_tile(1, 2));
    /// ```
    pub fn parse(lines: &[&str]) -> Self {
        let mut obstacles = HashSet::new();
        let mut cols = 0;
        for (row, line) in lines.iter().enumerate() {
            let mut width = 0;
            for (col, tile) in line.chars().enumerate() {
                if tile == '#' {
                    obstacles.insert((row as i32, col as i32));
                }
                width = col as i32 + 1;
            }
            cols = cols.max(width);
        }
        Self {
            rows: lines.len() as i32,
            cols,
            obstacles,
        }
    }

    /// Marks one tile as blocked.
    pub fn with_obstacle(mut self, row: i32, col: i32) -> Self {
        self.obstacles.insert((row, col));
        self
    }

    /// Returns `(rows, cols)`.
    pub fn size(&self) -> (i32, i32) {
        (self.rows, self.cols)
    }
}

impl ObstacleMap for GridMap {
    fn is_obstacle_tile(&self, row: i32, col: i32) -> bool {
        let outside = row < 0 || col < 0 || row >= self.rows || col >= self.cols;
        outside || self.obstacles.contains(&(row, col))
    }
}

/// A [`MapService`] backed by a fixed set of grids.
#[derive(Debug, Clone, Default)]
pub struct MemoryMaps {
    maps: HashMap<MapId, Arc<GridMap>>,
}

impl MemoryMaps {
    /// Creates an empty map service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a grid under `id`, replacing any previous one.
    pub fn with_map(mut self, id: MapId, map: GridMap) -> Self {
        self.maps.insert(id, Arc::new(map));
        self
    }
}

impl MapService for MemoryMaps {
    type Map = Arc<GridMap>;

    async fn load_map(&self, id: MapId) -> Result<Option<Arc<GridMap>>, StoreError> {
        Ok(self.maps.get(&id).cloned())
    }
}

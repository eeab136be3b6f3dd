use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::camera::Camera;
use crate::config::SelectorConfig;
use crate::geom::ConvexPolygon;
use crate::position::Position;

/// Probe placement is tuned so the cursor lines up with sprite feet rather
/// than the region anchor.
const PROBE_X_DIVISOR: f64 = 4.25;
const TILE_PROBE_Y_FACTOR: f64 = 1.5;

static SELECTOR_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_selector_lock_poison_once(set: &'static str) {
    if SELECTOR_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(set, "selector lock poisoned; recovered inner value");
    }
}

fn read_set<'a, T>(lock: &'a RwLock<T>, set: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn_selector_lock_poison_once(set);
        poisoned.into_inner()
    })
}

fn write_set<'a, T>(lock: &'a RwLock<T>, set: &'static str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn_selector_lock_poison_once(set);
        poisoned.into_inner()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectedKind {
    LocalStaticObject,
    MovableObject,
    TileObject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedObjectDetails {
    pub name: Arc<str>,
    pub position: Position,
    pub kind: SelectedKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Cursor,
    Simulated,
}

/// Screen-space pointer sources. The simulated pointer is driven by a
/// gamepad or tests; `mode` picks which one `scan` reads.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointerState {
    pub mode: InputMode,
    pub cursor_px: Option<Position>,
    pub simulated_px: Position,
}

impl PointerState {
    pub fn cursor(x: f64, y: f64) -> Self {
        Self {
            mode: InputMode::Cursor,
            cursor_px: Some(Position::new(x, y)),
            simulated_px: Position::default(),
        }
    }

    pub fn simulated(x: f64, y: f64) -> Self {
        Self {
            mode: InputMode::Simulated,
            cursor_px: None,
            simulated_px: Position::new(x, y),
        }
    }

    pub fn active_screen_position(&self) -> Option<Position> {
        match self.mode {
            InputMode::Cursor => self.cursor_px,
            InputMode::Simulated => Some(self.simulated_px),
        }
    }
}

type RegionMap = IndexMap<Arc<str>, ConvexPolygon>;

/// Hit regions for pointer picking. Each set has its own lock; `scan` only
/// takes read locks.
#[derive(Debug)]
pub struct Selector {
    config: SelectorConfig,
    main_trackable: RwLock<Option<ConvexPolygon>>,
    local_statics: RwLock<RegionMap>,
    external_movables: RwLock<RegionMap>,
    tiles: RwLock<RegionMap>,
}

impl Default for Selector {
    fn default() -> Self {
        Self::new(SelectorConfig::default())
    }
}

impl Selector {
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            config,
            main_trackable: RwLock::new(None),
            local_statics: RwLock::new(IndexMap::new()),
            external_movables: RwLock::new(IndexMap::new()),
            tiles: RwLock::new(IndexMap::new()),
        }
    }

    pub fn set_main_trackable_object(&self, position: Position, shift_width: f64, shift_height: f64) {
        *write_set(&self.main_trackable, "main_trackable") = Some(ConvexPolygon::rectangle(
            position.x,
            position.y,
            shift_width / 2.0,
            shift_height / 2.0,
        ));
    }

    pub fn main_trackable_object_exists(&self) -> bool {
        read_set(&self.main_trackable, "main_trackable").is_some()
    }

    pub fn add_external_movable_object(
        &self,
        name: &str,
        position: Position,
        shift_width: f64,
        shift_height: f64,
    ) {
        write_set(&self.external_movables, "external_movables").insert(
            Arc::from(name),
            ConvexPolygon::rectangle(position.x, position.y, shift_width / 2.0, shift_height / 2.0),
        );
    }

    pub fn external_movable_object_exists(&self, name: &str) -> bool {
        read_set(&self.external_movables, "external_movables").contains_key(name)
    }

    pub fn get_external_movable_object(&self, name: &str) -> Option<ConvexPolygon> {
        read_set(&self.external_movables, "external_movables")
            .get(name)
            .cloned()
    }

    pub fn prune_external_movable_objects(&self, live: &HashSet<String>) -> usize {
        let mut movables = write_set(&self.external_movables, "external_movables");
        let before = movables.len();
        movables.retain(|name, _| live.contains(name.as_ref()));
        let removed = before - movables.len();
        if removed > 0 {
            debug!(removed, "selector_movables_pruned");
        }
        removed
    }

    pub fn add_tile_object(&self, name: &str, position: Position, tile_width: u32, tile_height: u32) {
        write_set(&self.tiles, "tiles").insert(
            Arc::from(name),
            ConvexPolygon::tile_diamond(position, tile_width, tile_height),
        );
    }

    pub fn tile_object_exists(&self, name: &str) -> bool {
        read_set(&self.tiles, "tiles").contains_key(name)
    }

    pub fn add_local_static_object(
        &self,
        name: &str,
        position: Position,
        tile_width: u32,
        tile_height: u32,
    ) {
        write_set(&self.local_statics, "local_statics").insert(
            Arc::from(name),
            ConvexPolygon::tile_diamond(position, tile_width, tile_height),
        );
    }

    pub fn local_static_object_exists(&self, name: &str) -> bool {
        read_set(&self.local_statics, "local_statics").contains_key(name)
    }

    pub fn remove_local_static_object(&self, name: &str) -> bool {
        write_set(&self.local_statics, "local_statics")
            .shift_remove(name)
            .is_some()
    }

    /// Resolves the pointer to the topmost region under it. Local statics
    /// near the main trackable win over movables, which win over tiles.
    pub fn scan(&self, camera: &Camera, pointer: &PointerState) -> Option<SelectedObjectDetails> {
        let screen = pointer.active_screen_position()?;
        let cursor = camera.pointer_to_world(screen.x, screen.y)?;

        if let Some(main) = read_set(&self.main_trackable, "main_trackable").as_ref() {
            let statics = read_set(&self.local_statics, "local_statics");
            for (name, region) in statics.iter() {
                let probe = self.probe_for(cursor, region, 1.0);
                if !probe.is_intersecting(region) {
                    continue;
                }
                if region.distance_to(main) > self.config.local_static_pick_distance {
                    continue;
                }
                return Some(details(name, region, SelectedKind::LocalStaticObject));
            }
        }

        let movables = read_set(&self.external_movables, "external_movables");
        for (name, region) in movables.iter() {
            if self.probe_for(cursor, region, 1.0).is_intersecting(region) {
                return Some(details(name, region, SelectedKind::MovableObject));
            }
        }
        drop(movables);

        let tiles = read_set(&self.tiles, "tiles");
        for (name, region) in tiles.iter() {
            if self
                .probe_for(cursor, region, TILE_PROBE_Y_FACTOR)
                .is_intersecting(region)
            {
                return Some(details(name, region, SelectedKind::TileObject));
            }
        }
        None
    }

    pub fn clean(&self) {
        *write_set(&self.main_trackable, "main_trackable") = None;
        write_set(&self.external_movables, "external_movables").clear();
        write_set(&self.tiles, "tiles").clear();
        write_set(&self.local_statics, "local_statics").clear();
    }

    fn probe_for(&self, cursor: Position, region: &ConvexPolygon, y_factor: f64) -> ConvexPolygon {
        let bounds = region.bounds();
        ConvexPolygon::rectangle(
            cursor.x - bounds.width() / PROBE_X_DIVISOR,
            cursor.y + bounds.height() * y_factor,
            self.config.probe_size,
            self.config.probe_size,
        )
    }
}

fn details(name: &Arc<str>, region: &ConvexPolygon, kind: SelectedKind) -> SelectedObjectDetails {
    SelectedObjectDetails {
        name: Arc::clone(name),
        position: region.position(),
        kind,
    }
}

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::unit::AnimatedUnit;

use super::objects::{RenderObject, StaticObject, TileObject};

static REGISTRY_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_registry_lock_poison_once(tier: &'static str) {
    if REGISTRY_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(tier, "render registry lock poisoned; recovered inner value");
    }
}

pub(crate) fn read_tier<'a, T>(lock: &'a RwLock<T>, tier: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn_registry_lock_poison_once(tier);
        poisoned.into_inner()
    })
}

fn write_tier<'a, T>(lock: &'a RwLock<T>, tier: &'static str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn_registry_lock_poison_once(tier);
        poisoned.into_inner()
    })
}

pub(crate) type TierMap<T> = IndexMap<Arc<str>, T>;

/// Named objects in three tiers, each behind its own lock. Loader and network
/// threads register and prune here; the render thread only reads.
///
/// Maps keep registration order, which is the tie-break for objects at the
/// same depth. Re-adding a name replaces the object in place.
#[derive(Debug, Default)]
pub struct RenderRegistry {
    tertiary: RwLock<TierMap<TileObject>>,
    secondary: RwLock<TierMap<RenderObject>>,
    main_centered: RwLock<TierMap<Arc<AnimatedUnit>>>,
    highlighted: RwLock<Option<Arc<str>>>,
}

impl RenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tertiary_tile_object(&self, name: &str, tile: TileObject) {
        write_tier(&self.tertiary, "tertiary").insert(Arc::from(name), tile);
    }

    pub fn tertiary_tile_object_exists(&self, name: &str) -> bool {
        read_tier(&self.tertiary, "tertiary").contains_key(name)
    }

    pub fn add_secondary_tile_object(&self, name: &str, tile: TileObject) {
        self.insert_secondary(name, RenderObject::Tile(tile));
    }

    pub fn secondary_tile_object_exists(&self, name: &str) -> bool {
        matches!(
            read_tier(&self.secondary, "secondary").get(name),
            Some(RenderObject::Tile(_))
        )
    }

    pub fn add_secondary_static_object(&self, name: &str, object: StaticObject) {
        self.insert_secondary(name, RenderObject::Static(object));
    }

    pub fn secondary_static_object_exists(&self, name: &str) -> bool {
        matches!(
            read_tier(&self.secondary, "secondary").get(name),
            Some(RenderObject::Static(_))
        )
    }

    pub fn add_secondary_external_movable_object(&self, name: &str, unit: Arc<AnimatedUnit>) {
        self.insert_secondary(name, RenderObject::Movable(unit));
    }

    pub fn secondary_external_movable_object_exists(&self, name: &str) -> bool {
        matches!(
            read_tier(&self.secondary, "secondary").get(name),
            Some(RenderObject::Movable(_))
        )
    }

    pub fn get_secondary_external_movable_object(&self, name: &str) -> Option<Arc<AnimatedUnit>> {
        match read_tier(&self.secondary, "secondary").get(name) {
            Some(RenderObject::Movable(unit)) => Some(Arc::clone(unit)),
            _ => None,
        }
    }

    /// Drops every external movable whose name is not in `live`. Tiles and
    /// statics are untouched. Returns how many were removed.
    pub fn prune_secondary_external_movable_objects(&self, live: &HashSet<String>) -> usize {
        let mut secondary = write_tier(&self.secondary, "secondary");
        let before = secondary.len();
        secondary.retain(|name, object| {
            !matches!(object, RenderObject::Movable(_)) || live.contains(name.as_ref())
        });
        let removed = before - secondary.len();
        if removed > 0 {
            debug!(removed, remaining = secondary.len(), "secondary_movables_pruned");
        }
        removed
    }

    pub fn add_main_centered_movable_object(&self, name: &str, unit: Arc<AnimatedUnit>) {
        write_tier(&self.main_centered, "main_centered").insert(Arc::from(name), unit);
    }

    pub fn main_centered_movable_object_exists(&self, name: &str) -> bool {
        read_tier(&self.main_centered, "main_centered").contains_key(name)
    }

    pub fn get_main_centered_movable_object(&self, name: &str) -> Option<Arc<AnimatedUnit>> {
        read_tier(&self.main_centered, "main_centered")
            .get(name)
            .map(Arc::clone)
    }

    /// First registered centered unit, which anchors the culling rectangle.
    pub fn first_main_centered_movable_object(&self) -> Option<Arc<AnimatedUnit>> {
        read_tier(&self.main_centered, "main_centered")
            .values()
            .next()
            .map(Arc::clone)
    }

    pub fn remove_main_centered_movable_object(&self, name: &str) -> bool {
        write_tier(&self.main_centered, "main_centered")
            .shift_remove(name)
            .is_some()
    }

    /// Marks one secondary static for the highlight pulse. `None` clears it.
    pub fn set_highlighted(&self, name: Option<&str>) {
        *write_tier(&self.highlighted, "highlighted") = name.map(Arc::from);
    }

    pub fn highlighted(&self) -> Option<Arc<str>> {
        read_tier(&self.highlighted, "highlighted").clone()
    }

    pub fn tertiary_len(&self) -> usize {
        read_tier(&self.tertiary, "tertiary").len()
    }

    pub fn secondary_len(&self) -> usize {
        read_tier(&self.secondary, "secondary").len()
    }

    pub fn main_centered_len(&self) -> usize {
        read_tier(&self.main_centered, "main_centered").len()
    }

    /// Empties every tier. Units held elsewhere stay alive, but nothing here
    /// references them afterwards.
    pub fn clean(&self) {
        write_tier(&self.tertiary, "tertiary").clear();
        write_tier(&self.secondary, "secondary").clear();
        write_tier(&self.main_centered, "main_centered").clear();
        *write_tier(&self.highlighted, "highlighted") = None;
    }

    fn insert_secondary(&self, name: &str, object: RenderObject) {
        write_tier(&self.secondary, "secondary").insert(Arc::from(name), object);
    }

    pub(crate) fn tertiary_tier(&self) -> RwLockReadGuard<'_, TierMap<TileObject>> {
        read_tier(&self.tertiary, "tertiary")
    }

    pub(crate) fn secondary_tier(&self) -> RwLockReadGuard<'_, TierMap<RenderObject>> {
        read_tier(&self.secondary, "secondary")
    }

    pub(crate) fn main_centered_tier(&self) -> RwLockReadGuard<'_, TierMap<Arc<AnimatedUnit>>> {
        read_tier(&self.main_centered, "main_centered")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::canvas::Image;
    use crate::position::Position;
    use crate::unit::tests::test_sprite_set;
    use crate::unit::UnitConfig;

    fn tile(x: f64, y: f64) -> TileObject {
        TileObject::new(Position::new(x, y), Arc::new(Image::filled(2, 2, [1, 1, 1, 255])))
    }

    fn unit() -> Arc<AnimatedUnit> {
        Arc::new(
            AnimatedUnit::new_at(test_sprite_set(2), "right", UnitConfig::default(), Instant::now())
                .expect("unit"),
        )
    }

    #[test]
    fn prune_removes_exactly_absent_movables() {
        let registry = RenderRegistry::new();
        registry.add_secondary_external_movable_object("p1", unit());
        registry.add_secondary_external_movable_object("p2", unit());
        registry.add_secondary_tile_object("wall", tile(0.0, 0.0));

        let live: HashSet<String> = ["p1".to_string()].into_iter().collect();
        assert_eq!(registry.prune_secondary_external_movable_objects(&live), 1);
        assert!(registry.secondary_external_movable_object_exists("p1"));
        assert!(!registry.secondary_external_movable_object_exists("p2"));
        assert!(registry.secondary_tile_object_exists("wall"));
    }

    #[test]
    fn exists_checks_are_kind_specific() {
        let registry = RenderRegistry::new();
        registry.add_secondary_tile_object("a", tile(0.0, 0.0));
        registry.add_secondary_static_object(
            "b",
            StaticObject::new(Position::new(1.0, 1.0), Arc::new(Image::filled(1, 1, [0; 4]))),
        );
        registry.add_tertiary_tile_object("floor", tile(0.0, 0.0));

        assert!(registry.secondary_tile_object_exists("a"));
        assert!(!registry.secondary_static_object_exists("a"));
        assert!(registry.secondary_static_object_exists("b"));
        assert!(!registry.secondary_external_movable_object_exists("b"));
        assert!(registry.tertiary_tile_object_exists("floor"));
        assert!(!registry.secondary_tile_object_exists("floor"));
    }

    #[test]
    fn re_adding_keeps_registration_slot() {
        let registry = RenderRegistry::new();
        registry.add_secondary_tile_object("a", tile(0.0, 0.0));
        registry.add_secondary_tile_object("b", tile(0.0, 0.0));
        registry.add_secondary_tile_object("a", tile(5.0, 5.0));

        let secondary = registry.secondary_tier();
        let names: Vec<&str> = secondary.keys().map(|name| name.as_ref()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(secondary["a"].position(), Position::new(5.0, 5.0));
    }

    #[test]
    fn main_centered_units_are_shared_not_copied() {
        let registry = RenderRegistry::new();
        let player = unit();
        registry.add_main_centered_movable_object("me", Arc::clone(&player));
        player.set_position(Position::new(7.0, 8.0));

        let first = registry.first_main_centered_movable_object().expect("main");
        assert_eq!(first.position(), Position::new(7.0, 8.0));
        assert!(registry.remove_main_centered_movable_object("me"));
        assert!(!registry.main_centered_movable_object_exists("me"));
    }

    #[test]
    fn clean_empties_all_tiers() {
        let registry = RenderRegistry::new();
        registry.add_tertiary_tile_object("t", tile(0.0, 0.0));
        registry.add_secondary_external_movable_object("p", unit());
        registry.add_main_centered_movable_object("me", unit());
        registry.set_highlighted(Some("p"));

        registry.clean();
        assert_eq!(registry.tertiary_len(), 0);
        assert_eq!(registry.secondary_len(), 0);
        assert_eq!(registry.main_centered_len(), 0);
        assert!(registry.highlighted().is_none());
    }
}

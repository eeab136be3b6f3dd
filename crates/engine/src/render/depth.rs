use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{trace, warn};

use crate::camera::Camera;
use crate::canvas::Canvas;
use crate::geom::Rect;
use crate::position::Position;

use super::objects::RenderObject;
use super::registry::RenderRegistry;

/// Scalar ordering key. Total order over `f64`; non-finite positions never
/// reach the index because culling rejects them.
#[derive(Debug, Clone, Copy)]
pub struct DepthKey(pub f64);

impl PartialEq for DepthKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for DepthKey {}

impl PartialOrd for DepthKey {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for DepthKey {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthTier {
    Secondary,
    MainCentered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthEntry {
    pub name: Arc<str>,
    pub tier: DepthTier,
}

/// Depth buckets rebuilt every frame. Entries sharing a key keep insertion
/// order.
#[derive(Debug, Default)]
pub struct DepthIndex {
    buckets: BTreeMap<DepthKey, Vec<DepthEntry>>,
    len: usize,
}

impl DepthIndex {
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
    }

    pub fn insert(&mut self, key: DepthKey, entry: DepthEntry) {
        self.buckets.entry(key).or_default().push(entry);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.buckets
            .values()
            .flatten()
            .any(|entry| entry.name.as_ref() == name)
    }

    /// Back-to-front: largest key first, registration order within a key.
    pub fn iter_back_to_front(&self) -> impl Iterator<Item = (DepthKey, &DepthEntry)> {
        self.buckets
            .iter()
            .rev()
            .flat_map(|(key, entries)| entries.iter().map(move |entry| (*key, entry)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub visible: usize,
    pub culled: usize,
    pub background_visible: usize,
    pub background_culled: usize,
}

/// Builds the per-frame draw order over a shared [`RenderRegistry`] and
/// paints it. Only the render thread owns this value, so the depth index
/// needs no lock.
#[derive(Debug)]
pub struct DepthRenderer {
    registry: Arc<RenderRegistry>,
    index: DepthIndex,
    culling_margin: f64,
    culling_rect: Option<Rect>,
    stats: RenderStats,
    started: Instant,
    warned_stale_names: Mutex<HashSet<Arc<str>>>,
}

impl DepthRenderer {
    pub fn new(registry: Arc<RenderRegistry>, culling_margin: f64) -> Self {
        Self {
            registry,
            index: DepthIndex::default(),
            culling_margin: culling_margin.max(0.0),
            culling_rect: None,
            stats: RenderStats::default(),
            started: Instant::now(),
            warned_stale_names: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &Arc<RenderRegistry> {
        &self.registry
    }

    pub fn index(&self) -> &DepthIndex {
        &self.index
    }

    pub fn culling_rect(&self) -> Option<Rect> {
        self.culling_rect
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Rectangle around the local player (or the view center when there is
    /// none), wide enough to cover the rotated viewport at the current zoom
    /// plus however far the camera has panned away from the player.
    pub fn compute_culling_rect(&self, camera: &Camera) -> Rect {
        let view_center = camera.view_center_world();
        let center = self
            .registry
            .first_main_centered_movable_object()
            .map(|unit| unit.position())
            .unwrap_or(view_center);
        let viewport = camera.viewport_center();
        let scale = camera.scale();
        let reach = if scale.is_finite() && scale > f64::EPSILON {
            viewport.x.hypot(viewport.y) / scale
        } else {
            f64::INFINITY
        };
        let camera_offset = view_center.distance_to(center);
        let camera_offset = if camera_offset.is_finite() {
            camera_offset
        } else {
            f64::INFINITY
        };
        let half_extent = reach + camera_offset + self.culling_margin;
        Rect::around(center, half_extent, half_extent)
    }

    pub fn update(&mut self, camera: &Camera) {
        self.update_at(camera, Instant::now());
    }

    pub fn update_at(&mut self, camera: &Camera, now: Instant) {
        let rect = self.compute_culling_rect(camera);
        self.index.clear();
        let mut stats = RenderStats::default();

        {
            let tertiary = self.registry.tertiary_tier();
            for tile in tertiary.values() {
                if rect.contains(tile.position) {
                    stats.background_visible += 1;
                } else {
                    stats.background_culled += 1;
                }
            }
        }

        {
            let secondary = self.registry.secondary_tier();
            for (name, object) in secondary.iter() {
                if let RenderObject::Movable(unit) = object {
                    unit.update_at(now);
                }
                let position = object.position();
                if !rect.contains(position) {
                    if let RenderObject::Movable(unit) = object {
                        unit.advance_position();
                    }
                    stats.culled += 1;
                    continue;
                }
                self.index.insert(
                    depth_key(position),
                    DepthEntry {
                        name: Arc::clone(name),
                        tier: DepthTier::Secondary,
                    },
                );
                stats.visible += 1;
            }
        }

        {
            let main_centered = self.registry.main_centered_tier();
            for (name, unit) in main_centered.iter() {
                unit.update_at(now);
                self.index.insert(
                    depth_key(unit.position()),
                    DepthEntry {
                        name: Arc::clone(name),
                        tier: DepthTier::MainCentered,
                    },
                );
                stats.visible += 1;
            }
        }

        self.culling_rect = Some(rect);
        self.stats = stats;
        trace!(
            visible = stats.visible,
            culled = stats.culled,
            background_visible = stats.background_visible,
            "depth_index_rebuilt"
        );
    }

    /// Paints background tiles inside the culling rectangle, then the depth
    /// index back to front. Draws nothing before the first `update`.
    pub fn draw(&self, canvas: &mut Canvas<'_>, camera: &Camera) {
        let Some(rect) = self.culling_rect else {
            return;
        };
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;

        let tertiary = self.registry.tertiary_tier();
        for tile in tertiary.values() {
            if rect.contains(tile.position) {
                tile.draw(canvas, camera);
            }
        }
        drop(tertiary);

        let highlighted = self.registry.highlighted();
        let secondary = self.registry.secondary_tier();
        let main_centered = self.registry.main_centered_tier();
        for (_, entry) in self.index.iter_back_to_front() {
            match entry.tier {
                DepthTier::Secondary => match secondary.get(entry.name.as_ref()) {
                    Some(RenderObject::Tile(tile)) => tile.draw(canvas, camera),
                    Some(RenderObject::Static(object)) => {
                        let is_highlighted = highlighted.as_deref() == Some(entry.name.as_ref());
                        object.draw(canvas, camera, is_highlighted, elapsed_ms);
                    }
                    Some(RenderObject::Movable(unit)) => unit.draw(canvas, false, camera),
                    None => self.warn_stale_once(entry),
                },
                DepthTier::MainCentered => match main_centered.get(entry.name.as_ref()) {
                    Some(unit) => unit.draw(canvas, true, camera),
                    None => self.warn_stale_once(entry),
                },
            }
        }
    }

    /// Names in the order `draw` would paint them.
    pub fn draw_sequence(&self) -> Vec<Arc<str>> {
        self.index
            .iter_back_to_front()
            .map(|(_, entry)| Arc::clone(&entry.name))
            .collect()
    }

    /// Empties the registry and the index.
    pub fn clean(&mut self) {
        self.registry.clean();
        self.index.clear();
        self.culling_rect = None;
        self.stats = RenderStats::default();
    }

    fn warn_stale_once(&self, entry: &DepthEntry) {
        let mut warned = self
            .warned_stale_names
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if warned.insert(Arc::clone(&entry.name)) {
            warn!(
                name = %entry.name,
                tier = ?entry.tier,
                "depth_draw_skipped_missing_object"
            );
        }
    }
}

fn depth_key(position: Position) -> DepthKey {
    DepthKey(position.depth_key())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::canvas::Image;
    use crate::render::objects::{StaticObject, TileObject};
    use crate::unit::tests::test_sprite_set;
    use crate::unit::{AnimatedUnit, UnitConfig};

    fn tile_at(x: f64, y: f64) -> TileObject {
        TileObject::new(Position::new(x, y), Arc::new(Image::filled(2, 2, [50, 50, 50, 255])))
    }

    fn unit_at(position: Position) -> Arc<AnimatedUnit> {
        let unit =
            AnimatedUnit::new_at(test_sprite_set(2), "right", UnitConfig::default(), Instant::now())
                .expect("unit");
        unit.set_position(position);
        Arc::new(unit)
    }

    fn renderer() -> (Arc<RenderRegistry>, DepthRenderer, Camera) {
        let registry = Arc::new(RenderRegistry::new());
        let renderer = DepthRenderer::new(Arc::clone(&registry), 64.0);
        let mut camera = Camera::new(200.0, 200.0);
        camera.center_on(Position::new(0.0, 0.0));
        (registry, renderer, camera)
    }

    fn names(sequence: Vec<Arc<str>>) -> Vec<String> {
        sequence.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn draws_further_objects_first_and_keeps_tie_order() {
        let (registry, mut renderer, camera) = renderer();
        registry.add_secondary_tile_object("A", tile_at(2.0, 3.0));
        registry.add_secondary_tile_object("B", tile_at(4.0, 6.0));
        registry.add_secondary_external_movable_object("C", unit_at(Position::new(7.0, 3.0)));

        renderer.update(&camera);
        assert_eq!(names(renderer.draw_sequence()), vec!["B", "C", "A"]);
    }

    #[test]
    fn main_centered_unit_merges_by_world_depth() {
        let (registry, mut renderer, camera) = renderer();
        registry.add_secondary_tile_object("near", tile_at(-5.0, -5.0));
        registry.add_secondary_tile_object("far", tile_at(5.0, 5.0));
        registry.add_main_centered_movable_object("me", unit_at(Position::new(0.0, 0.0)));

        renderer.update(&camera);
        assert_eq!(names(renderer.draw_sequence()), vec!["far", "me", "near"]);
    }

    #[test]
    fn far_objects_are_culled_from_the_index() {
        let (registry, mut renderer, camera) = renderer();
        registry.add_main_centered_movable_object("me", unit_at(Position::new(0.0, 0.0)));
        registry.add_secondary_tile_object("close", tile_at(10.0, 10.0));
        registry.add_secondary_tile_object("far", tile_at(10_000.0, 0.0));
        registry.add_tertiary_tile_object("floor_far", tile_at(0.0, -10_000.0));

        renderer.update(&camera);
        assert!(renderer.index().contains("close"));
        assert!(!renderer.index().contains("far"));
        let stats = renderer.stats();
        assert_eq!(stats.visible, 2);
        assert_eq!(stats.culled, 1);
        assert_eq!(stats.background_culled, 1);
    }

    #[test]
    fn culling_rect_follows_the_local_player() {
        let (registry, mut renderer, mut camera) = renderer();
        camera.center_on(Position::new(5_000.0, 5_000.0));
        let player = unit_at(Position::new(5_000.0, 5_000.0));
        registry.add_main_centered_movable_object("me", Arc::clone(&player));
        registry.add_secondary_tile_object("by_player", tile_at(5_010.0, 4_990.0));
        registry.add_secondary_tile_object("origin", tile_at(0.0, 0.0));

        renderer.update(&camera);
        assert!(renderer.index().contains("by_player"));
        assert!(!renderer.index().contains("origin"));
    }

    #[test]
    fn panning_away_from_the_player_keeps_the_view_center_visible() {
        let (registry, mut renderer, mut camera) = renderer();
        registry.add_main_centered_movable_object("me", unit_at(Position::new(0.0, 0.0)));
        camera.translate_position_x(2_000.0);
        let view_center = camera.view_center_world();
        registry.add_secondary_tile_object("in_view", tile_at(view_center.x, view_center.y));
        registry.add_secondary_tile_object("beyond", tile_at(view_center.x + 10_000.0, 0.0));

        renderer.update(&camera);
        assert!(renderer.index().contains("in_view"));
        assert!(!renderer.index().contains("beyond"));

        camera.reset();
        let view_center = camera.view_center_world();
        registry.add_secondary_tile_object("after_reset", tile_at(view_center.x, view_center.y));
        renderer.update(&camera);
        assert!(renderer.index().contains("after_reset"));
    }

    #[test]
    fn culled_movables_still_drain_their_queue() {
        let (registry, mut renderer, camera) = renderer();
        registry.add_main_centered_movable_object("me", unit_at(Position::new(0.0, 0.0)));
        let walker = unit_at(Position::new(9_000.0, 0.0));
        walker.add_position(Position::new(9_010.0, 0.0));
        registry.add_secondary_external_movable_object("walker", Arc::clone(&walker));

        let queued = walker.pending_len();
        renderer.update(&camera);
        assert!(!renderer.index().contains("walker"));
        assert_eq!(walker.pending_len(), queued - 1);
    }

    #[test]
    fn every_visible_object_appears_once_after_repeated_updates() {
        let (registry, mut renderer, camera) = renderer();
        for index in 0..5 {
            registry.add_secondary_tile_object(&format!("t{index}"), tile_at(index as f64, 0.0));
        }
        renderer.update(&camera);
        renderer.update(&camera);
        assert_eq!(renderer.index().len(), 5);
        let unique: HashSet<String> = names(renderer.draw_sequence()).into_iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn pruned_name_is_skipped_during_draw() {
        let (registry, mut renderer, camera) = renderer();
        registry.add_secondary_external_movable_object("p1", unit_at(Position::new(1.0, 1.0)));
        registry.add_secondary_external_movable_object("p2", unit_at(Position::new(2.0, 2.0)));
        renderer.update(&camera);

        let live: HashSet<String> = ["p1".to_string()].into_iter().collect();
        registry.prune_secondary_external_movable_objects(&live);

        let mut frame = vec![0u8; 200 * 200 * 4];
        let mut canvas = Canvas::new(&mut frame, 200, 200);
        renderer.draw(&mut canvas, &camera);
        let warned = renderer
            .warned_stale_names
            .lock()
            .expect("warned names");
        assert!(warned.contains("p2"));
        assert!(!warned.contains("p1"));
    }

    #[test]
    fn draw_paints_background_before_midground() {
        let (registry, mut renderer, camera) = renderer();
        registry.add_tertiary_tile_object(
            "floor",
            TileObject::new(Position::new(0.0, 0.0), Arc::new(Image::filled(4, 4, [0, 0, 255, 255]))),
        );
        registry.add_secondary_static_object(
            "crate",
            StaticObject::new(Position::new(0.0, 0.0), Arc::new(Image::filled(2, 2, [255, 255, 0, 255]))),
        );
        renderer.update(&camera);

        let mut frame = vec![0u8; 200 * 200 * 4];
        let mut canvas = Canvas::new(&mut frame, 200, 200);
        renderer.draw(&mut canvas, &camera);
        // World origin sits at the viewport center.
        assert_eq!(canvas.pixel(100, 100), Some([255, 255, 0, 255]));
        assert_eq!(canvas.pixel(103, 103), Some([0, 0, 255, 255]));
    }

    #[test]
    fn network_writer_and_render_frames_run_concurrently() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let (registry, mut renderer, camera) = renderer();
        registry.add_main_centered_movable_object("me", unit_at(Position::new(0.0, 0.0)));
        registry.add_secondary_tile_object("rock", tile_at(3.0, 3.0));

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let registry = Arc::clone(&registry);
            let done = Arc::clone(&done);
            thread::Builder::new()
                .name("net_writer".to_string())
                .spawn(move || {
                    let units: Vec<Arc<AnimatedUnit>> = (0..4)
                        .map(|index| unit_at(Position::new(index as f64 * 5.0, 0.0)))
                        .collect();
                    for round in 0..400usize {
                        for (index, unit) in units.iter().enumerate() {
                            let name = format!("remote-{index}");
                            if !registry.secondary_external_movable_object_exists(&name) {
                                registry.add_secondary_external_movable_object(&name, Arc::clone(unit));
                            }
                            let step = (round % 20) as f64;
                            unit.add_position(Position::new(index as f64 * 5.0 + step, step));
                        }
                        let live: HashSet<String> = (0..4)
                            .filter(|index| (round + index) % 3 != 0)
                            .map(|index| format!("remote-{index}"))
                            .collect();
                        registry.prune_secondary_external_movable_objects(&live);
                    }
                    done.store(true, Ordering::Release);
                })
                .expect("spawn writer")
        };

        let mut frame = vec![0u8; 200 * 200 * 4];
        let mut frames = 0usize;
        while !done.load(Ordering::Acquire) || frames < 10 {
            renderer.update(&camera);
            let mut canvas = Canvas::new(&mut frame, 200, 200);
            renderer.draw(&mut canvas, &camera);
            frames += 1;
        }
        writer.join().expect("writer thread");

        renderer.update(&camera);
        let drawn = names(renderer.draw_sequence());
        let unique: HashSet<&String> = drawn.iter().collect();
        assert_eq!(unique.len(), drawn.len());
        assert_eq!(drawn.len(), registry.secondary_len() + registry.main_centered_len());
        assert!(renderer.index().contains("me"));
        assert!(renderer.index().contains("rock"));
    }

    #[test]
    fn clean_drops_registry_and_index() {
        let (registry, mut renderer, camera) = renderer();
        registry.add_secondary_tile_object("a", tile_at(0.0, 0.0));
        renderer.update(&camera);
        renderer.clean();
        assert!(renderer.index().is_empty());
        assert_eq!(registry.secondary_len(), 0);
        assert!(renderer.culling_rect().is_none());
    }
}

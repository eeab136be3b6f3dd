mod art;
mod network;
mod world;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use iso_engine::{
    animation_direction, load_map_into, AnimatedUnit, InputAction, InputSnapshot, MapLayerRoles,
    MapLayerTiles, Position, SelectedKind, SelectedObjectDetails, Session, SessionError,
    SpriteLookup, StaticObject, TileMap, WorldContext,
};
use tracing::{debug, info, warn};

pub(crate) use art::GeneratedSpriteLookup;
use art::{block_image, PLAYER_SPRITE, REMOTE_SPRITE};
use network::{decode_snapshot, FeedConfig, SimulatedFeed, WorldSnapshot};
use world::GeneratedMap;

const LOCAL_PLAYER_NAME: &str = "local_player";
const PLAYER_SPEED_PER_TICK: f64 = 2.0;
const GENERATED_MAP_SIZE: u32 = 24;
const CRATE_COLOR: [u8; 4] = [156, 108, 58, 255];

pub(crate) enum MapSource {
    Tmx(PathBuf),
    Generated,
}

pub(crate) struct DemoSession {
    sprites: Arc<dyn SpriteLookup>,
    map_source: MapSource,
    enable_feed: bool,
    player: Option<Arc<AnimatedUnit>>,
    feed: Option<SimulatedFeed>,
    remote_targets: HashMap<String, Position>,
    blocked_last_tick: bool,
}

impl DemoSession {
    pub(crate) fn new(sprites: Arc<dyn SpriteLookup>, map_source: MapSource) -> Self {
        Self {
            sprites,
            map_source,
            enable_feed: true,
            player: None,
            feed: None,
            remote_targets: HashMap::new(),
            blocked_last_tick: false,
        }
    }

    #[cfg(test)]
    fn without_feed(mut self) -> Self {
        self.enable_feed = false;
        self
    }

    fn load_map(&self, ctx: &WorldContext) -> Result<Vec<Position>, SessionError> {
        let roles = MapLayerRoles::default();
        let summary = match &self.map_source {
            MapSource::Tmx(path) => {
                let map = TileMap::load(path)?;
                info!(
                    path = %path.display(),
                    width = map.width(),
                    height = map.height(),
                    "tmx_map_loaded"
                );
                load_map_into(&map, &roles, &ctx.registry, &ctx.selector, &ctx.collision)?
            }
            MapSource::Generated => {
                let tile = ctx.config.tile_size.max(2.0) as u32;
                let map = GeneratedMap::new(GENERATED_MAP_SIZE, tile, tile / 2);
                let summary =
                    load_map_into(&map, &roles, &ctx.registry, &ctx.selector, &ctx.collision)?;
                self.place_crates(ctx, &map);
                summary
            }
        };
        Ok(summary.spawn_points)
    }

    /// Pickable props next to the arena center.
    fn place_crates(&self, ctx: &WorldContext, map: &GeneratedMap) {
        let (tile_width, tile_height) = map.tile_size();
        let image = Arc::new(block_image(tile_width / 2, tile_height / 2, 12, CRATE_COLOR));
        let center = map.center();
        let offsets = [(2.0, 1.0), (-3.0, 2.0), (1.0, -3.0)];
        for (index, (dx, dy)) in offsets.into_iter().enumerate() {
            let name = format!("crate-{index}");
            let position = Position::new(
                center.x + dx * tile_width as f64 / 2.0,
                center.y + dy * tile_height as f64 / 2.0,
            );
            ctx.registry
                .add_secondary_static_object(&name, StaticObject::new(position, Arc::clone(&image)));
            ctx.selector
                .add_local_static_object(&name, position, tile_width, tile_height);
        }
        debug!(crates = offsets.len(), size = map.size(), "crates_placed");
    }

    fn spawn_player(&mut self, ctx: &mut WorldContext, spawn: Position) -> Result<(), SessionError> {
        let sprites = self.sprites.lookup(PLAYER_SPRITE)?;
        let player = Arc::new(AnimatedUnit::new(sprites, "down", ctx.config.unit_config())?);
        player.set_position(spawn);
        player.set_static(true);
        ctx.registry
            .add_main_centered_movable_object(LOCAL_PLAYER_NAME, Arc::clone(&player));
        track_player(ctx, &player);
        ctx.camera.center_on(spawn);
        info!(x = spawn.x, y = spawn.y, "player_spawned");
        self.player = Some(player);
        Ok(())
    }

    fn move_player(&mut self, input: &InputSnapshot, ctx: &mut WorldContext) {
        let Some(player) = self.player.clone() else {
            return;
        };
        let step = movement_step(input);
        if step == Position::default() {
            player.set_static(true);
            return;
        }

        let current = player.position();
        let next = Position::new(current.x + step.x, current.y + step.y);
        if ctx.collision.is_colliding_at(next) {
            if !self.blocked_last_tick {
                debug!(x = next.x, y = next.y, "player_move_blocked");
            }
            self.blocked_last_tick = true;
            player.set_static(true);
            return;
        }
        self.blocked_last_tick = false;

        let facing = animation_direction(current, next).as_str();
        if player.direction() != facing {
            if let Err(error) = player.set_direction(facing) {
                warn!(error = %error, "player_direction_rejected");
            }
        }
        player.set_static(false);
        player.set_position(next);
        track_player(ctx, &player);
        ctx.camera.center_on(next);
    }

    fn poll_feed(&mut self, ctx: &WorldContext) {
        let Some(feed) = self.feed.as_ref() else {
            return;
        };
        let mut latest = None;
        for raw in feed.drain() {
            match decode_snapshot(&raw) {
                Ok(snapshot) => latest = Some(snapshot),
                Err(error) => {
                    warn!(path = %error.path(), error = %error.inner(), "feed_snapshot_rejected")
                }
            }
        }
        if let Some(snapshot) = latest {
            self.apply_snapshot(ctx, &snapshot);
        }
    }

    /// Queues each listed player's new position, spawns newcomers, and prunes
    /// everyone missing from the roster.
    fn apply_snapshot(&mut self, ctx: &WorldContext, snapshot: &WorldSnapshot) {
        let mut live = HashSet::with_capacity(snapshot.players.len());
        for remote in &snapshot.players {
            live.insert(remote.name.clone());
            let target = remote.position();
            let unit = match ctx.registry.get_secondary_external_movable_object(&remote.name) {
                Some(unit) => unit,
                None => match self.spawn_remote(ctx, &remote.name, target) {
                    Some(unit) => unit,
                    None => continue,
                },
            };

            let previous = self.remote_targets.insert(remote.name.clone(), target);
            match previous {
                Some(previous) if previous != target => {
                    let facing = animation_direction(previous, target).as_str();
                    if unit.direction() != facing && unit.set_direction(facing).is_err() {
                        debug!(name = %remote.name, facing, "remote_direction_rejected");
                    }
                    unit.set_static(false);
                    unit.add_position(target);
                }
                Some(_) => unit.set_static(true),
                None => {}
            }
            track_remote(ctx, &remote.name, &unit);
        }

        let removed = ctx.registry.prune_secondary_external_movable_objects(&live);
        ctx.selector.prune_external_movable_objects(&live);
        self.remote_targets.retain(|name, _| live.contains(name));
        if removed > 0 {
            info!(removed, tick = snapshot.tick, "remote_players_left");
        }
    }

    /// Moves each remote's hit region to where the unit is drawn now, which
    /// trails its network target while the queued walk drains.
    fn refresh_remote_regions(&self, ctx: &WorldContext) {
        for name in self.remote_targets.keys() {
            if let Some(unit) = ctx.registry.get_secondary_external_movable_object(name) {
                track_remote(ctx, name, &unit);
            }
        }
    }

    fn spawn_remote(
        &self,
        ctx: &WorldContext,
        name: &str,
        position: Position,
    ) -> Option<Arc<AnimatedUnit>> {
        let created = self
            .sprites
            .lookup(REMOTE_SPRITE)
            .and_then(|sprites| AnimatedUnit::new(sprites, "right", ctx.config.unit_config()));
        match created {
            Ok(unit) => {
                let unit = Arc::new(unit);
                unit.set_position(position);
                ctx.registry
                    .add_secondary_external_movable_object(name, Arc::clone(&unit));
                info!(name, x = position.x, y = position.y, "remote_player_joined");
                Some(unit)
            }
            Err(error) => {
                warn!(name, error = %error, "remote_player_spawn_failed");
                None
            }
        }
    }
}

fn track_player(ctx: &WorldContext, player: &AnimatedUnit) {
    let position = player.position();
    let (shift_width, shift_height) = player.shift_bounds();
    ctx.selector
        .set_main_trackable_object(position, shift_width, shift_height);
    ctx.collision
        .set_main_trackable_object(position, shift_width, shift_height);
}

fn track_remote(ctx: &WorldContext, name: &str, unit: &AnimatedUnit) {
    let (shift_width, shift_height) = unit.shift_bounds();
    ctx.selector
        .add_external_movable_object(name, unit.position(), shift_width, shift_height);
}

/// Spawn point closest to the centroid of all spawn points.
fn central_spawn(points: &[Position]) -> Option<Position> {
    if points.is_empty() {
        return None;
    }
    let count = points.len() as f64;
    let centroid = Position::new(
        points.iter().map(|point| point.x).sum::<f64>() / count,
        points.iter().map(|point| point.y).sum::<f64>() / count,
    );
    points
        .iter()
        .copied()
        .min_by(|a, b| a.distance_to(centroid).total_cmp(&b.distance_to(centroid)))
}

/// World-space step for the held movement keys; y is up.
fn movement_step(input: &InputSnapshot) -> Position {
    let mut x = 0.0;
    let mut y = 0.0;
    if input.is_down(InputAction::MoveLeft) {
        x -= 1.0;
    }
    if input.is_down(InputAction::MoveRight) {
        x += 1.0;
    }
    if input.is_down(InputAction::MoveUp) {
        y += 1.0;
    }
    if input.is_down(InputAction::MoveDown) {
        y -= 1.0;
    }
    let length = f64::hypot(x, y);
    if length == 0.0 {
        return Position::default();
    }
    Position::new(
        x / length * PLAYER_SPEED_PER_TICK,
        y / length * PLAYER_SPEED_PER_TICK,
    )
}

impl Session for DemoSession {
    fn load(&mut self, ctx: &mut WorldContext) -> Result<(), SessionError> {
        let spawn_points = self.load_map(ctx)?;
        let spawn = central_spawn(&spawn_points).unwrap_or_default();
        self.spawn_player(ctx, spawn)?;

        if self.enable_feed {
            let config = FeedConfig {
                center: spawn,
                ..FeedConfig::default()
            };
            match SimulatedFeed::spawn(config) {
                Ok(feed) => self.feed = Some(feed),
                Err(error) => warn!(error = %error, "feed_spawn_failed"),
            }
        }
        Ok(())
    }

    fn update(&mut self, _fixed_dt_seconds: f32, input: &InputSnapshot, ctx: &mut WorldContext) {
        self.move_player(input, ctx);
        self.poll_feed(ctx);
        self.refresh_remote_regions(ctx);
    }

    fn unload(&mut self, ctx: &mut WorldContext) {
        if let Some(mut feed) = self.feed.take() {
            feed.stop();
        }
        ctx.registry
            .remove_main_centered_movable_object(LOCAL_PLAYER_NAME);
        self.player = None;
        self.remote_targets.clear();
        info!("session_unloaded");
    }

    fn on_selected(&mut self, details: &SelectedObjectDetails, ctx: &mut WorldContext) {
        match details.kind {
            SelectedKind::MovableObject => {
                if let Some(unit) = ctx
                    .registry
                    .get_secondary_external_movable_object(&details.name)
                {
                    unit.trigger_hit();
                }
            }
            SelectedKind::LocalStaticObject => {
                info!(name = %details.name, "crate_opened");
            }
            SelectedKind::TileObject => {}
        }
    }

    fn debug_title(&self, ctx: &WorldContext) -> Option<String> {
        let stats = ctx.render_stats();
        Some(format!(
            "Iso Engine | players {} | drawn {} culled {} | zoom {:.0} rot {:.0}",
            self.remote_targets.len(),
            stats.visible,
            stats.culled,
            ctx.camera.zoom(),
            ctx.camera.rotation()
        ))
    }
}

#[cfg(test)]
mod tests {
    use iso_engine::{EngineConfig, FlashState, PointerState};

    use super::network::{bot_snapshot, RemotePlayer};
    use super::*;

    fn loaded() -> (DemoSession, WorldContext) {
        let mut session =
            DemoSession::new(Arc::new(GeneratedSpriteLookup::default()), MapSource::Generated)
                .without_feed();
        let mut ctx = WorldContext::new(EngineConfig::default());
        session.load(&mut ctx).expect("load");
        (session, ctx)
    }

    fn roster(players: &[(&str, f64, f64)]) -> WorldSnapshot {
        WorldSnapshot {
            tick: 0,
            players: players
                .iter()
                .map(|&(name, x, y)| RemotePlayer {
                    name: name.to_string(),
                    x,
                    y,
                })
                .collect(),
        }
    }

    #[test]
    fn central_spawn_prefers_the_middle() {
        let points = [
            Position::new(0.0, 0.0),
            Position::new(10.0, 0.0),
            Position::new(20.0, 0.0),
        ];
        assert_eq!(central_spawn(&points), Some(Position::new(10.0, 0.0)));
        assert_eq!(central_spawn(&[]), None);
    }

    #[test]
    fn load_registers_map_player_and_crates() {
        let (session, ctx) = loaded();
        let size = GENERATED_MAP_SIZE as usize;
        assert_eq!(ctx.registry.tertiary_len(), size * size);
        assert!(ctx.registry.main_centered_movable_object_exists(LOCAL_PLAYER_NAME));
        assert!(ctx.registry.secondary_static_object_exists("crate-0"));
        assert!(ctx.selector.local_static_object_exists("crate-2"));
        assert!(ctx.selector.main_trackable_object_exists());

        let player = session.player.as_ref().expect("player");
        assert_eq!(ctx.camera.view_center_world(), player.position());
        assert!(!ctx.collision.is_colliding());
    }

    #[test]
    fn movement_turns_the_player_and_follows_with_camera() {
        let (mut session, mut ctx) = loaded();
        let start = session.player.as_ref().expect("player").position();

        let input = InputSnapshot::empty().with_action_down(InputAction::MoveRight, true);
        session.update(1.0 / 60.0, &input, &mut ctx);

        let player = session.player.as_ref().expect("player");
        assert_eq!(
            player.position(),
            Position::new(start.x + PLAYER_SPEED_PER_TICK, start.y)
        );
        assert_eq!(player.direction(), "right");
        assert!(!player.is_static());
        assert_eq!(ctx.camera.view_center_world(), player.position());

        session.update(1.0 / 60.0, &InputSnapshot::empty(), &mut ctx);
        assert!(session.player.as_ref().expect("player").is_static());
    }

    #[test]
    fn walls_stop_the_player() {
        let (mut session, mut ctx) = loaded();
        let input = InputSnapshot::empty().with_action_down(InputAction::MoveLeft, true);
        let mut last = session.player.as_ref().expect("player").position();
        for _ in 0..2000 {
            session.update(1.0 / 60.0, &input, &mut ctx);
            let now = session.player.as_ref().expect("player").position();
            if now == last {
                break;
            }
            last = now;
        }
        let player = session.player.as_ref().expect("player");
        assert!(player.is_static());
        let next = Position::new(last.x - PLAYER_SPEED_PER_TICK, last.y);
        assert!(ctx.collision.is_colliding_at(next));
    }

    #[test]
    fn snapshots_spawn_queue_and_prune_remotes() {
        let (mut session, ctx) = loaded();
        session.apply_snapshot(&ctx, &roster(&[("a", 0.0, 0.0), ("b", 10.0, 10.0)]));
        assert!(ctx.registry.secondary_external_movable_object_exists("a"));
        assert!(ctx.selector.external_movable_object_exists("b"));

        session.apply_snapshot(&ctx, &roster(&[("a", -5.0, 0.0)]));
        let a = ctx
            .registry
            .get_secondary_external_movable_object("a")
            .expect("a");
        assert_eq!(a.direction(), "left");
        assert_eq!(a.pending_len(), 4);
        assert!(!ctx.registry.secondary_external_movable_object_exists("b"));
        assert!(!ctx.selector.external_movable_object_exists("b"));
        assert_eq!(session.remote_targets.len(), 1);
    }

    #[test]
    fn remote_hit_region_follows_the_drawn_position() {
        let (mut session, mut ctx) = loaded();
        session.apply_snapshot(&ctx, &roster(&[("a", -400.0, 0.0)]));
        session.apply_snapshot(&ctx, &roster(&[("a", -460.0, 0.0)]));
        let a = ctx
            .registry
            .get_secondary_external_movable_object("a")
            .expect("a");
        for _ in 0..20 {
            a.advance_position();
        }
        let shown = a.position();
        assert_eq!(shown, Position::new(-420.0, 0.0));

        session.update(1.0 / 60.0, &InputSnapshot::empty(), &mut ctx);
        let region = ctx.selector.get_external_movable_object("a").expect("region");
        assert_eq!(region.position(), shown);

        // Aim the pointer so the probe overlaps the top-left of the region.
        let bounds = region.bounds();
        let cursor = Position::new(
            shown.x + bounds.width() / 4.25 + 1.0,
            shown.y - bounds.height() + 1.0,
        );
        let camera = ctx.camera.position();
        let pointer = PointerState::cursor(cursor.x - camera.x, -cursor.y - camera.y);
        let found = ctx.selector.scan(&ctx.camera, &pointer).expect("selection");
        assert_eq!(found.kind, SelectedKind::MovableObject);
        assert_eq!(found.name.as_ref(), "a");
    }

    #[test]
    fn bot_rosters_apply_cleanly() {
        let (mut session, ctx) = loaded();
        let config = FeedConfig::default();
        session.apply_snapshot(&ctx, &bot_snapshot(&config, 0));
        assert_eq!(session.remote_targets.len(), config.bots - 1);

        session.apply_snapshot(&ctx, &bot_snapshot(&config, config.presence_cycle));
        assert!(ctx.registry.secondary_external_movable_object_exists("bot-0"));
        assert!(!ctx.registry.secondary_external_movable_object_exists("bot-1"));
    }

    #[test]
    fn selecting_a_remote_flashes_it() {
        let (mut session, mut ctx) = loaded();
        session.apply_snapshot(&ctx, &roster(&[("a", 0.0, 0.0)]));
        let details = SelectedObjectDetails {
            name: Arc::from("a"),
            position: Position::new(0.0, 0.0),
            kind: SelectedKind::MovableObject,
        };
        session.on_selected(&details, &mut ctx);
        let a = ctx
            .registry
            .get_secondary_external_movable_object("a")
            .expect("a");
        assert_ne!(a.flash_state(), FlashState::Inactive);
    }

    #[test]
    fn unload_drops_the_player() {
        let (mut session, mut ctx) = loaded();
        session.unload(&mut ctx);
        assert!(!ctx.registry.main_centered_movable_object_exists(LOCAL_PLAYER_NAME));
        assert!(session.player.is_none());
    }
}

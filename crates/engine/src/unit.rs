use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::camera::Camera;
use crate::canvas::{Canvas, ColorTransform, Image};
use crate::config::{EngineConfig, HitFlashConfig};
use crate::geom::Affine2;
use crate::position::{delayed_positions, Position};
use crate::sprite::{SpriteError, SpriteSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConfig {
    pub frame_period: Duration,
    pub hit_flash: HitFlashConfig,
    pub max_pending_positions: usize,
}

impl Default for UnitConfig {
    fn default() -> Self {
        EngineConfig::default().unit_config()
    }
}

/// Fires at most once per period; the next period starts when it fires.
#[derive(Debug, Clone, Copy)]
struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    fn new(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next: now + period,
        }
    }

    fn tick(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next = now + self.period;
        true
    }

    fn reset(&mut self, now: Instant) {
        self.next = now + self.period;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashState {
    Inactive,
    Flashing { value: u8 },
}

/// Red tint that ramps from `start` to `end` after a hit, then switches off.
#[derive(Debug, Clone, Copy)]
struct HitFlash {
    config: HitFlashConfig,
    state: FlashState,
    ticker: Ticker,
}

impl HitFlash {
    fn new(config: HitFlashConfig, now: Instant) -> Self {
        Self {
            config,
            state: FlashState::Inactive,
            ticker: Ticker::new(config.period(), now),
        }
    }

    fn trigger(&mut self, now: Instant) {
        if self.state == FlashState::Inactive {
            self.state = FlashState::Flashing {
                value: self.config.start,
            };
            self.ticker.reset(now);
        }
    }

    fn update(&mut self, now: Instant) {
        let FlashState::Flashing { value } = self.state else {
            return;
        };
        if value >= self.config.end {
            self.state = FlashState::Inactive;
            return;
        }
        if self.ticker.tick(now) {
            let next = value.saturating_add(self.config.step.max(1)).min(self.config.end);
            self.state = FlashState::Flashing { value: next };
        }
    }

    fn color(&self) -> ColorTransform {
        match self.state {
            FlashState::Inactive => ColorTransform::IDENTITY,
            FlashState::Flashing { value } => ColorTransform::scale_with_color([value, 0, 0, 255]),
        }
    }
}

#[derive(Debug)]
struct UnitState {
    direction: String,
    is_static: bool,
    frame: usize,
    position: Position,
    frame_ticker: Ticker,
    flash: HitFlash,
}

/// A renderable avatar: per-direction animation, a displayed position fed by
/// a queue of interpolated steps, and a hit flash.
///
/// The pending queue has its own lock because network handlers append to it
/// while the render loop drains it.
#[derive(Debug)]
pub struct AnimatedUnit {
    sprites: Arc<SpriteSet>,
    state: Mutex<UnitState>,
    pending: Mutex<VecDeque<Position>>,
    max_pending_positions: usize,
}

impl AnimatedUnit {
    pub fn new(
        sprites: Arc<SpriteSet>,
        direction: &str,
        config: UnitConfig,
    ) -> Result<Self, SpriteError> {
        Self::new_at(sprites, direction, config, Instant::now())
    }

    pub fn new_at(
        sprites: Arc<SpriteSet>,
        direction: &str,
        config: UnitConfig,
        now: Instant,
    ) -> Result<Self, SpriteError> {
        ensure_direction(&sprites, direction)?;
        Ok(Self {
            state: Mutex::new(UnitState {
                direction: direction.to_string(),
                is_static: false,
                frame: 0,
                position: Position::default(),
                frame_ticker: Ticker::new(config.frame_period, now),
                flash: HitFlash::new(config.hit_flash, now),
            }),
            sprites,
            pending: Mutex::new(VecDeque::new()),
            max_pending_positions: config.max_pending_positions.max(1),
        })
    }

    pub fn sprites(&self) -> &Arc<SpriteSet> {
        &self.sprites
    }

    /// Switching direction restarts the animation at frame 0.
    pub fn set_direction(&self, direction: &str) -> Result<(), SpriteError> {
        ensure_direction(&self.sprites, direction)?;
        let mut state = self.lock_state();
        if state.direction != direction {
            state.direction = direction.to_string();
            state.frame = 0;
        }
        Ok(())
    }

    pub fn direction(&self) -> String {
        self.lock_state().direction.clone()
    }

    pub fn set_static(&self, is_static: bool) {
        let mut state = self.lock_state();
        if state.is_static != is_static {
            state.is_static = is_static;
            state.frame = 0;
        }
    }

    pub fn is_static(&self) -> bool {
        self.lock_state().is_static
    }

    pub fn frame(&self) -> usize {
        self.lock_state().frame
    }

    pub fn position(&self) -> Position {
        self.lock_state().position
    }

    /// Places the unit immediately, discarding any queued steps.
    pub fn set_position(&self, position: Position) {
        let mut pending = self.lock_pending();
        pending.clear();
        self.lock_state().position = position;
    }

    /// Queues the interpolated walk to `target`, starting from the last queued
    /// step when one exists so that fast updates never double back.
    pub fn add_position(&self, target: Position) {
        let mut pending = self.lock_pending();
        let from = match pending.back() {
            Some(last) => *last,
            None => self.lock_state().position,
        };
        pending.extend(delayed_positions(from, target));
        while pending.len() > self.max_pending_positions {
            pending.pop_front();
        }
    }

    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    /// Moves the displayed position one queued step forward.
    pub fn advance_position(&self) -> Option<Position> {
        let next = self.lock_pending().pop_front()?;
        self.lock_state().position = next;
        Some(next)
    }

    pub fn trigger_hit(&self) {
        self.trigger_hit_at(Instant::now());
    }

    pub fn trigger_hit_at(&self, now: Instant) {
        self.lock_state().flash.trigger(now);
    }

    pub fn flash_state(&self) -> FlashState {
        self.lock_state().flash.state
    }

    /// Width and height of the image currently shown.
    pub fn shift_bounds(&self) -> (f64, f64) {
        let state = self.lock_state();
        match self.current_image(&state) {
            Some(image) => (image.width() as f64, image.height() as f64),
            None => (0.0, 0.0),
        }
    }

    pub fn update(&self) {
        self.update_at(Instant::now());
    }

    pub fn update_at(&self, now: Instant) {
        let mut state = self.lock_state();
        if !state.is_static && state.frame_ticker.tick(now) {
            let frame_count = self
                .sprites
                .direction(&state.direction)
                .map_or(0, |sprites| sprites.frames.len());
            state.frame = if frame_count > 1 {
                (state.frame + 1) % (frame_count - 1)
            } else {
                0
            };
        }
        state.flash.update(now);
    }

    /// Draws the unit after draining one queued step. World-space units go
    /// through the camera; centered units are pinned to the canvas center.
    pub fn draw(&self, canvas: &mut Canvas<'_>, centered: bool, camera: &Camera) {
        self.advance_position();

        let state = self.lock_state();
        let Some(image) = self.current_image(&state) else {
            return;
        };
        let transform = if centered {
            Affine2::translation(
                canvas.width() as f64 / 2.0 - image.width() as f64 / 2.0,
                canvas.height() as f64 / 2.0 - image.height() as f64 / 2.0,
            )
        } else {
            Affine2::translation(state.position.x, -state.position.y).then(camera.world_matrix())
        };
        let color = state.flash.color();
        canvas.draw_image(image, &transform, color);
    }

    fn current_image<'a>(&'a self, state: &UnitState) -> Option<&'a Image> {
        let sprites = self.sprites.direction(&state.direction)?;
        if state.is_static {
            return Some(sprites.rotation.as_ref());
        }
        let index = state.frame.min(sprites.frames.len().checked_sub(1)?);
        sprites.frames.get(index).map(Arc::as_ref)
    }

    fn lock_state(&self) -> MutexGuard<'_, UnitState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<Position>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn ensure_direction(sprites: &SpriteSet, direction: &str) -> Result<(), SpriteError> {
    if sprites.has_direction(direction) {
        Ok(())
    } else {
        Err(SpriteError::UnknownDirection {
            name: sprites.name().to_string(),
            direction: direction.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::sprite::DirectionSprites;

    pub(crate) fn test_sprite_set(frame_count: usize) -> Arc<SpriteSet> {
        let mut directions = HashMap::new();
        for (direction, color) in [("right", [200, 0, 0, 255]), ("left", [0, 200, 0, 255])] {
            directions.insert(
                direction.to_string(),
                DirectionSprites {
                    frames: (0..frame_count)
                        .map(|index| Arc::new(Image::filled(4 + index as u32, 6, color)))
                        .collect(),
                    rotation: Arc::new(Image::filled(3, 5, color)),
                },
            );
        }
        Arc::new(SpriteSet::new("test", directions).expect("sprite set"))
    }

    fn unit_with(frame_count: usize, config: UnitConfig, now: Instant) -> AnimatedUnit {
        AnimatedUnit::new_at(test_sprite_set(frame_count), "right", config, now).expect("unit")
    }

    #[test]
    fn unknown_direction_is_rejected() {
        let unit = unit_with(4, UnitConfig::default(), Instant::now());
        assert!(matches!(
            unit.set_direction("up"),
            Err(SpriteError::UnknownDirection { .. })
        ));
        assert_eq!(unit.direction(), "right");
    }

    #[test]
    fn frames_advance_once_per_period_and_wrap_before_last_frame() {
        let start = Instant::now();
        let config = UnitConfig::default();
        let unit = unit_with(4, config, start);

        unit.update_at(start + config.frame_period / 2);
        assert_eq!(unit.frame(), 0);

        let mut now = start;
        let mut seen = Vec::new();
        for _ in 0..4 {
            now += config.frame_period;
            unit.update_at(now);
            seen.push(unit.frame());
        }
        assert_eq!(seen, vec![1, 2, 0, 1]);
    }

    #[test]
    fn direction_and_static_changes_reset_frame() {
        let start = Instant::now();
        let config = UnitConfig::default();
        let unit = unit_with(4, config, start);
        unit.update_at(start + config.frame_period);
        assert_eq!(unit.frame(), 1);

        unit.set_direction("right").expect("same direction");
        assert_eq!(unit.frame(), 1);
        unit.set_direction("left").expect("left");
        assert_eq!(unit.frame(), 0);

        unit.update_at(start + config.frame_period * 2);
        assert_eq!(unit.frame(), 1);
        unit.set_static(true);
        assert_eq!(unit.frame(), 0);
        unit.update_at(start + config.frame_period * 3);
        assert_eq!(unit.frame(), 0);
    }

    #[test]
    fn single_frame_sets_stay_on_first_frame() {
        let start = Instant::now();
        let config = UnitConfig::default();
        let unit = unit_with(1, config, start);
        unit.update_at(start + config.frame_period);
        assert_eq!(unit.frame(), 0);
    }

    #[test]
    fn add_position_chains_from_queue_tail() {
        let unit = unit_with(2, UnitConfig::default(), Instant::now());
        unit.add_position(Position::new(5.0, 0.0));
        assert_eq!(unit.pending_len(), 4);

        unit.add_position(Position::new(5.0, 5.0));
        // Tail was (4, 0); the second walk continues from there.
        assert_eq!(unit.pending_len(), 4 + 5);

        let mut last = unit.position();
        while let Some(next) = unit.advance_position() {
            last = next;
        }
        assert_eq!(last, Position::new(5.0, 5.0));
        assert_eq!(unit.position(), last);
    }

    #[test]
    fn add_position_to_current_position_is_noop() {
        let unit = unit_with(2, UnitConfig::default(), Instant::now());
        unit.set_position(Position::new(3.0, 3.0));
        unit.add_position(Position::new(3.0, 3.0));
        assert_eq!(unit.pending_len(), 0);
    }

    #[test]
    fn pending_queue_is_capped_keeping_newest_steps() {
        let config = UnitConfig {
            max_pending_positions: 5,
            ..UnitConfig::default()
        };
        let unit = unit_with(2, config, Instant::now());
        unit.add_position(Position::new(20.0, 0.0));
        assert_eq!(unit.pending_len(), 5);
        assert_eq!(unit.advance_position(), Some(Position::new(15.0, 0.0)));
    }

    #[test]
    fn hit_flash_ramps_to_end_then_turns_off() {
        let start = Instant::now();
        let config = UnitConfig {
            hit_flash: HitFlashConfig {
                start: 200,
                end: 255,
                step: 30,
                period_ms: 10,
            },
            ..UnitConfig::default()
        };
        let unit = unit_with(2, config, start);
        assert_eq!(unit.flash_state(), FlashState::Inactive);

        unit.trigger_hit_at(start);
        assert_eq!(unit.flash_state(), FlashState::Flashing { value: 200 });

        let step = Duration::from_millis(10);
        unit.update_at(start + step);
        assert_eq!(unit.flash_state(), FlashState::Flashing { value: 230 });
        unit.update_at(start + step * 2);
        assert_eq!(unit.flash_state(), FlashState::Flashing { value: 255 });
        unit.update_at(start + step * 3);
        assert_eq!(unit.flash_state(), FlashState::Inactive);
    }

    #[test]
    fn retrigger_while_flashing_does_not_restart() {
        let start = Instant::now();
        let unit = unit_with(2, UnitConfig::default(), start);
        unit.trigger_hit_at(start);
        unit.update_at(start + Duration::from_millis(20));
        let before = unit.flash_state();
        unit.trigger_hit_at(start + Duration::from_millis(21));
        assert_eq!(unit.flash_state(), before);
    }

    #[test]
    fn shift_bounds_follow_static_and_frame() {
        let unit = unit_with(3, UnitConfig::default(), Instant::now());
        assert_eq!(unit.shift_bounds(), (4.0, 6.0));
        unit.set_static(true);
        assert_eq!(unit.shift_bounds(), (3.0, 5.0));
    }

    #[test]
    fn centered_draw_ignores_camera_and_drains_one_step() {
        let unit = unit_with(2, UnitConfig::default(), Instant::now());
        unit.add_position(Position::new(3.0, 0.0));
        let mut frame = vec![0u8; 20 * 20 * 4];
        let mut canvas = Canvas::new(&mut frame, 20, 20);
        let mut camera = Camera::new(20.0, 20.0);
        camera.translate_position_x(500.0);

        unit.draw(&mut canvas, true, &camera);
        assert_eq!(unit.position(), Position::new(1.0, 0.0));
        // 4x6 frame centered on a 20x20 canvas covers x 8..12, y 7..13.
        assert_eq!(canvas.pixel(8, 7), Some([200, 0, 0, 255]));
        assert_eq!(canvas.pixel(12, 7), Some([0, 0, 0, 0]));
    }

    #[test]
    fn world_draw_places_unit_with_flipped_y() {
        let unit = unit_with(2, UnitConfig::default(), Instant::now());
        unit.set_position(Position::new(2.0, -3.0));
        let mut frame = vec![0u8; 20 * 20 * 4];
        let mut canvas = Canvas::new(&mut frame, 20, 20);
        let camera = Camera::new(20.0, 20.0);

        unit.draw(&mut canvas, false, &camera);
        assert_eq!(canvas.pixel(2, 3), Some([200, 0, 0, 255]));
        assert_eq!(canvas.pixel(1, 3), Some([0, 0, 0, 0]));
    }
}

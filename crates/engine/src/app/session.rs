use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::camera::Camera;
use crate::canvas::Canvas;
use crate::collision::Collision;
use crate::config::EngineConfig;
use crate::map::MapError;
use crate::render::{DepthRenderer, RenderRegistry, RenderStats};
use crate::selector::{PointerState, SelectedObjectDetails, Selector};
use crate::sprite::SpriteError;

use super::input::{CameraControls, InputSnapshot};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load map: {0}")]
    Map(#[from] MapError),
    #[error("failed to load sprites: {0}")]
    Sprite(#[from] SpriteError),
}

/// Everything one session shares between its loaders, network feed and the
/// render loop. Registries are `Arc` so other threads can hold them; the
/// depth index stays inside the renderer.
#[derive(Debug)]
pub struct WorldContext {
    pub registry: Arc<RenderRegistry>,
    pub selector: Arc<Selector>,
    pub collision: Arc<Collision>,
    pub camera: Camera,
    pub config: EngineConfig,
    renderer: DepthRenderer,
}

impl WorldContext {
    pub fn new(config: EngineConfig) -> Self {
        let registry = Arc::new(RenderRegistry::new());
        let renderer = DepthRenderer::new(Arc::clone(&registry), config.culling_margin);
        Self {
            selector: Arc::new(Selector::new(config.selector_config())),
            collision: Arc::new(Collision::new()),
            camera: Camera::new(config.world_width as f64, config.world_height as f64),
            registry,
            config,
            renderer,
        }
    }

    pub fn renderer(&self) -> &DepthRenderer {
        &self.renderer
    }

    pub fn render_stats(&self) -> RenderStats {
        self.renderer.stats()
    }

    /// Rebuilds the depth index for the current camera.
    pub fn update_render(&mut self) {
        self.renderer.update(&self.camera);
    }

    pub fn draw(&self, canvas: &mut Canvas<'_>) {
        self.renderer.draw(canvas, &self.camera);
    }

    /// Picks under `pointer` and moves the highlight to the hit, or clears it
    /// on a miss.
    pub fn select(&self, pointer: &PointerState) -> Option<SelectedObjectDetails> {
        let selected = self.selector.scan(&self.camera, pointer);
        self.registry
            .set_highlighted(selected.as_ref().map(|details| details.name.as_ref()));
        selected
    }

    pub fn clean(&mut self) {
        self.registry.clean();
        self.selector.clean();
        self.collision.clean();
        self.renderer.clean();
    }
}

pub trait Session {
    fn load(&mut self, ctx: &mut WorldContext) -> Result<(), SessionError>;
    fn update(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot, ctx: &mut WorldContext);
    fn unload(&mut self, ctx: &mut WorldContext);
    fn on_selected(&mut self, _details: &SelectedObjectDetails, _ctx: &mut WorldContext) {}
    fn debug_title(&self, _ctx: &WorldContext) -> Option<String> {
        None
    }
}

pub(crate) struct SessionRuntime {
    session: Box<dyn Session>,
    ctx: WorldContext,
    controls: CameraControls,
    is_loaded: bool,
}

impl SessionRuntime {
    pub(crate) fn new(
        session: Box<dyn Session>,
        config: EngineConfig,
        controls: CameraControls,
    ) -> Self {
        Self {
            session,
            ctx: WorldContext::new(config),
            controls,
            is_loaded: false,
        }
    }

    pub(crate) fn ctx(&self) -> &WorldContext {
        &self.ctx
    }

    pub(crate) fn load(&mut self) -> Result<(), SessionError> {
        if self.is_loaded {
            return Ok(());
        }
        self.session.load(&mut self.ctx)?;
        self.is_loaded = true;
        info!(
            tertiary = self.ctx.registry.tertiary_len(),
            secondary = self.ctx.registry.secondary_len(),
            main_centered = self.ctx.registry.main_centered_len(),
            "session_loaded"
        );
        Ok(())
    }

    /// One fixed tick: camera steering, pointer pick, then the session.
    pub(crate) fn tick(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot) {
        self.controls.apply(&mut self.ctx.camera, input);

        if input.left_click_pressed() {
            match self.ctx.select(&input.pointer()) {
                Some(details) => {
                    info!(
                        name = %details.name,
                        kind = ?details.kind,
                        x = details.position.x,
                        y = details.position.y,
                        "object_selected"
                    );
                    self.session.on_selected(&details, &mut self.ctx);
                }
                None => debug!(cursor = ?input.cursor_position_px(), "selection_missed"),
            }
        }

        self.session.update(fixed_dt_seconds, input, &mut self.ctx);
    }

    pub(crate) fn update_render(&mut self) {
        self.ctx.update_render();
    }

    pub(crate) fn debug_title(&self) -> Option<String> {
        self.session.debug_title(&self.ctx)
    }

    pub(crate) fn shutdown(&mut self) {
        if !self.is_loaded {
            return;
        }
        self.session.unload(&mut self.ctx);
        self.ctx.clean();
        self.is_loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;
    use crate::canvas::Image;
    use crate::position::Position;
    use crate::render::StaticObject;
    use crate::selector::SelectedKind;
    use crate::unit::tests::test_sprite_set;
    use crate::unit::{AnimatedUnit, UnitConfig};

    #[derive(Default)]
    struct Calls {
        loads: usize,
        updates: usize,
        unloads: usize,
        selected: Vec<SelectedKind>,
    }

    struct RecordingSession {
        calls: Arc<Mutex<Calls>>,
    }

    impl Session for RecordingSession {
        fn load(&mut self, ctx: &mut WorldContext) -> Result<(), SessionError> {
            self.calls.lock().expect("calls").loads += 1;
            let unit = Arc::new(
                AnimatedUnit::new_at(test_sprite_set(2), "right", UnitConfig::default(), Instant::now())
                    .expect("unit"),
            );
            ctx.registry.add_main_centered_movable_object("me", unit);
            Ok(())
        }

        fn update(&mut self, _fixed_dt_seconds: f32, _input: &InputSnapshot, _ctx: &mut WorldContext) {
            self.calls.lock().expect("calls").updates += 1;
        }

        fn unload(&mut self, _ctx: &mut WorldContext) {
            self.calls.lock().expect("calls").unloads += 1;
        }

        fn on_selected(&mut self, details: &SelectedObjectDetails, _ctx: &mut WorldContext) {
            self.calls.lock().expect("calls").selected.push(details.kind);
        }
    }

    fn runtime() -> (SessionRuntime, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let session = RecordingSession {
            calls: Arc::clone(&calls),
        };
        (
            SessionRuntime::new(
                Box::new(session),
                EngineConfig::default(),
                CameraControls::default(),
            ),
            calls,
        )
    }

    #[test]
    fn context_camera_matches_world_size() {
        let ctx = WorldContext::new(EngineConfig::default());
        assert_eq!(ctx.camera.viewport_center(), Position::new(640.0, 360.0));
    }

    #[test]
    fn load_is_idempotent_and_shutdown_cleans() {
        let (mut runtime, calls) = runtime();
        runtime.load().expect("load");
        runtime.load().expect("load again");
        assert_eq!(calls.lock().expect("calls").loads, 1);
        assert_eq!(runtime.ctx().registry.main_centered_len(), 1);

        runtime.shutdown();
        runtime.shutdown();
        assert_eq!(calls.lock().expect("calls").unloads, 1);
        assert_eq!(runtime.ctx().registry.main_centered_len(), 0);
    }

    #[test]
    fn click_selects_before_session_update() {
        let (mut runtime, calls) = runtime();
        runtime.load().expect("load");
        runtime
            .ctx
            .selector
            .add_tile_object("ground:0:0", Position::new(-16.0, 22.0), 64, 32);
        runtime.ctx.camera.center_on(Position::new(0.0, 0.0));

        let input = InputSnapshot::empty()
            .with_cursor_position_px(Some(Position::new(640.0, 360.0)))
            .with_left_click_pressed(true);
        runtime.tick(1.0 / 60.0, &input);

        let calls = calls.lock().expect("calls");
        assert_eq!(calls.updates, 1);
        assert_eq!(calls.selected, vec![SelectedKind::TileObject]);
        assert_eq!(
            runtime.ctx().registry.highlighted().as_deref(),
            Some("ground:0:0")
        );
    }

    #[test]
    fn miss_clears_highlight() {
        let ctx = WorldContext::new(EngineConfig::default());
        ctx.registry.add_secondary_static_object(
            "crate",
            StaticObject::new(Position::new(0.0, 0.0), Arc::new(Image::filled(2, 2, [9; 4]))),
        );
        ctx.registry.set_highlighted(Some("crate"));

        assert!(ctx.select(&PointerState::cursor(5000.0, 5000.0)).is_none());
        assert!(ctx.registry.highlighted().is_none());
    }

    #[test]
    fn update_render_indexes_main_unit() {
        let (mut runtime, _calls) = runtime();
        runtime.load().expect("load");
        runtime.update_render();
        assert!(runtime.ctx().renderer().index().contains("me"));
    }
}

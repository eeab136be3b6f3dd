use std::sync::Arc;

use crate::camera::Camera;
use crate::canvas::{Canvas, ColorTransform, Image};
use crate::geom::Affine2;
use crate::position::Position;
use crate::unit::AnimatedUnit;

const HIGHLIGHT_PERIOD_MS: f64 = 200.0;
const HIGHLIGHT_INTENSITY: f32 = 0.3;

fn surface_transform(position: Position, camera: &Camera) -> Affine2 {
    Affine2::translation(position.x, -position.y).then(camera.world_matrix())
}

/// A map tile placed at its world position.
#[derive(Debug, Clone)]
pub struct TileObject {
    pub position: Position,
    pub image: Arc<Image>,
}

impl TileObject {
    pub fn new(position: Position, image: Arc<Image>) -> Self {
        Self { position, image }
    }

    pub fn draw(&self, canvas: &mut Canvas<'_>, camera: &Camera) {
        canvas.draw_image(
            &self.image,
            &surface_transform(self.position, camera),
            ColorTransform::IDENTITY,
        );
    }
}

/// A standalone world object that can be highlighted when hovered or picked.
#[derive(Debug, Clone)]
pub struct StaticObject {
    pub position: Position,
    pub image: Arc<Image>,
}

impl StaticObject {
    pub fn new(position: Position, image: Arc<Image>) -> Self {
        Self { position, image }
    }

    pub fn shift_bounds(&self) -> (f64, f64) {
        (self.image.width() as f64, self.image.height() as f64)
    }

    /// `elapsed_ms` drives the highlight pulse.
    pub fn draw(&self, canvas: &mut Canvas<'_>, camera: &Camera, highlighted: bool, elapsed_ms: f64) {
        let color = if highlighted {
            highlight_color(elapsed_ms)
        } else {
            ColorTransform::IDENTITY
        };
        canvas.draw_image(&self.image, &surface_transform(self.position, camera), color);
    }
}

pub(crate) fn highlight_color(elapsed_ms: f64) -> ColorTransform {
    let pulse = (((elapsed_ms / HIGHLIGHT_PERIOD_MS).sin() + 1.0) / 2.0) as f32;
    let intensity = HIGHLIGHT_INTENSITY * pulse;
    ColorTransform::translate(intensity, intensity, intensity * 0.5, 0.0)
}

/// Everything the midground tier can hold.
#[derive(Debug, Clone)]
pub enum RenderObject {
    Tile(TileObject),
    Static(StaticObject),
    Movable(Arc<AnimatedUnit>),
}

impl RenderObject {
    pub fn position(&self) -> Position {
        match self {
            RenderObject::Tile(tile) => tile.position,
            RenderObject::Static(object) => object.position,
            RenderObject::Movable(unit) => unit.position(),
        }
    }

    pub fn kind(&self) -> RenderObjectKind {
        match self {
            RenderObject::Tile(_) => RenderObjectKind::Tile,
            RenderObject::Static(_) => RenderObjectKind::Static,
            RenderObject::Movable(_) => RenderObjectKind::Movable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderObjectKind {
    Tile,
    Static,
    Movable,
}

use crate::geom::Affine2;
use crate::position::Position;

const ZOOM_BASE: f64 = 1.01;

/// View over the world surface. `position` pans the world under a fixed
/// viewport; zoom and rotation pivot around the viewport center.
///
/// Zoom is an exponent: the applied scale is `1.01^zoom`. No limits are
/// enforced here; input handlers clamp zoom themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    viewport_center: Position,
    position: Position,
    zoom: f64,
    rotation: f64,
}

impl Camera {
    pub fn new(viewport_width: f64, viewport_height: f64) -> Self {
        Self {
            viewport_center: Position::new(viewport_width * 0.5, viewport_height * 0.5),
            position: Position::default(),
            zoom: 0.0,
            rotation: 0.0,
        }
    }

    pub fn viewport_center(&self) -> Position {
        self.viewport_center
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn scale(&self) -> f64 {
        ZOOM_BASE.powf(self.zoom)
    }

    /// Rotation in degrees.
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn world_matrix(&self) -> Affine2 {
        let scale = self.scale();
        Affine2::IDENTITY
            .then_translate(-self.position.x, -self.position.y)
            .then_translate(-self.viewport_center.x, -self.viewport_center.y)
            .then_scale(scale, scale)
            .then_rotate(self.rotation.to_radians())
            .then_translate(self.viewport_center.x, self.viewport_center.y)
    }

    /// Maps a surface point to the screen.
    pub fn world_to_screen(&self, point: Position) -> Position {
        let (x, y) = self.world_matrix().apply(point.x, point.y);
        Position::new(x, y)
    }

    /// Maps a screen point back to the surface. `None` when the world matrix
    /// cannot be inverted (degenerate scale).
    pub fn project_position_to_world(&self, screen_x: f64, screen_y: f64) -> Option<Position> {
        let inverse = self.world_matrix().inverted()?;
        let (x, y) = inverse.apply(screen_x, screen_y);
        let projected = Position::new(x, y);
        projected.is_finite().then_some(projected)
    }

    /// Screen pixel to a y-up world position. World objects are placed on the
    /// surface at `(x, -y)`.
    pub fn pointer_to_world(&self, screen_x: f64, screen_y: f64) -> Option<Position> {
        self.project_position_to_world(screen_x, screen_y)
            .map(|surface| Position::new(surface.x, -surface.y))
    }

    /// y-up world position shown at the viewport center. Unaffected by zoom
    /// and rotation, which pivot around that point.
    pub fn view_center_world(&self) -> Position {
        Position::new(
            self.position.x + self.viewport_center.x,
            -(self.position.y + self.viewport_center.y),
        )
    }

    /// Pans so that the y-up world position `target` sits at the viewport
    /// center.
    pub fn center_on(&mut self, target: Position) {
        self.position = Position::new(
            target.x - self.viewport_center.x,
            -target.y - self.viewport_center.y,
        );
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn translate_position_x(&mut self, delta: f64) {
        self.position.x += delta;
    }

    pub fn translate_position_y(&mut self, delta: f64) {
        self.position.y += delta;
    }

    pub fn zoom_in(&mut self) {
        self.zoom_in_by(1.0);
    }

    pub fn zoom_out(&mut self) {
        self.zoom_out_by(1.0);
    }

    pub fn zoom_in_by(&mut self, amount: f64) {
        self.zoom += amount;
    }

    pub fn zoom_out_by(&mut self, amount: f64) {
        self.zoom -= amount;
    }

    pub fn rotate_right(&mut self) {
        self.rotate_right_by(1.0);
    }

    pub fn rotate_left(&mut self) {
        self.rotate_left_by(1.0);
    }

    pub fn rotate_right_by(&mut self, degrees: f64) {
        self.rotation += degrees;
    }

    pub fn rotate_left_by(&mut self, degrees: f64) {
        self.rotation -= degrees;
    }

    pub fn reset(&mut self) {
        self.position = Position::default();
        self.zoom = 0.0;
        self.rotation = 0.0;
    }
}

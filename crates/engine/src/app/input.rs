use crate::camera::Camera;
use crate::position::Position;
use crate::selector::PointerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    PanUp,
    PanDown,
    PanLeft,
    PanRight,
    RotateLeft,
    RotateRight,
    Quit,
}

const ACTION_COUNT: usize = 11;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ActionStates {
    down: [bool; ACTION_COUNT],
}

impl ActionStates {
    pub(crate) fn set(&mut self, action: InputAction, is_down: bool) {
        self.down[action.index()] = is_down;
    }

    pub(crate) fn is_down(&self, action: InputAction) -> bool {
        self.down[action.index()]
    }
}

impl InputAction {
    const fn index(self) -> usize {
        match self {
            InputAction::MoveUp => 0,
            InputAction::MoveDown => 1,
            InputAction::MoveLeft => 2,
            InputAction::MoveRight => 3,
            InputAction::PanUp => 4,
            InputAction::PanDown => 5,
            InputAction::PanLeft => 6,
            InputAction::PanRight => 7,
            InputAction::RotateLeft => 8,
            InputAction::RotateRight => 9,
            InputAction::Quit => 10,
        }
    }
}

/// Input state for one fixed tick. Press edges are set for exactly one
/// snapshot; held actions stay down until released.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputSnapshot {
    quit_requested: bool,
    actions: ActionStates,
    cursor_position_px: Option<Position>,
    left_click_pressed: bool,
    reset_camera_pressed: bool,
    zoom_delta_steps: i32,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn new(
        quit_requested: bool,
        actions: ActionStates,
        cursor_position_px: Option<Position>,
        left_click_pressed: bool,
        reset_camera_pressed: bool,
        zoom_delta_steps: i32,
    ) -> Self {
        Self {
            quit_requested,
            actions,
            cursor_position_px,
            left_click_pressed,
            reset_camera_pressed,
            zoom_delta_steps,
        }
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn is_down(&self, action: InputAction) -> bool {
        self.actions.is_down(action)
    }

    pub fn with_action_down(mut self, action: InputAction, is_down: bool) -> Self {
        self.actions.set(action, is_down);
        self
    }

    pub fn with_cursor_position_px(mut self, cursor: Option<Position>) -> Self {
        self.cursor_position_px = cursor;
        self
    }

    pub fn with_left_click_pressed(mut self, pressed: bool) -> Self {
        self.left_click_pressed = pressed;
        self
    }

    pub fn with_zoom_delta_steps(mut self, steps: i32) -> Self {
        self.zoom_delta_steps = steps;
        self
    }

    pub fn with_reset_camera_pressed(mut self, pressed: bool) -> Self {
        self.reset_camera_pressed = pressed;
        self
    }

    /// Cursor in surface-buffer pixels, `None` while outside the window.
    pub fn cursor_position_px(&self) -> Option<Position> {
        self.cursor_position_px
    }

    pub fn pointer(&self) -> PointerState {
        PointerState {
            cursor_px: self.cursor_position_px,
            ..PointerState::default()
        }
    }

    pub fn left_click_pressed(&self) -> bool {
        self.left_click_pressed
    }

    pub fn reset_camera_pressed(&self) -> bool {
        self.reset_camera_pressed
    }

    pub fn zoom_delta_steps(&self) -> i32 {
        self.zoom_delta_steps
    }
}

/// Per-tick camera steering. Zoom limits live here; `Camera` itself is
/// unbounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraControls {
    pub pan_speed: f64,
    pub zoom_step: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub rotate_step_degrees: f64,
}

impl Default for CameraControls {
    fn default() -> Self {
        Self {
            pan_speed: 6.0,
            zoom_step: 5.0,
            min_zoom: -70.0,
            max_zoom: 70.0,
            rotate_step_degrees: 2.0,
        }
    }
}

impl CameraControls {
    pub fn apply(&self, camera: &mut Camera, input: &InputSnapshot) {
        if input.reset_camera_pressed() {
            camera.reset();
            return;
        }

        if input.is_down(InputAction::PanLeft) {
            camera.translate_position_x(-self.pan_speed);
        }
        if input.is_down(InputAction::PanRight) {
            camera.translate_position_x(self.pan_speed);
        }
        if input.is_down(InputAction::PanUp) {
            camera.translate_position_y(-self.pan_speed);
        }
        if input.is_down(InputAction::PanDown) {
            camera.translate_position_y(self.pan_speed);
        }

        if input.zoom_delta_steps() != 0 {
            let target = (camera.zoom() + input.zoom_delta_steps() as f64 * self.zoom_step)
                .clamp(self.min_zoom, self.max_zoom);
            camera.zoom_in_by(target - camera.zoom());
        }

        if input.is_down(InputAction::RotateLeft) {
            camera.rotate_left_by(self.rotate_step_degrees);
        }
        if input.is_down(InputAction::RotateRight) {
            camera.rotate_right_by(self.rotate_step_degrees);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_is_clamped_to_limits() {
        let controls = CameraControls::default();
        let mut camera = Camera::new(200.0, 200.0);
        let input = InputSnapshot::empty().with_zoom_delta_steps(100);

        controls.apply(&mut camera, &input);
        assert_eq!(camera.zoom(), controls.max_zoom);

        let input = InputSnapshot::empty().with_zoom_delta_steps(-1000);
        controls.apply(&mut camera, &input);
        assert_eq!(camera.zoom(), controls.min_zoom);
    }

    #[test]
    fn held_pan_and_rotate_apply_each_tick() {
        let controls = CameraControls::default();
        let mut camera = Camera::new(200.0, 200.0);
        let input = InputSnapshot::empty()
            .with_action_down(InputAction::PanRight, true)
            .with_action_down(InputAction::PanUp, true)
            .with_action_down(InputAction::RotateRight, true);

        controls.apply(&mut camera, &input);
        controls.apply(&mut camera, &input);

        assert_eq!(
            camera.position(),
            Position::new(2.0 * controls.pan_speed, -2.0 * controls.pan_speed)
        );
        assert_eq!(camera.rotation(), 2.0 * controls.rotate_step_degrees);
    }

    #[test]
    fn reset_wins_over_other_input() {
        let controls = CameraControls::default();
        let mut camera = Camera::new(200.0, 200.0);
        camera.zoom_in_by(10.0);
        camera.rotate_left_by(30.0);
        let input = InputSnapshot::empty()
            .with_action_down(InputAction::PanLeft, true)
            .with_reset_camera_pressed(true);

        controls.apply(&mut camera, &input);
        assert_eq!(camera, Camera::new(200.0, 200.0));
    }

    #[test]
    fn pointer_uses_cursor_mode() {
        let input = InputSnapshot::empty().with_cursor_position_px(Some(Position::new(3.0, 4.0)));
        assert_eq!(
            input.pointer().active_screen_position(),
            Some(Position::new(3.0, 4.0))
        );
        assert_eq!(InputSnapshot::empty().pointer().active_screen_position(), None);
    }
}

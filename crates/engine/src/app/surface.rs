use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use winit::window::Window;

use crate::canvas::Canvas;
use crate::position::Position;

use super::session::WorldContext;

const CLEAR_COLOR: [u8; 4] = [16, 18, 24, 255];

/// Pixel buffer of fixed world size, stretched onto the window surface.
pub struct FrameSurface {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    buffer_width: u32,
    buffer_height: u32,
}

impl FrameSurface {
    pub fn new(window: Arc<Window>, buffer_width: u32, buffer_height: u32) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(
            Arc::clone(&window),
            size.width,
            size.height,
            buffer_width,
            buffer_height,
        )?;
        Ok(Self {
            window,
            pixels,
            buffer_width,
            buffer_height,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(
            Arc::clone(&self.window),
            width,
            height,
            self.buffer_width,
            self.buffer_height,
        )?;
        Ok(())
    }

    fn build_pixels(
        window: Arc<Window>,
        surface_width: u32,
        surface_height: u32,
        buffer_width: u32,
        buffer_height: u32,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(surface_width, surface_height, window);
        Pixels::new(buffer_width.max(1), buffer_height.max(1), surface)
    }

    /// Physical window position to buffer pixels. `None` outside the buffer.
    pub fn window_to_buffer(&self, x: f64, y: f64) -> Option<Position> {
        self.pixels
            .window_pos_to_pixel((x as f32, y as f32))
            .ok()
            .map(|(px, py)| Position::new(px as f64, py as f64))
    }

    pub(crate) fn render(&mut self, ctx: &WorldContext) -> Result<(), Error> {
        {
            let frame = self.pixels.frame_mut();
            let mut canvas = Canvas::new(frame, self.buffer_width, self.buffer_height);
            canvas.clear(CLEAR_COLOR);
            ctx.draw(&mut canvas);
        }
        self.pixels.render()
    }
}

use thiserror::Error;

use crate::geom::Affine2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rgba buffer for {width}x{height} image holds {actual} bytes, expected {expected}")]
pub struct ImageSizeError {
    pub width: u32,
    pub height: u32,
    pub expected: usize,
    pub actual: usize,
}

/// Owned RGBA8 image, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl Image {
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, ImageSizeError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(ImageSizeError {
                width,
                height,
                expected,
                actual: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            rgba.extend_from_slice(&color);
        }
        Self {
            width,
            height,
            rgba,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let mut out = [0; 4];
        out.copy_from_slice(&self.rgba[offset..offset + 4]);
        Some(out)
    }

    /// Copies a rectangle out of the image. Returns `None` when the rectangle
    /// is empty or does not fit.
    pub fn sub_image(&self, x: u32, y: u32, width: u32, height: u32) -> Option<Image> {
        if width == 0 || height == 0 {
            return None;
        }
        if x.checked_add(width)? > self.width || y.checked_add(height)? > self.height {
            return None;
        }
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        for row in y..y + height {
            let start = (row as usize * self.width as usize + x as usize) * 4;
            rgba.extend_from_slice(&self.rgba[start..start + width as usize * 4]);
        }
        Some(Image {
            width,
            height,
            rgba,
        })
    }
}

/// Per-channel `value * scale + offset` on normalized colors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorTransform {
    pub scale: [f32; 4],
    pub offset: [f32; 4],
}

impl Default for ColorTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ColorTransform {
    pub const IDENTITY: ColorTransform = ColorTransform {
        scale: [1.0; 4],
        offset: [0.0; 4],
    };

    /// Multiplies every channel by `color / 255`.
    pub fn scale_with_color(color: [u8; 4]) -> Self {
        Self {
            scale: color.map(|channel| channel as f32 / 255.0),
            offset: [0.0; 4],
        }
    }

    pub fn translate(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self {
            scale: [1.0; 4],
            offset: [r, g, b, a],
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn apply(&self, color: [u8; 4]) -> [u8; 4] {
        if self.is_identity() {
            return color;
        }
        let mut out = [0; 4];
        for channel in 0..4 {
            let normalized = color[channel] as f32 / 255.0;
            let value = (normalized * self.scale[channel] + self.offset[channel]).clamp(0.0, 1.0);
            out[channel] = (value * 255.0).round() as u8;
        }
        out
    }
}

/// Borrowed RGBA8 frame that images are composited onto.
pub struct Canvas<'a> {
    frame: &'a mut [u8],
    width: u32,
    height: u32,
}

impl<'a> Canvas<'a> {
    /// Wraps `frame`. Writes outside of `frame` are dropped, so a short buffer
    /// never panics.
    pub fn new(frame: &'a mut [u8], width: u32, height: u32) -> Self {
        Self {
            frame,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn clear(&mut self, color: [u8; 4]) {
        for chunk in self.frame.chunks_exact_mut(4) {
            chunk.copy_from_slice(&color);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = pixel_byte_offset(self.width as usize, x as usize, y as usize)?;
        let bytes = self.frame.get(offset..offset + 4)?;
        let mut out = [0; 4];
        out.copy_from_slice(bytes);
        Some(out)
    }

    /// Draws `image` mapped through `transform` (image space to canvas space).
    pub fn draw_image(&mut self, image: &Image, transform: &Affine2, color: ColorTransform) {
        if image.width == 0 || image.height == 0 || self.width == 0 || self.height == 0 {
            return;
        }
        let Some(inverse) = transform.inverted() else {
            return;
        };

        let (w, h) = (image.width as f64, image.height as f64);
        let corners = [
            transform.apply(0.0, 0.0),
            transform.apply(w, 0.0),
            transform.apply(0.0, h),
            transform.apply(w, h),
        ];
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return;
        }

        let left = min_x.floor().max(0.0) as i64;
        let top = min_y.floor().max(0.0) as i64;
        let right = max_x.ceil().min(self.width as f64) as i64;
        let bottom = max_y.ceil().min(self.height as f64) as i64;
        if left >= right || top >= bottom {
            return;
        }

        for out_y in top..bottom {
            for out_x in left..right {
                let (sx, sy) = inverse.apply(out_x as f64 + 0.5, out_y as f64 + 0.5);
                if sx < 0.0 || sy < 0.0 || sx >= w || sy >= h {
                    continue;
                }
                let Some(source) = image.pixel(sx as u32, sy as u32) else {
                    continue;
                };
                if source[3] == 0 {
                    continue;
                }
                self.blend_pixel(out_x as usize, out_y as usize, color.apply(source));
            }
        }
    }

    fn blend_pixel(&mut self, x: usize, y: usize, source: [u8; 4]) {
        let Some(offset) = pixel_byte_offset(self.width as usize, x, y) else {
            return;
        };
        let Some(target) = self.frame.get_mut(offset..offset + 4) else {
            return;
        };
        let alpha = source[3] as u32;
        if alpha == 255 {
            target.copy_from_slice(&source);
            return;
        }
        let inverse = 255 - alpha;
        for channel in 0..3 {
            target[channel] =
                ((source[channel] as u32 * alpha + target[channel] as u32 * inverse + 127) / 255)
                    as u8;
        }
        target[3] = (alpha + (target[3] as u32 * inverse + 127) / 255).min(255) as u8;
    }
}

fn pixel_byte_offset(width: usize, x: usize, y: usize) -> Option<usize> {
    y.checked_mul(width)?.checked_add(x)?.checked_mul(4)
}

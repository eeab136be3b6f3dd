use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use iso_engine::{Direction, DirectionSprites, Image, SpriteError, SpriteLookup, SpriteSet};
use tracing::debug;

pub(crate) const PLAYER_SPRITE: &str = "player";
pub(crate) const REMOTE_SPRITE: &str = "remote";

const UNIT_WIDTH: u32 = 24;
const UNIT_HEIGHT: u32 = 40;
const WALK_FRAMES: usize = 4;

/// Isometric diamond filling a `width` x `height` image; outside is clear.
pub(crate) fn diamond_image(width: u32, height: u32, fill: [u8; 4], edge: [u8; 4]) -> Image {
    let half_w = width as f64 / 2.0;
    let half_h = height as f64 / 2.0;
    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    for y in 0..height {
        for x in 0..width {
            let dx = (x as f64 + 0.5 - half_w).abs() / half_w;
            let dy = (y as f64 + 0.5 - half_h).abs() / half_h;
            let distance = dx + dy;
            if distance > 1.0 {
                continue;
            }
            let color = if distance > 0.92 { edge } else { fill };
            let offset = (y as usize * width as usize + x as usize) * 4;
            rgba[offset..offset + 4].copy_from_slice(&color);
        }
    }
    Image::from_rgba(width, height, rgba).unwrap_or_else(|_| Image::filled(width, height, fill))
}

/// Raised block: a diamond top, flat sides, and the lower half of a base
/// diamond.
pub(crate) fn block_image(width: u32, top_height: u32, body_height: u32, color: [u8; 4]) -> Image {
    let height = top_height + body_height;
    let top = diamond_image(width, top_height, color, shade(color, 0.8));
    let side = shade(color, 0.55);
    let base = diamond_image(width, top_height, side, shade(color, 0.45));
    let side_rows = top_height / 2..top_height / 2 + body_height;
    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    for y in 0..height {
        for x in 0..width {
            let pixel = match top.pixel(x, y) {
                Some(pixel) if pixel[3] > 0 => pixel,
                _ if side_rows.contains(&y) => side,
                _ => y
                    .checked_sub(body_height)
                    .and_then(|base_y| base.pixel(x, base_y))
                    .unwrap_or([0; 4]),
            };
            let offset = (y as usize * width as usize + x as usize) * 4;
            rgba[offset..offset + 4].copy_from_slice(&pixel);
        }
    }
    Image::from_rgba(width, height, rgba).unwrap_or_else(|_| Image::filled(width, height, color))
}

fn shade(color: [u8; 4], factor: f32) -> [u8; 4] {
    let scale = |channel: u8| (channel as f32 * factor).round().clamp(0.0, 255.0) as u8;
    [scale(color[0]), scale(color[1]), scale(color[2]), color[3]]
}

/// One walking figure. A lighter band marks the facing and bobs with `step`.
fn figure_image(body: [u8; 4], direction: Direction, step: Option<usize>) -> Image {
    let mut rgba = vec![0u8; (UNIT_WIDTH * UNIT_HEIGHT * 4) as usize];
    let bob = step.map_or(0, |step| (step % 2) as u32);
    let facing_x = match direction {
        Direction::Right | Direction::UpRight | Direction::DownRight => UNIT_WIDTH * 2 / 3,
        Direction::Left | Direction::UpLeft | Direction::DownLeft => UNIT_WIDTH / 6,
        Direction::Up | Direction::Down => UNIT_WIDTH / 3,
    };
    let highlight = shade(body, 1.4);
    for y in bob..UNIT_HEIGHT {
        for x in 2..UNIT_WIDTH - 2 {
            let is_head = y < bob + 12;
            if is_head && !(6..UNIT_WIDTH - 6).contains(&x) {
                continue;
            }
            let is_legs = y >= UNIT_HEIGHT - 8;
            if let (true, Some(step)) = (is_legs, step) {
                let gap = UNIT_WIDTH / 2;
                let swing = if step % 2 == 0 { 2 } else { 0 };
                if (gap - 1 - swing..gap + 1 + swing).contains(&x) {
                    continue;
                }
            }
            let color = if !is_head && (facing_x..facing_x + 6).contains(&x) {
                highlight
            } else {
                body
            };
            let offset = ((y * UNIT_WIDTH + x) * 4) as usize;
            rgba[offset..offset + 4].copy_from_slice(&color);
        }
    }
    Image::from_rgba(UNIT_WIDTH, UNIT_HEIGHT, rgba)
        .unwrap_or_else(|_| Image::filled(UNIT_WIDTH, UNIT_HEIGHT, body))
}

fn figure_set(name: &str, body: [u8; 4]) -> Result<SpriteSet, SpriteError> {
    let directions = Direction::ALL
        .into_iter()
        .map(|direction| {
            let frames = (0..WALK_FRAMES)
                .map(|step| Arc::new(figure_image(body, direction, Some(step))))
                .collect();
            let sprites = DirectionSprites {
                frames,
                rotation: Arc::new(figure_image(body, direction, None)),
            };
            (direction.as_str().to_string(), sprites)
        })
        .collect::<HashMap<_, _>>();
    SpriteSet::new(name, directions)
}

/// Sprite sets drawn in code, used when no `assets/movables` directory is
/// available.
#[derive(Debug, Default)]
pub(crate) struct GeneratedSpriteLookup {
    cache: RwLock<HashMap<String, Arc<SpriteSet>>>,
}

impl SpriteLookup for GeneratedSpriteLookup {
    fn lookup(&self, name: &str) -> Result<Arc<SpriteSet>, SpriteError> {
        if let Some(set) = self
            .cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
        {
            return Ok(Arc::clone(set));
        }

        let body = match name {
            PLAYER_SPRITE => [70, 130, 220, 255],
            REMOTE_SPRITE => [220, 140, 60, 255],
            _ => {
                return Err(SpriteError::NoDirections {
                    name: name.to_string(),
                })
            }
        };
        let set = Arc::new(figure_set(name, body)?);
        debug!(sprite = name, "sprite_set_generated");
        let mut cache = self
            .cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(Arc::clone(cache.entry(name.to_string()).or_insert(set)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diamond_corners_are_transparent() {
        let image = diamond_image(64, 32, [10, 200, 10, 255], [0, 0, 0, 255]);
        assert_eq!(image.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(image.pixel(63, 31), Some([0, 0, 0, 0]));
        assert_eq!(image.pixel(32, 16), Some([10, 200, 10, 255]));
    }

    #[test]
    fn block_is_taller_than_its_top() {
        let image = block_image(64, 32, 24, [120, 120, 120, 255]);
        assert_eq!(image.height(), 56);
        assert_eq!(image.pixel(32, 40).map(|pixel| pixel[3]), Some(255));
    }

    #[test]
    fn generated_sets_cover_every_direction() {
        let lookup = GeneratedSpriteLookup::default();
        let set = lookup.lookup(PLAYER_SPRITE).expect("player set");
        for direction in Direction::ALL {
            let sprites = set.direction(direction.as_str()).expect("direction");
            assert_eq!(sprites.frames.len(), WALK_FRAMES);
        }

        let again = lookup.lookup(PLAYER_SPRITE).expect("cached");
        assert!(Arc::ptr_eq(&set, &again));
    }

    #[test]
    fn unknown_sprite_is_an_error() {
        let lookup = GeneratedSpriteLookup::default();
        assert!(matches!(
            lookup.lookup("dragon"),
            Err(SpriteError::NoDirections { .. })
        ));
    }
}

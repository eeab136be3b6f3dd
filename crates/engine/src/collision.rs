use std::sync::{Mutex, MutexGuard};

use crate::position::Position;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollidableTile {
    pub position: Position,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl CollidableTile {
    /// Bounding-box check, then the inscribed isometric diamond.
    pub fn contains(&self, point: Position) -> bool {
        let width = self.tile_width as f64;
        let height = self.tile_height as f64;
        if point.x < self.position.x
            || point.x > self.position.x + width
            || point.y < self.position.y
            || point.y > self.position.y + height
        {
            return false;
        }

        let half_w = width / 2.0;
        let half_h = height / 2.0;
        let dx = (point.x - (self.position.x + half_w)).abs();
        let dy = (point.y - (self.position.y + half_h)).abs();
        dx * half_h + dy * half_w <= half_w * half_h
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct MainTrackable {
    position: Position,
    shift_width: f64,
    shift_height: f64,
}

impl MainTrackable {
    fn center_at(&self, position: Position) -> Position {
        Position::new(
            position.x + self.shift_width / 2.0,
            position.y + self.shift_height / 2.0,
        )
    }
}

/// Blocks the local player from entering collidable tiles.
#[derive(Debug, Default)]
pub struct Collision {
    tiles: Mutex<Vec<CollidableTile>>,
    main: Mutex<MainTrackable>,
}

impl Collision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_main_trackable_object(&self, position: Position, shift_width: f64, shift_height: f64) {
        *self.lock_main() = MainTrackable {
            position,
            shift_width,
            shift_height,
        };
    }

    pub fn add_collidable_tile_object(&self, tile: CollidableTile) {
        self.lock_tiles().push(tile);
    }

    pub fn collidable_len(&self) -> usize {
        self.lock_tiles().len()
    }

    pub fn is_colliding(&self) -> bool {
        let main = *self.lock_main();
        self.is_colliding_at(main.position)
    }

    /// Tests the main trackable as if it stood at `position`, keeping its
    /// current shift size. Used to reject a move before applying it.
    pub fn is_colliding_at(&self, position: Position) -> bool {
        let center = self.lock_main().center_at(position);
        self.lock_tiles().iter().any(|tile| tile.contains(center))
    }

    pub fn clean(&self) {
        self.lock_tiles().clear();
    }

    fn lock_tiles(&self) -> MutexGuard<'_, Vec<CollidableTile>> {
        self.tiles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_main(&self) -> MutexGuard<'_, MainTrackable> {
        self.main
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

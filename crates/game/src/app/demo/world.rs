use std::sync::Arc;

use iso_engine::{
    map_tile_position, Image, MapError, MapLayerTiles, PlacedTile, Position, TileProperties,
};

use super::art::{block_image, diamond_image};

pub(crate) const GROUND_LAYER: &str = "background";
pub(crate) const WALL_LAYER: &str = "walls";

const GROUND_LIGHT: [u8; 4] = [76, 120, 72, 255];
const GROUND_DARK: [u8; 4] = [64, 104, 62, 255];
const GROUND_EDGE: [u8; 4] = [52, 84, 50, 255];
const WALL_COLOR: [u8; 4] = [150, 146, 138, 255];
const WALL_BODY_HEIGHT: u32 = 24;

/// Square arena: a checkered ground layer, a wall ring, and a few pillars.
/// Every interior ground cell is a spawn point.
#[derive(Debug, Clone)]
pub(crate) struct GeneratedMap {
    size: u32,
    tile_width: u32,
    tile_height: u32,
    pillars: Vec<(u32, u32)>,
    ground: [Arc<Image>; 2],
    wall: Arc<Image>,
}

impl GeneratedMap {
    pub(crate) fn new(size: u32, tile_width: u32, tile_height: u32) -> Self {
        let size = size.max(3);
        let quarter = size / 4;
        let pillars = vec![
            (quarter, quarter),
            (size - 1 - quarter, quarter),
            (quarter, size - 1 - quarter),
            (size - 1 - quarter, size - 1 - quarter),
        ];
        Self {
            size,
            tile_width,
            tile_height,
            pillars,
            ground: [
                Arc::new(diamond_image(tile_width, tile_height, GROUND_LIGHT, GROUND_EDGE)),
                Arc::new(diamond_image(tile_width, tile_height, GROUND_DARK, GROUND_EDGE)),
            ],
            wall: Arc::new(block_image(tile_width, tile_height, WALL_BODY_HEIGHT, WALL_COLOR)),
        }
    }

    pub(crate) fn size(&self) -> u32 {
        self.size
    }

    fn is_wall(&self, x: u32, y: u32) -> bool {
        x == 0 || y == 0 || x == self.size - 1 || y == self.size - 1 || self.pillars.contains(&(x, y))
    }

    /// Anchor of the middle cell.
    pub(crate) fn center(&self) -> Position {
        let middle = self.size / 2;
        map_tile_position(middle, middle, self.tile_width, self.tile_height)
    }

    fn placed(&self, x: u32, y: u32, image: &Arc<Image>, properties: TileProperties) -> PlacedTile {
        PlacedTile {
            grid_x: x,
            grid_y: y,
            position: map_tile_position(x, y, self.tile_width, self.tile_height),
            image: Arc::clone(image),
            properties,
        }
    }
}

impl MapLayerTiles for GeneratedMap {
    fn tile_size(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }

    fn layer_names(&self) -> Vec<String> {
        vec![GROUND_LAYER.to_string(), WALL_LAYER.to_string()]
    }

    fn layer_tiles(&self, layer: &str) -> Result<Vec<PlacedTile>, MapError> {
        let cells = (0..self.size).flat_map(|y| (0..self.size).map(move |x| (x, y)));
        let tiles = match layer {
            GROUND_LAYER => cells
                .map(|(x, y)| {
                    let properties = TileProperties {
                        collidable: false,
                        spawnable: !self.is_wall(x, y),
                    };
                    self.placed(x, y, &self.ground[((x + y) % 2) as usize], properties)
                })
                .collect(),
            WALL_LAYER => cells
                .filter(|&(x, y)| self.is_wall(x, y))
                .map(|(x, y)| {
                    let properties = TileProperties {
                        collidable: true,
                        spawnable: false,
                    };
                    self.placed(x, y, &self.wall, properties)
                })
                .collect(),
            other => return Err(MapError::UnknownLayer(other.to_string())),
        };
        Ok(tiles)
    }
}

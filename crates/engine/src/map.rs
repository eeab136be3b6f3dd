use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use roxmltree::{Document, Node};
use thiserror::Error;
use tracing::info;

use crate::canvas::Image;
use crate::collision::{CollidableTile, Collision};
use crate::position::Position;
use crate::render::{RenderRegistry, TileObject};
use crate::selector::Selector;
use crate::sprite::{decode_png, SpriteError};

const GID_FLAG_MASK: u32 = 0x0FFF_FFFF;
const COLLIDABLE_PROPERTY: &str = "collidable";
const SPAWNABLE_PROPERTY: &str = "spawnable";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to read map file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed map XML in {path} at {}:{}: {message}", .location.line, .location.column)]
    XmlMalformed {
        path: PathBuf,
        location: SourceLocation,
        message: String,
    },
    #[error("invalid map {path} at {}:{}: {message}", .location.line, .location.column)]
    Invalid {
        path: PathBuf,
        location: SourceLocation,
        message: String,
    },
    #[error("layer '{layer}' holds {actual} tiles, expected {expected}")]
    TileCountMismatch {
        layer: String,
        expected: usize,
        actual: usize,
    },
    #[error("gid {gid} in layer '{layer}' matches no tileset")]
    UnknownTileset { layer: String, gid: u32 },
    #[error("map has no layer named '{0}'")]
    UnknownLayer(String),
    #[error("failed to load tileset image: {0}")]
    TilesetImage(#[from] SpriteError),
}

/// Per-tile flags read from tileset `<properties>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileProperties {
    pub collidable: bool,
    pub spawnable: bool,
}

#[derive(Debug, Clone)]
pub struct PlacedTile {
    pub grid_x: u32,
    pub grid_y: u32,
    pub position: Position,
    pub image: Arc<Image>,
    pub properties: TileProperties,
}

/// Map-loader output consumed by the engine.
pub trait MapLayerTiles {
    fn tile_size(&self) -> (u32, u32);
    fn layer_names(&self) -> Vec<String>;
    /// Non-empty cells of `layer` in row-major order.
    fn layer_tiles(&self, layer: &str) -> Result<Vec<PlacedTile>, MapError>;
}

/// Screen-space anchor of grid cell `(x, y)` on an isometric map.
pub fn map_tile_position(x: u32, y: u32, tile_width: u32, tile_height: u32) -> Position {
    let (x, y) = (x as i64, y as i64);
    Position::new(
        ((x - y) * (tile_width / 2) as i64) as f64,
        ((x + y) * (tile_height / 2) as i64) as f64,
    )
}

#[derive(Debug, Clone)]
struct Tileset {
    first_gid: u32,
    tiles: Vec<Arc<Image>>,
    properties: HashMap<u32, TileProperties>,
}

impl Tileset {
    fn local_id(&self, gid: u32) -> Option<u32> {
        let local = gid.checked_sub(self.first_gid)?;
        ((local as usize) < self.tiles.len()).then_some(local)
    }
}

#[derive(Debug, Clone)]
struct MapLayer {
    name: String,
    gids: Vec<u32>,
}

/// A Tiled TMX map with CSV layers and image-based tilesets.
#[derive(Debug, Clone)]
pub struct TileMap {
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    tilesets: Vec<Tileset>,
    layers: Vec<MapLayer>,
}

impl TileMap {
    pub fn load(path: &Path) -> Result<Self, MapError> {
        let raw = fs::read_to_string(path).map_err(|source| MapError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let map = Self::parse(&raw, path)?;
        info!(
            path = %path.display(),
            width = map.width,
            height = map.height,
            layers = map.layers.len(),
            tilesets = map.tilesets.len(),
            "map_loaded"
        );
        Ok(map)
    }

    /// Parses TMX text. Tileset sources resolve against `path`'s directory.
    pub fn parse(raw: &str, path: &Path) -> Result<Self, MapError> {
        let doc = Document::parse(raw).map_err(|error| MapError::XmlMalformed {
            path: path.to_path_buf(),
            location: SourceLocation {
                line: error.pos().row as usize,
                column: error.pos().col as usize,
            },
            message: error.to_string(),
        })?;
        let ctx = ParseContext { path, doc: &doc };
        let root = doc.root_element();
        if root.tag_name().name() != "map" {
            return Err(ctx.invalid(root, "root element must be <map>"));
        }

        let width = ctx.required_u32(root, "width")?;
        let height = ctx.required_u32(root, "height")?;
        let tile_width = ctx.required_u32(root, "tilewidth")?;
        let tile_height = ctx.required_u32(root, "tileheight")?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let mut tilesets = Vec::new();
        let mut layers = Vec::new();
        for child in root.children().filter(|node| node.is_element()) {
            match child.tag_name().name() {
                "tileset" => tilesets.push(parse_tileset(&ctx, child, base_dir)?),
                "layer" => layers.push(parse_layer(&ctx, child)?),
                _ => {}
            }
        }
        tilesets.sort_by_key(|tileset| tileset.first_gid);

        Ok(Self {
            width,
            height,
            tile_width,
            tile_height,
            tilesets,
            layers,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn tileset_for(&self, gid: u32) -> Option<&Tileset> {
        self.tilesets
            .iter()
            .rev()
            .find(|tileset| tileset.first_gid <= gid)
    }
}

impl MapLayerTiles for TileMap {
    fn tile_size(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }

    fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|layer| layer.name.clone()).collect()
    }

    fn layer_tiles(&self, name: &str) -> Result<Vec<PlacedTile>, MapError> {
        let layer = self
            .layers
            .iter()
            .find(|layer| layer.name == name)
            .ok_or_else(|| MapError::UnknownLayer(name.to_string()))?;
        let expected = self.width as usize * self.height as usize;
        if layer.gids.len() != expected {
            return Err(MapError::TileCountMismatch {
                layer: layer.name.clone(),
                expected,
                actual: layer.gids.len(),
            });
        }

        let mut placed = Vec::new();
        for (index, raw_gid) in layer.gids.iter().enumerate() {
            let gid = raw_gid & GID_FLAG_MASK;
            if gid == 0 {
                continue;
            }
            let unknown = || MapError::UnknownTileset {
                layer: layer.name.clone(),
                gid,
            };
            let tileset = self.tileset_for(gid).ok_or_else(unknown)?;
            let local = tileset.local_id(gid).ok_or_else(unknown)?;
            let grid_x = (index % self.width as usize) as u32;
            let grid_y = (index / self.width as usize) as u32;
            placed.push(PlacedTile {
                grid_x,
                grid_y,
                position: map_tile_position(grid_x, grid_y, self.tile_width, self.tile_height),
                image: Arc::clone(&tileset.tiles[local as usize]),
                properties: tileset.properties.get(&local).copied().unwrap_or_default(),
            });
        }
        Ok(placed)
    }
}

struct ParseContext<'a, 'input> {
    path: &'a Path,
    doc: &'a Document<'input>,
}

impl ParseContext<'_, '_> {
    fn invalid(&self, node: Node<'_, '_>, message: impl Into<String>) -> MapError {
        let pos = self.doc.text_pos_at(node.range().start);
        MapError::Invalid {
            path: self.path.to_path_buf(),
            location: SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            },
            message: message.into(),
        }
    }

    fn required_attr<'n>(&self, node: Node<'n, '_>, name: &str) -> Result<&'n str, MapError> {
        node.attribute(name).ok_or_else(|| {
            self.invalid(
                node,
                format!("<{}> is missing attribute '{name}'", node.tag_name().name()),
            )
        })
    }

    fn required_u32(&self, node: Node<'_, '_>, name: &str) -> Result<u32, MapError> {
        let value = self.required_attr(node, name)?;
        self.parse_u32(node, name, value)
    }

    fn optional_u32(&self, node: Node<'_, '_>, name: &str, default: u32) -> Result<u32, MapError> {
        match node.attribute(name) {
            Some(value) => self.parse_u32(node, name, value),
            None => Ok(default),
        }
    }

    fn parse_u32(&self, node: Node<'_, '_>, name: &str, value: &str) -> Result<u32, MapError> {
        value.trim().parse::<u32>().map_err(|_| {
            self.invalid(
                node,
                format!("attribute '{name}' value '{value}' is not a non-negative integer"),
            )
        })
    }
}

fn parse_tileset(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
    base_dir: &Path,
) -> Result<Tileset, MapError> {
    let first_gid = ctx.required_u32(node, "firstgid")?;
    if node.attribute("source").is_some() {
        return Err(ctx.invalid(node, "external tilesets are not supported; embed the tileset"));
    }
    let tile_width = ctx.required_u32(node, "tilewidth")?;
    let tile_height = ctx.required_u32(node, "tileheight")?;
    if tile_width == 0 || tile_height == 0 {
        return Err(ctx.invalid(node, "tileset tile size must be non-zero"));
    }
    let spacing = ctx.optional_u32(node, "spacing", 0)?;
    let margin = ctx.optional_u32(node, "margin", 0)?;

    let image_node = node
        .children()
        .find(|child| child.has_tag_name("image"))
        .ok_or_else(|| ctx.invalid(node, "tileset has no <image>"))?;
    let source = ctx.required_attr(image_node, "source")?;
    let sheet = decode_png(&base_dir.join(source))?;

    let overflow = || ctx.invalid(node, "tileset dimensions overflow");
    let stride_x = tile_width.checked_add(spacing).ok_or_else(overflow)?;
    let stride_y = tile_height.checked_add(spacing).ok_or_else(overflow)?;
    let fit_columns = sheet
        .width()
        .saturating_sub(margin)
        .checked_add(spacing)
        .ok_or_else(overflow)?
        / stride_x;
    let fit_rows = sheet
        .height()
        .saturating_sub(margin)
        .checked_add(spacing)
        .ok_or_else(overflow)?
        / stride_y;
    let columns = match ctx.optional_u32(node, "columns", 0)? {
        0 => fit_columns,
        columns if columns > fit_columns => {
            return Err(ctx.invalid(
                node,
                format!("tileset declares {columns} columns but the image fits {fit_columns}"),
            ))
        }
        columns => columns,
    };
    let capacity = columns.checked_mul(fit_rows).ok_or_else(overflow)?;
    let tile_count = match ctx.optional_u32(node, "tilecount", 0)? {
        0 => capacity,
        count if count > capacity => {
            return Err(ctx.invalid(
                node,
                format!("tileset declares {count} tiles but the image holds {capacity}"),
            ))
        }
        count => count,
    };
    if columns == 0 && tile_count > 0 {
        return Err(ctx.invalid(node, "tileset image is narrower than one tile"));
    }

    let mut tiles = Vec::with_capacity(tile_count as usize);
    for id in 0..tile_count {
        let x = (id % columns)
            .checked_mul(stride_x)
            .and_then(|offset| offset.checked_add(margin));
        let y = (id / columns)
            .checked_mul(stride_y)
            .and_then(|offset| offset.checked_add(margin));
        let tile = x
            .zip(y)
            .and_then(|(x, y)| sheet.sub_image(x, y, tile_width, tile_height))
            .ok_or_else(|| ctx.invalid(node, format!("tile {id} lies outside the tileset image")))?;
        tiles.push(Arc::new(tile));
    }

    let mut properties = HashMap::new();
    for tile in node.children().filter(|child| child.has_tag_name("tile")) {
        let id = ctx.required_u32(tile, "id")?;
        let mut flags = TileProperties::default();
        for property in tile
            .descendants()
            .filter(|child| child.has_tag_name("property"))
        {
            let enabled = property.attribute("value") == Some("true");
            match property.attribute("name") {
                Some(COLLIDABLE_PROPERTY) => flags.collidable = enabled,
                Some(SPAWNABLE_PROPERTY) => flags.spawnable = enabled,
                _ => {}
            }
        }
        properties.insert(id, flags);
    }

    Ok(Tileset {
        first_gid,
        tiles,
        properties,
    })
}

fn parse_layer(ctx: &ParseContext<'_, '_>, node: Node<'_, '_>) -> Result<MapLayer, MapError> {
    let name = ctx.required_attr(node, "name")?.to_string();
    let data = node
        .children()
        .find(|child| child.has_tag_name("data"))
        .ok_or_else(|| ctx.invalid(node, format!("layer '{name}' has no <data>")))?;
    if data.attribute("encoding") != Some("csv") {
        return Err(ctx.invalid(data, format!("layer '{name}' must use csv encoding")));
    }

    let text = data.text().unwrap_or_default();
    let mut gids = Vec::new();
    for cell in text.split(',').map(str::trim).filter(|cell| !cell.is_empty()) {
        let gid = cell
            .parse::<u32>()
            .map_err(|_| ctx.invalid(data, format!("layer '{name}' has invalid gid '{cell}'")))?;
        gids.push(gid);
    }
    Ok(MapLayer { name, gids })
}

/// Which map layers go to the background tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapLayerRoles {
    pub background_layer: String,
}

impl Default for MapLayerRoles {
    fn default() -> Self {
        Self {
            background_layer: "background".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapLoadSummary {
    pub tertiary_tiles: usize,
    pub secondary_tiles: usize,
    pub collidable_tiles: usize,
    pub spawn_points: Vec<Position>,
}

pub fn tile_object_name(layer: &str, grid_x: u32, grid_y: u32) -> String {
    format!("{layer}:{grid_x}:{grid_y}")
}

/// Registers every placed tile with the renderer tiers, the selector and the
/// collision set. Already registered names are left alone.
pub fn load_map_into(
    map: &dyn MapLayerTiles,
    roles: &MapLayerRoles,
    registry: &RenderRegistry,
    selector: &Selector,
    collision: &Collision,
) -> Result<MapLoadSummary, MapError> {
    let (tile_width, tile_height) = map.tile_size();
    let mut summary = MapLoadSummary::default();

    for layer in map.layer_names() {
        let is_background = layer == roles.background_layer;
        for tile in map.layer_tiles(&layer)? {
            let name = tile_object_name(&layer, tile.grid_x, tile.grid_y);
            let object = TileObject::new(tile.position, Arc::clone(&tile.image));
            if is_background {
                if !registry.tertiary_tile_object_exists(&name) {
                    registry.add_tertiary_tile_object(&name, object);
                    summary.tertiary_tiles += 1;
                }
            } else if !registry.secondary_tile_object_exists(&name) {
                registry.add_secondary_tile_object(&name, object);
                summary.secondary_tiles += 1;
            }

            if !selector.tile_object_exists(&name) {
                selector.add_tile_object(&name, tile.position, tile_width, tile_height);
            }
            if tile.properties.collidable {
                collision.add_collidable_tile_object(CollidableTile {
                    position: tile.position,
                    tile_width,
                    tile_height,
                });
                summary.collidable_tiles += 1;
            }
            if tile.properties.spawnable {
                summary.spawn_points.push(tile.position);
            }
        }
    }

    info!(
        tertiary = summary.tertiary_tiles,
        secondary = summary.secondary_tiles,
        collidable = summary.collidable_tiles,
        spawn_points = summary.spawn_points.len(),
        "map_registered"
    );
    Ok(summary)
}

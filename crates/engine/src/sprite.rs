use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use image::ImageReader;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::canvas::Image;

const MOVABLES_DIR: &str = "movables";
const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpriteError {
    #[error("sprite name must not be empty")]
    EmptyName,
    #[error("sprite name must not start with '/'")]
    LeadingSlash,
    #[error("sprite name must not contain '..'")]
    ParentTraversal,
    #[error("sprite name contains invalid character '{character}'")]
    InvalidCharacter { character: char },
    #[error("sprite set '{name}' has no directions")]
    NoDirections { name: String },
    #[error("sprite set '{name}' direction '{direction}' has no frames")]
    EmptyFrames { name: String, direction: String },
    #[error("sprite set '{name}' direction '{direction}' has no rotation image")]
    MissingRotation { name: String, direction: String },
    #[error("sprite set '{name}' has no direction '{direction}'")]
    UnknownDirection { name: String, direction: String },
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("failed to parse sprite metadata {path}: {reason}")]
    Metadata { path: PathBuf, reason: String },
    #[error("failed to decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
}

/// Frames and the idle "rotation" image for one facing.
#[derive(Debug, Clone)]
pub struct DirectionSprites {
    pub frames: Vec<Arc<Image>>,
    pub rotation: Arc<Image>,
}

/// All facings of one named sprite, validated so that every direction has at
/// least one frame.
#[derive(Debug, Clone)]
pub struct SpriteSet {
    name: String,
    directions: HashMap<String, DirectionSprites>,
}

impl SpriteSet {
    pub fn new(
        name: impl Into<String>,
        directions: HashMap<String, DirectionSprites>,
    ) -> Result<Self, SpriteError> {
        let name = name.into();
        if directions.is_empty() {
            return Err(SpriteError::NoDirections { name });
        }
        for (direction, sprites) in &directions {
            if sprites.frames.is_empty() {
                return Err(SpriteError::EmptyFrames {
                    name,
                    direction: direction.clone(),
                });
            }
        }
        Ok(Self { name, directions })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self, direction: &str) -> Option<&DirectionSprites> {
        self.directions.get(direction)
    }

    pub fn has_direction(&self, direction: &str) -> bool {
        self.directions.contains_key(direction)
    }

    pub fn direction_names(&self) -> impl Iterator<Item = &str> {
        self.directions.keys().map(String::as_str)
    }
}

/// Resolves a named sprite to its per-direction frames.
pub trait SpriteLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Result<Arc<SpriteSet>, SpriteError>;
}

pub(crate) fn validate_sprite_name(name: &str) -> Result<(), SpriteError> {
    if name.is_empty() {
        return Err(SpriteError::EmptyName);
    }
    if name.starts_with('/') {
        return Err(SpriteError::LeadingSlash);
    }
    if name.contains("..") {
        return Err(SpriteError::ParentTraversal);
    }
    for ch in name.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '_' | '/' | '-') {
            continue;
        }
        return Err(SpriteError::InvalidCharacter { character: ch });
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct MovableMetadata {
    animations: BTreeMap<String, Vec<String>>,
    rotations: BTreeMap<String, String>,
}

/// Loads `<root>/movables/<name>/metadata.json` and the PNGs it lists,
/// caching decoded sets by name.
pub struct DirectorySpriteLookup {
    root: PathBuf,
    cache: RwLock<HashMap<String, Arc<SpriteSet>>>,
}

impl DirectorySpriteLookup {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn load(&self, name: &str) -> Result<SpriteSet, SpriteError> {
        let set_dir = self.root.join(MOVABLES_DIR).join(name);
        let metadata_path = set_dir.join(METADATA_FILE);
        let raw = fs::read_to_string(&metadata_path).map_err(|error| SpriteError::Read {
            path: metadata_path.clone(),
            reason: error.to_string(),
        })?;
        let metadata: MovableMetadata =
            serde_json::from_str(&raw).map_err(|error| SpriteError::Metadata {
                path: metadata_path.clone(),
                reason: error.to_string(),
            })?;

        let mut directions = HashMap::new();
        for (direction, frame_files) in &metadata.animations {
            let rotation_file = metadata.rotations.get(direction).ok_or_else(|| {
                SpriteError::MissingRotation {
                    name: name.to_string(),
                    direction: direction.clone(),
                }
            })?;
            let rotation = Arc::new(decode_png(&set_dir.join(rotation_file))?);
            let frames = frame_files
                .iter()
                .map(|file| decode_png(&set_dir.join(file)).map(Arc::new))
                .collect::<Result<Vec<_>, _>>()?;
            directions.insert(direction.clone(), DirectionSprites { frames, rotation });
        }

        SpriteSet::new(name, directions)
    }
}

impl SpriteLookup for DirectorySpriteLookup {
    fn lookup(&self, name: &str) -> Result<Arc<SpriteSet>, SpriteError> {
        validate_sprite_name(name)?;
        {
            let cache = self
                .cache
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(set) = cache.get(name) {
                return Ok(Arc::clone(set));
            }
        }

        let set = Arc::new(self.load(name)?);
        debug!(sprite = name, "sprite_set_loaded");
        let mut cache = self
            .cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(Arc::clone(
            cache.entry(name.to_string()).or_insert_with(|| set),
        ))
    }
}

pub(crate) fn decode_png(path: &Path) -> Result<Image, SpriteError> {
    let reader = ImageReader::open(path).map_err(|error| SpriteError::Read {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;
    let decoded = reader.decode().map_err(|error| SpriteError::Decode {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;
    let rgba = decoded.to_rgba8();
    let (width, height) = (rgba.width(), rgba.height());
    Image::from_rgba(width, height, rgba.into_raw()).map_err(|error| SpriteError::Decode {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })
}

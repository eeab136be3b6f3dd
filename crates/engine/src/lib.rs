use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod camera;
pub mod canvas;
pub mod collision;
pub mod config;
pub mod geom;
pub mod map;
pub mod position;
pub mod render;
pub mod selector;
pub mod sprite;
pub mod unit;

pub use app::{
    run_app, run_app_with_metrics, AppError, CameraControls, FrameMetrics, FrameSurface,
    InputAction, InputSnapshot, LoopConfig, MetricsHandle, Session, SessionError, WorldContext,
    SLOW_FRAME_ENV_VAR,
};
pub use camera::Camera;
pub use canvas::{Canvas, ColorTransform, Image, ImageSizeError};
pub use collision::{CollidableTile, Collision};
pub use config::{
    ConfigError, EngineConfig, HitFlashConfig, SelectorConfig, CONFIG_ENV_VAR,
    DEFAULT_CONFIG_FILE,
};
pub use geom::{Affine2, ConvexPolygon, Rect};
pub use map::{
    load_map_into, map_tile_position, tile_object_name, MapError, MapLayerRoles, MapLayerTiles,
    MapLoadSummary, PlacedTile, TileMap, TileProperties,
};
pub use position::{
    animation_direction, cartesian_to_isometric, delayed_positions, isometric_to_cartesian,
    DelayedPositions, Direction, Position,
};
pub use render::{
    DepthEntry, DepthIndex, DepthKey, DepthRenderer, DepthTier, RenderObject, RenderObjectKind,
    RenderRegistry, RenderStats, StaticObject, TileObject,
};
pub use selector::{InputMode, PointerState, SelectedKind, SelectedObjectDetails, Selector};
pub use sprite::{DirectionSprites, DirectorySpriteLookup, SpriteError, SpriteLookup, SpriteSet};
pub use unit::{AnimatedUnit, FlashState, UnitConfig};

pub const ROOT_ENV_VAR: &str = "ISO_ENGINE_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub assets_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error(
        "ISO_ENGINE_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
PowerShell: $env:{env_var}=\"C:\\path\\to\\iso-engine\"\n\
Bash/zsh: export {env_var}=\"/path/to/iso-engine\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    let assets_dir = root.join("assets");
    Ok(AppPaths { root, assets_dir })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let raw = PathBuf::from(value);
            let normalized = normalize_path(&raw);
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            for candidate in exe_dir.ancestors() {
                if is_repo_marker(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml() {
        let cwd = env::current_dir().expect("cwd");
        assert!(!is_repo_marker(&cwd.join("definitely_not_a_marker")));
    }

    #[test]
    fn repo_marker_accepts_assets_only_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("Cargo.toml"), "[workspace]\n").expect("cargo toml");
        assert!(!is_repo_marker(dir.path()));

        fs::create_dir(dir.path().join("assets")).expect("assets");
        assert!(is_repo_marker(dir.path()));
    }
}

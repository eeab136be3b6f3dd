use std::path::{Path, PathBuf};
use std::sync::Arc;

use iso_engine::{
    resolve_app_paths, AppError, DirectorySpriteLookup, EngineConfig, LoopConfig, Session,
    SpriteLookup,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::demo::{DemoSession, GeneratedSpriteLookup, MapSource};

const MAP_FILE: &str = "maps/world.tmx";
const MOVABLES_DIR: &str = "movables";

pub(crate) struct AppWiring {
    pub(crate) loop_config: LoopConfig,
    pub(crate) engine_config: EngineConfig,
    pub(crate) session: Box<dyn Session>,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    info!("=== Iso Engine Startup ===");

    let app_paths = resolve_app_paths()?;
    let engine_config = EngineConfig::load(&app_paths.root)?;
    info!(
        root = %app_paths.root.display(),
        assets_dir = %app_paths.assets_dir.display(),
        world_width = engine_config.world_width,
        world_height = engine_config.world_height,
        "startup"
    );

    let sprites = choose_sprites(&app_paths.assets_dir);
    let map_source = choose_map(&app_paths.assets_dir);
    let loop_config = LoopConfig {
        window_width: engine_config.world_width,
        window_height: engine_config.world_height,
        ..LoopConfig::default()
    };

    Ok(AppWiring {
        loop_config,
        engine_config,
        session: Box::new(DemoSession::new(sprites, map_source)),
    })
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn choose_sprites(assets_dir: &Path) -> Arc<dyn SpriteLookup> {
    if assets_dir.join(MOVABLES_DIR).is_dir() {
        info!(source = "directory", "sprite_source");
        Arc::new(DirectorySpriteLookup::new(assets_dir))
    } else {
        info!(source = "generated", "sprite_source");
        Arc::new(GeneratedSpriteLookup::default())
    }
}

fn choose_map(assets_dir: &Path) -> MapSource {
    let tmx: PathBuf = assets_dir.join(MAP_FILE);
    if tmx.is_file() {
        info!(path = %tmx.display(), "map_source");
        MapSource::Tmx(tmx)
    } else {
        info!(source = "generated", "map_source");
        MapSource::Generated
    }
}

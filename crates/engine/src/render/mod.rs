mod depth;
mod objects;
mod registry;

pub use depth::{DepthEntry, DepthIndex, DepthKey, DepthRenderer, DepthTier, RenderStats};
pub use objects::{RenderObject, RenderObjectKind, StaticObject, TileObject};
pub use registry::RenderRegistry;

mod input;
mod loop_runner;
mod metrics;
mod session;
mod surface;

pub use input::{CameraControls, InputAction, InputSnapshot};
pub use loop_runner::{run_app, run_app_with_metrics, AppError, LoopConfig, SLOW_FRAME_ENV_VAR};
pub use metrics::{FrameMetrics, MetricsHandle};
pub use session::{Session, SessionError, WorldContext};
pub use surface::FrameSurface;

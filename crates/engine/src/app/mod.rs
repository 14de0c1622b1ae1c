mod input;
mod loop_runner;
mod metrics;
mod rendering;
mod scene;

pub use input::{InputAction, KeyPress};
pub use loop_runner::{run_app, AppError, LoopConfig, FPS_CAP_ENV_VAR};
pub use metrics::LoopMetricsSnapshot;
pub use rendering::{resolve_font_path, Renderer, Viewport, FONT_ENV_VAR};
pub use scene::{
    ActorVisual, BubbleStyle, ChatLineView, ChatPanelView, InputSnapshot, ModalView,
    RegionMarker, Scene, SceneWorld,
};

mod renderer;
mod text;

pub use renderer::Renderer;
pub(crate) use text::TextPainter;
pub use text::{resolve_font_path, FONT_ENV_VAR};

/// Logical pixel size of a drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

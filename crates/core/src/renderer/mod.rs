//! Frame capture engine: renders one still image per slide.

mod chromium;
mod config;
mod error;
mod traits;

pub use chromium::ChromiumRenderer;
pub use config::RendererConfig;
pub use error::RenderError;
pub use traits::Renderer;

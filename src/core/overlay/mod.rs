pub mod canvas;
pub mod renderer;

pub use canvas::ImageOverlayRenderer;
pub use renderer::{render_result, BoxStyle, OverlayRenderer};

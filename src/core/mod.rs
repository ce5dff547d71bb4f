pub mod detection;
pub mod error;
pub mod overlay;
pub mod pipeline;
pub mod video;

pub use error::OverlayError;

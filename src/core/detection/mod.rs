//! 检测链路：预处理 → 推理 → 解码 → 缓存

pub mod cache;
pub mod decoder;
pub mod detector;
pub mod model;
pub mod preprocess;

pub use cache::DetectionCache;
pub use decoder::{OutputDecoder, OutputLayout};
pub use detector::{Detector, InputTensor, MockDetector, RawOutput};
pub use model::{DetectionBox, DetectionResult};
pub use preprocess::preprocess;

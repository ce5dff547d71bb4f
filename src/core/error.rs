use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("{0} not ready")]
    NotReady(&'static str),
    #[error("Unrecognized output shape: {0:?}")]
    UnrecognizedOutputShape(Vec<usize>),
    #[error("Detector failed: {0}")]
    DetectorFailure(String),
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

impl OverlayError {
    /// 可在本地恢复的错误（跳过本轮即可）
    pub fn is_transient(&self) -> bool {
        matches!(self, OverlayError::NotReady(_))
    }
}

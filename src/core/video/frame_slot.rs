use super::frame::{Frame, RawFrame};
use crate::core::error::OverlayError;
use std::sync::Mutex;

/// 帧来源：按需提供当前帧
///
/// 未就绪（相机尚未出帧）必须返回 `OverlayError::NotReady`，与合法的空帧区分开。
pub trait FrameSource: Send + Sync {
    fn frame(&self) -> Result<Frame, OverlayError>;
}

/// 最新帧信箱：相机回调推入，检测循环拉取，只保留最后一帧
#[derive(Default)]
pub struct FrameSlot {
    latest: Mutex<Option<Frame>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: Frame) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(frame);
        }
    }

    pub fn push_raw(&self, raw: &RawFrame) -> Result<(), OverlayError> {
        self.push(raw.to_rgba()?);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.latest.lock().map(|l| l.is_some()).unwrap_or(false)
    }

    /// 相机重新获取时清空
    pub fn clear(&self) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = None;
        }
    }
}

impl FrameSource for FrameSlot {
    fn frame(&self) -> Result<Frame, OverlayError> {
        let latest = self
            .latest
            .lock()
            .map_err(|_| OverlayError::NotReady("frame slot"))?;
        latest.clone().ok_or(OverlayError::NotReady("camera"))
    }
}

use super::frame::{Frame, GrayFrame};
use crate::core::error::OverlayError;
use log::debug;

/// 帧差门控 - 低成本判断当前帧是否值得跑一次完整检测
///
/// 比较基准永远是“上一次观察到的帧”，而不是“上一次触发检测的帧”。
pub struct ChangeGate {
    sample_size: (u32, u32),
    stride: usize,
    /// 每个采样点的平均亮度差阈值 (0-255)
    threshold: f32,
    last_frame: Option<GrayFrame>,
}

impl ChangeGate {
    pub fn new() -> Self {
        Self::with_params((64, 64), 4, 6.0)
    }

    pub fn with_params(sample_size: (u32, u32), stride: usize, threshold: f32) -> Self {
        Self {
            sample_size,
            stride: stride.max(1),
            threshold,
            last_frame: None,
        }
    }

    pub fn sample_size(&self) -> (u32, u32) {
        self.sample_size
    }

    /// 全分辨率帧 → 缩略灰度 → 比较
    pub fn observe(&mut self, frame: &Frame) -> Result<bool, OverlayError> {
        let gray = frame.to_gray(self.sample_size.0, self.sample_size.1)?;
        Ok(self.should_detect(gray))
    }

    /// Y plane 版本，避免 RGBA 转换
    pub fn should_detect_luma(&mut self, y_plane: &[u8], width: u32, height: u32) -> bool {
        let gray = GrayFrame::from_luma(
            y_plane,
            width,
            height,
            self.sample_size.0,
            self.sample_size.1,
        );
        self.should_detect(gray)
    }

    pub fn should_detect(&mut self, current: GrayFrame) -> bool {
        let should_detect = match &self.last_frame {
            Some(last) if last.same_dimensions(&current) => {
                let (diff, samples) = self.strided_sad(last, &current);
                let limit = self.threshold * samples as f32;
                debug!("gate: sad={} limit={:.1} samples={}", diff, limit, samples);
                diff as f32 > limit
            }
            // 首帧或尺寸变化：没有可比较的基准
            _ => true,
        };

        self.last_frame = Some(current);

        should_detect
    }

    /// 每隔 stride 个元素取样的绝对差之和，返回 (差值和, 采样数)
    fn strided_sad(&self, a: &GrayFrame, b: &GrayFrame) -> (u64, usize) {
        a.data
            .iter()
            .zip(b.data.iter())
            .step_by(self.stride)
            .fold((0u64, 0usize), |(sum, n), (&x, &y)| {
                (sum + x.abs_diff(y) as u64, n + 1)
            })
    }

    pub fn has_baseline(&self) -> bool {
        self.last_frame.is_some()
    }

    pub fn reset(&mut self) {
        self.last_frame = None;
    }
}

impl Default for ChangeGate {
    fn default() -> Self {
        Self::new()
    }
}

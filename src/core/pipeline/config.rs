use crate::core::error::OverlayError;
use serde::{Deserialize, Serialize};

/// 节拍频率范围 (Hz)
const MIN_REFRESH_HZ: f64 = 1.0;
const MAX_REFRESH_HZ: f64 = 1000.0;

/// 检测循环的可调参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// 帧差比较用的缩略图尺寸
    pub gate_width: u32,
    pub gate_height: u32,
    /// 帧差采样步长（每 N 个像素取一个）
    pub gate_stride: usize,
    /// 每个采样点的平均亮度差阈值 (0-255)
    pub change_threshold: f32,
    /// 检测器输入分辨率
    pub input_width: u32,
    pub input_height: u32,
    /// 置信度阈值，严格大于才保留
    pub confidence_threshold: f32,
    /// 显示刷新率，决定调度节拍
    pub refresh_hz: f64,
    /// 宿主驱动模式下，一次检测请求最多等待的帧数，超时视为放弃
    pub max_pending_frames: u64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            gate_width: 64,
            gate_height: 64,
            gate_stride: 4,
            change_threshold: 6.0,
            input_width: 640,
            input_height: 640,
            confidence_threshold: 0.4,
            refresh_hz: 60.0,
            max_pending_frames: 120,
        }
    }
}

impl OverlayConfig {
    /// 低端设备：更小的输入，更迟钝的门控
    pub fn for_low_power() -> Self {
        Self {
            gate_width: 32,
            gate_height: 32,
            gate_stride: 8,
            change_threshold: 10.0,
            input_width: 416,
            input_height: 416,
            refresh_hz: 30.0,
            ..Default::default()
        }
    }

    pub fn for_high_accuracy() -> Self {
        Self {
            gate_stride: 2,
            change_threshold: 3.0,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, OverlayError> {
        let config: OverlayConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), OverlayError> {
        if self.gate_width == 0 || self.gate_height == 0 {
            return Err(OverlayError::InvalidConfig("gate size must be non-zero".into()));
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(OverlayError::InvalidConfig("input size must be non-zero".into()));
        }
        if self.gate_stride == 0 {
            return Err(OverlayError::InvalidConfig("gate_stride must be >= 1".into()));
        }
        if !(0.0..=255.0).contains(&self.change_threshold) {
            return Err(OverlayError::InvalidConfig(format!(
                "change_threshold {} outside 0..=255",
                self.change_threshold
            )));
        }
        if !(0.0..1.0).contains(&self.confidence_threshold) {
            return Err(OverlayError::InvalidConfig(format!(
                "confidence_threshold {} outside 0..1",
                self.confidence_threshold
            )));
        }
        if !(MIN_REFRESH_HZ..=MAX_REFRESH_HZ).contains(&self.refresh_hz) {
            return Err(OverlayError::InvalidConfig(format!(
                "refresh_hz {} outside {}..={}",
                self.refresh_hz, MIN_REFRESH_HZ, MAX_REFRESH_HZ
            )));
        }
        if self.max_pending_frames == 0 {
            return Err(OverlayError::InvalidConfig("max_pending_frames must be >= 1".into()));
        }
        Ok(())
    }

    pub fn gate_size(&self) -> (u32, u32) {
        (self.gate_width, self.gate_height)
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.refresh_hz)
    }
}

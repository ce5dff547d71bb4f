use crate::core::detection::DetectionBox;
use crate::core::overlay::BoxStyle;
use crate::core::pipeline::LoopStats;
use crate::core::video::RawFrame;
use serde::{Deserialize, Serialize};

/// 相机帧（YUV 4:2:0 三平面）
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub y_plane: Vec<u8>,
    pub u_plane: Vec<u8>,
    pub v_plane: Vec<u8>,
    pub timestamp_ms: u64,
    pub frame_number: u64,
}

impl CameraFrame {
    pub(crate) fn to_raw(&self) -> RawFrame {
        RawFrame {
            width: self.width,
            height: self.height,
            y_plane: self.y_plane.clone(),
            u_plane: self.u_plane.clone(),
            v_plane: self.v_plane.clone(),
            timestamp_ms: self.timestamp_ms,
            frame_number: self.frame_number,
        }
    }
}

/// 供 Dart 侧绘制的检测框
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    /// -1 表示类别未知
    pub class_index: i32,
    pub label: String,
    /// ARGB
    pub color: u32,
}

impl OverlayBox {
    pub(crate) fn from_box(bbox: &DetectionBox, style: &BoxStyle) -> Self {
        let [r, g, b, a] = style.color_for(bbox.class_index);
        Self {
            cx: bbox.cx,
            cy: bbox.cy,
            w: bbox.w,
            h: bbox.h,
            confidence: bbox.confidence,
            class_index: bbox.class_index.map(|c| c as i32).unwrap_or(-1),
            label: style.label_for(bbox),
            color: u32::from_be_bytes([a, r, g, b]),
        }
    }
}

/// 门控判断结果
#[derive(Debug, Clone)]
pub struct FrameDecision {
    /// true: 宿主需要跑一次检测并调用 submit_output
    pub run_detection: bool,
    /// 本帧的轮次编号，submit_output 时带回
    pub iteration: u64,
    /// 当前应绘制的（缓存）框
    pub boxes: Vec<OverlayBox>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OverlayStats {
    pub ticks: u64,
    pub detections: u64,
    pub skips: u64,
    pub not_ready: u64,
    pub failures: u64,
    pub discarded: u64,
}

impl From<LoopStats> for OverlayStats {
    fn from(stats: LoopStats) -> Self {
        Self {
            ticks: stats.ticks,
            detections: stats.detections,
            skips: stats.skips,
            not_ready: stats.not_ready,
            failures: stats.failures,
            discarded: stats.discarded,
        }
    }
}

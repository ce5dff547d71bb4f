//! 检测输出解码 - 按张量形状识别布局，转换成归一化检测框
//!
//! 支持两种导出格式：
//! 1. 固定 6 字段：x, y, w, h, confidence, class
//! 2. 类别分布：x, y, w, h, objectness, score_0 .. score_k-1
//!
//! 无法识别的形状返回空结果，不视为致命错误。

use super::model::{DetectionBox, DetectionResult};
use crate::core::error::OverlayError;
use log::warn;

/// 每条记录前 4 个字段为框坐标
const BOX_FIELDS: usize = 4;
const FIXED_FIELDS: usize = 6;
/// 类别分布布局中的 objectness 字段下标
const OBJECTNESS_FIELD: usize = 4;
/// 超过这个类别数基本可以认定是转置或未知格式
const MAX_CLASSES: usize = 1000;
/// 归一化输出的边缘框可能略超 1.0；整个张量的框坐标最大值超过它才按像素处理
const PIXEL_UNIT_LIMIT: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    Fixed6 { records: usize },
    ClassDistribution { records: usize, classes: usize },
    Unrecognized,
}

impl OutputLayout {
    /// 只看最后一维判断布局；至少二维，元素总数必须与形状一致
    pub fn classify(shape: &[usize], value_count: usize) -> OutputLayout {
        let Some((&fields, leading)) = shape.split_last() else {
            return OutputLayout::Unrecognized;
        };
        if leading.is_empty() {
            return OutputLayout::Unrecognized;
        }
        let records = leading.iter().product::<usize>();

        if records.checked_mul(fields) != Some(value_count) {
            return OutputLayout::Unrecognized;
        }

        match fields {
            FIXED_FIELDS => OutputLayout::Fixed6 { records },
            f if f > FIXED_FIELDS && f - (BOX_FIELDS + 1) <= MAX_CLASSES => {
                OutputLayout::ClassDistribution {
                    records,
                    classes: f - (BOX_FIELDS + 1),
                }
            }
            _ => OutputLayout::Unrecognized,
        }
    }

    pub fn fields(&self) -> Option<usize> {
        match self {
            OutputLayout::Fixed6 { .. } => Some(FIXED_FIELDS),
            OutputLayout::ClassDistribution { classes, .. } => Some(BOX_FIELDS + 1 + classes),
            OutputLayout::Unrecognized => None,
        }
    }
}

pub struct OutputDecoder {
    confidence_threshold: f32,
    /// 检测器输入分辨率，用于把像素单位的框换算成比例
    input_size: (u32, u32),
}

impl OutputDecoder {
    pub fn new(confidence_threshold: f32, input_size: (u32, u32)) -> Self {
        Self {
            confidence_threshold,
            input_size,
        }
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn decode(&self, values: &[f32], shape: &[usize]) -> Vec<DetectionBox> {
        match OutputLayout::classify(shape, values.len()) {
            OutputLayout::Fixed6 { .. } => {
                let scale = self.coordinate_scale(values, FIXED_FIELDS);
                self.decode_fixed(values, scale)
            }
            OutputLayout::ClassDistribution { classes, .. } => {
                let scale = self.coordinate_scale(values, BOX_FIELDS + 1 + classes);
                self.decode_class_distribution(values, classes, scale)
            }
            OutputLayout::Unrecognized => {
                let err = OverlayError::UnrecognizedOutputShape(shape.to_vec());
                warn!("⚠️ {} ({} values), no detections", err, values.len());
                Vec::new()
            }
        }
    }

    pub fn decode_result(&self, values: &[f32], shape: &[usize]) -> DetectionResult {
        DetectionResult::new(self.decode(values, shape))
    }

    fn decode_fixed(&self, values: &[f32], scale: (f32, f32)) -> Vec<DetectionBox> {
        values
            .chunks_exact(FIXED_FIELDS)
            .filter_map(|record| {
                let confidence = record[4];
                if !self.accepts(confidence) {
                    return None;
                }
                let class_index = class_from_value(record[5]);
                Some(make_box(&record[..BOX_FIELDS], scale, confidence, class_index))
            })
            .collect()
    }

    fn decode_class_distribution(
        &self,
        values: &[f32],
        classes: usize,
        scale: (f32, f32),
    ) -> Vec<DetectionBox> {
        values
            .chunks_exact(BOX_FIELDS + 1 + classes)
            .filter_map(|record| {
                let objectness = record[OBJECTNESS_FIELD];
                let (class_index, max_score) = best_class(&record[OBJECTNESS_FIELD + 1..]);
                let confidence = objectness * max_score;
                if !self.accepts(confidence) {
                    return None;
                }
                Some(make_box(&record[..BOX_FIELDS], scale, confidence, class_index))
            })
            .collect()
    }

    /// 严格大于阈值才保留；NaN 一律拒绝
    fn accepts(&self, confidence: f32) -> bool {
        confidence > self.confidence_threshold
    }

    /// 坐标单位按整个张量判定一次：要么全部是比例，要么全部是输入分辨率下的像素
    fn coordinate_scale(&self, values: &[f32], fields: usize) -> (f32, f32) {
        let max_coord = values
            .chunks_exact(fields)
            .flat_map(|record| record[..BOX_FIELDS].iter().copied())
            .filter(|v| v.is_finite())
            .fold(0.0f32, f32::max);
        if max_coord <= PIXEL_UNIT_LIMIT {
            return (1.0, 1.0);
        }
        (
            self.input_size.0.max(1) as f32,
            self.input_size.1.max(1) as f32,
        )
    }
}

fn make_box(
    xywh: &[f32],
    (sx, sy): (f32, f32),
    confidence: f32,
    class_index: Option<usize>,
) -> DetectionBox {
    DetectionBox {
        cx: xywh[0] / sx,
        cy: xywh[1] / sy,
        w: xywh[2] / sx,
        h: xywh[3] / sy,
        confidence: confidence.clamp(0.0, 1.0),
        class_index,
    }
    .clamped()
}

/// 取得分最高的类别；没有任何正分时返回 (None, 0.0)
fn best_class(scores: &[f32]) -> (Option<usize>, f32) {
    scores
        .iter()
        .enumerate()
        .fold((None, 0.0f32), |(best_idx, best), (idx, &score)| {
            if score > best {
                (Some(idx), score)
            } else {
                (best_idx, best)
            }
        })
}

fn class_from_value(value: f32) -> Option<usize> {
    if value.is_finite() && value >= 0.0 {
        Some(value.round() as usize)
    } else {
        None
    }
}

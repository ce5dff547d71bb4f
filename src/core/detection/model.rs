use serde::{Deserialize, Serialize};

/// 归一化检测框：中心点 + 宽高，均为帧尺寸的比例 [0,1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    /// None 表示类别未知
    pub class_index: Option<usize>,
}

impl DetectionBox {
    pub fn x1(&self) -> f32 {
        self.cx - self.w / 2.0
    }
    pub fn y1(&self) -> f32 {
        self.cy - self.h / 2.0
    }
    pub fn x2(&self) -> f32 {
        self.cx + self.w / 2.0
    }
    pub fn y2(&self) -> f32 {
        self.cy + self.h / 2.0
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    /// 裁剪到 [0,1] 画面范围内，保持角点语义
    pub fn clamped(&self) -> DetectionBox {
        let x1 = self.x1().clamp(0.0, 1.0);
        let y1 = self.y1().clamp(0.0, 1.0);
        let x2 = self.x2().clamp(0.0, 1.0);
        let y2 = self.y2().clamp(0.0, 1.0);
        DetectionBox {
            cx: (x1 + x2) / 2.0,
            cy: (y1 + y2) / 2.0,
            w: x2 - x1,
            h: y2 - y1,
            ..*self
        }
    }

    /// IoU with another box.
    pub fn iou(&self, other: &DetectionBox) -> f32 {
        let ix1 = self.x1().max(other.x1());
        let iy1 = self.y1().max(other.y1());
        let ix2 = self.x2().min(other.x2());
        let iy2 = self.y2().min(other.y2());
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }

    /// 投影到像素坐标 [x0, y0, x1, y1]，裁剪到画面边界；退化框返回 None
    pub fn to_pixel_rect(&self, dims: (u32, u32)) -> Option<[u32; 4]> {
        let (w, h) = dims;
        if w == 0 || h == 0 {
            return None;
        }
        let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min((max - 1) as f32) as u32 };
        let x0 = clamp(self.x1() * w as f32, w);
        let y0 = clamp(self.y1() * h as f32, h);
        let x1 = clamp(self.x2() * w as f32, w);
        let y1 = clamp(self.y2() * h as f32, h);
        if x0 > x1 || y0 > y1 {
            return None;
        }
        Some([x0, y0, x1, y1])
    }
}

/// 一次检测调用产出的结果，产出后不可变
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    boxes: Vec<DetectionBox>,
}

impl DetectionResult {
    pub fn new(boxes: Vec<DetectionBox>) -> Self {
        Self { boxes }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn boxes(&self) -> &[DetectionBox] {
        &self.boxes
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

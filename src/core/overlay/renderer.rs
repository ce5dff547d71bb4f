use crate::core::detection::{DetectionBox, DetectionResult};

/// 叠加层绘制接口，调用之间不保留状态
pub trait OverlayRenderer: Send + Sync {
    fn clear(&self);
    fn draw_box(&self, bbox: &DetectionBox, color: [u8; 4], label: &str);
}

const DEFAULT_PALETTE: [[u8; 4]; 6] = [
    [0, 255, 0, 255],
    [255, 64, 64, 255],
    [64, 160, 255, 255],
    [255, 200, 0, 255],
    [200, 64, 255, 255],
    [0, 220, 220, 255],
];
const UNKNOWN_COLOR: [u8; 4] = [200, 200, 200, 255];

/// 颜色/标签约定：按类别取色，标签为 "名称 置信度%"
#[derive(Debug, Clone)]
pub struct BoxStyle {
    pub palette: Vec<[u8; 4]>,
    pub class_names: Vec<String>,
}

impl Default for BoxStyle {
    fn default() -> Self {
        Self {
            palette: DEFAULT_PALETTE.to_vec(),
            class_names: Vec::new(),
        }
    }
}

impl BoxStyle {
    pub fn with_class_names(class_names: Vec<String>) -> Self {
        Self {
            class_names,
            ..Default::default()
        }
    }

    pub fn color_for(&self, class_index: Option<usize>) -> [u8; 4] {
        match class_index {
            Some(idx) if !self.palette.is_empty() => self.palette[idx % self.palette.len()],
            _ => UNKNOWN_COLOR,
        }
    }

    pub fn label_for(&self, bbox: &DetectionBox) -> String {
        let name = match bbox.class_index {
            Some(idx) => self
                .class_names
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("class {}", idx)),
            None => "?".to_string(),
        };
        format!("{} {:.0}%", name, bbox.confidence * 100.0)
    }
}

/// 清空画面后绘制整组结果
pub fn render_result(renderer: &dyn OverlayRenderer, result: &DetectionResult, style: &BoxStyle) {
    renderer.clear();
    for bbox in result.boxes() {
        renderer.draw_box(bbox, style.color_for(bbox.class_index), &style.label_for(bbox));
    }
}

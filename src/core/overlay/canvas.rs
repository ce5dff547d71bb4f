use super::renderer::OverlayRenderer;
use crate::core::detection::DetectionBox;
use image::{Rgba, RgbaImage};
use std::sync::Mutex;

/// 在 RGBA 画布上绘制空心矩形的渲染器（透明背景，供宿主叠加在视频上）
pub struct ImageOverlayRenderer {
    canvas: Mutex<RgbaImage>,
    thickness: u32,
}

impl ImageOverlayRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: Mutex::new(RgbaImage::new(width, height)),
            thickness: 2,
        }
    }

    pub fn with_thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness.max(1);
        self
    }

    /// 当前画布的拷贝
    pub fn snapshot(&self) -> Option<RgbaImage> {
        self.canvas.lock().ok().map(|c| c.clone())
    }
}

impl OverlayRenderer for ImageOverlayRenderer {
    fn clear(&self) {
        if let Ok(mut canvas) = self.canvas.lock() {
            for px in canvas.pixels_mut() {
                *px = Rgba([0, 0, 0, 0]);
            }
        }
    }

    fn draw_box(&self, bbox: &DetectionBox, color: [u8; 4], _label: &str) {
        if let Ok(mut canvas) = self.canvas.lock() {
            if let Some(rect) = bbox.to_pixel_rect(canvas.dimensions()) {
                draw_rect(&mut canvas, rect, Rgba(color), self.thickness);
            }
        }
    }
}

/// Draw a rectangle border with given thickness.
fn draw_rect(img: &mut RgbaImage, bbox_px: [u32; 4], color: Rgba<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    let [x0, y0, x1, y1] = bbox_px;
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 >= w || yy0 >= h || xx1 >= w || yy1 >= h || xx0 > xx1 || yy0 > yy1 {
            continue;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox() -> DetectionBox {
        DetectionBox {
            cx: 0.5,
            cy: 0.5,
            w: 0.5,
            h: 0.5,
            confidence: 0.9,
            class_index: Some(0),
        }
    }

    #[test]
    fn test_draw_box_outlines_rect() {
        let renderer = ImageOverlayRenderer::new(100, 100).with_thickness(1);
        renderer.draw_box(&bbox(), [0, 255, 0, 255], "person 90%");

        let canvas = renderer.snapshot().unwrap();
        assert_eq!(canvas.get_pixel(25, 25).0, [0, 255, 0, 255]);
        assert_eq!(canvas.get_pixel(75, 50).0, [0, 255, 0, 255]);
        // 框内部保持透明
        assert_eq!(canvas.get_pixel(50, 50).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_clear_resets_canvas() {
        let renderer = ImageOverlayRenderer::new(20, 20);
        renderer.draw_box(&bbox(), [255, 0, 0, 255], "");
        renderer.clear();

        let canvas = renderer.snapshot().unwrap();
        assert!(canvas.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn test_zero_sized_canvas_is_noop() {
        let renderer = ImageOverlayRenderer::new(0, 0);
        renderer.draw_box(&bbox(), [255, 0, 0, 255], "");
        renderer.clear();
    }
}

use crate::core::error::OverlayError;
use std::time::Duration;

/// 帧数据结构（全分辨率，来自相机）
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGBA 格式
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            data,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// 空帧是合法的帧，只是没有像素可处理
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.pixel_count() * 3);
        for chunk in self.data.chunks_exact(4) {
            rgb.push(chunk[0]); // R
            rgb.push(chunk[1]); // G
            rgb.push(chunk[2]); // B
        }
        rgb
    }

    pub(crate) fn as_rgba_image(&self) -> Result<image::RgbaImage, OverlayError> {
        if self.is_empty() {
            return Err(OverlayError::InvalidFrame("empty frame".to_string()));
        }
        image::RgbaImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            OverlayError::InvalidFrame(format!(
                "expected {} RGBA bytes for {}x{}, got {}",
                self.pixel_count() * 4,
                self.width,
                self.height,
                self.data.len()
            ))
        })
    }

    pub fn resize_to(&self, target_width: u32, target_height: u32) -> Result<Frame, OverlayError> {
        let img = self.as_rgba_image()?;
        let resized = image::imageops::resize(
            &img,
            target_width,
            target_height,
            image::imageops::FilterType::Triangle,
        );

        Ok(Frame {
            width: target_width,
            height: target_height,
            data: resized.into_raw(),
            timestamp: self.timestamp,
            frame_number: self.frame_number,
        })
    }

    /// 缩小并转灰度，供 ChangeGate 比较使用
    pub fn to_gray(&self, target_width: u32, target_height: u32) -> Result<GrayFrame, OverlayError> {
        let resized = self.resize_to(target_width, target_height)?;
        let data = resized
            .data
            .chunks_exact(4)
            .map(|rgba| luma(rgba[0], rgba[1], rgba[2]))
            .collect();

        Ok(GrayFrame {
            width: target_width,
            height: target_height,
            data,
        })
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

/// 低分辨率单通道快照，仅用于帧差比较
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl GrayFrame {
    /// 下采样 Y plane 到指定大小（块平均）
    pub fn from_luma(y_plane: &[u8], width: u32, height: u32, target_w: u32, target_h: u32) -> Self {
        let w = width as usize;
        let h = height as usize;
        let tw = target_w as usize;
        let th = target_h as usize;

        // Source smaller than target: blocks collapse to a single pixel
        let block_w = (w / tw.max(1)).max(1);
        let block_h = (h / th.max(1)).max(1);

        let mut data = Vec::with_capacity(tw * th);

        for by in 0..th {
            for bx in 0..tw {
                let mut block_sum = 0u64;
                let mut count = 0u64;

                let y_start = (by * block_h).min(h);
                let y_end = ((by + 1) * block_h).min(h);
                let x_start = (bx * block_w).min(w);
                let x_end = ((bx + 1) * block_w).min(w);

                for py in y_start..y_end {
                    let row_offset = py * w;
                    for px in x_start..x_end {
                        if let Some(&val) = y_plane.get(row_offset + px) {
                            block_sum += val as u64;
                            count += 1;
                        }
                    }
                }

                data.push(if count > 0 { (block_sum / count) as u8 } else { 0 });
            }
        }

        Self {
            width: target_w,
            height: target_h,
            data,
        }
    }

    pub fn same_dimensions(&self, other: &GrayFrame) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// 从原生层传递的原始帧数据（YUV 4:2:0）
#[derive(Debug)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub y_plane: Vec<u8>,
    pub u_plane: Vec<u8>,
    pub v_plane: Vec<u8>,
    pub timestamp_ms: u64,
    pub frame_number: u64,
}

impl RawFrame {
    pub fn to_rgba(&self) -> Result<Frame, OverlayError> {
        let w = self.width as usize;
        let h = self.height as usize;
        let too_small = || {
            OverlayError::InvalidFrame(format!(
                "YUV planes too small for {}x{}",
                self.width, self.height
            ))
        };
        // 尺寸来自宿主，乘法需做溢出检查
        let luma_len = w.checked_mul(h).ok_or_else(too_small)?;
        let rgba_len = luma_len.checked_mul(4).ok_or_else(too_small)?;
        let chroma_w = (w / 2).max(1);
        let chroma_len = (w / 2) * (h / 2);
        if self.y_plane.len() < luma_len
            || self.u_plane.len() < chroma_len
            || self.v_plane.len() < chroma_len
        {
            return Err(too_small());
        }

        let mut rgba_data = vec![0u8; rgba_len];

        for y in 0..h {
            for x in 0..w {
                let y_idx = y * w + x;
                let uv_idx = (y / 2) * chroma_w + x / 2;

                let y_val = self.y_plane[y_idx] as f32;
                let u_val = self.u_plane.get(uv_idx).copied().unwrap_or(128) as f32 - 128.0;
                let v_val = self.v_plane.get(uv_idx).copied().unwrap_or(128) as f32 - 128.0;

                let r = (y_val + 1.402 * v_val).clamp(0.0, 255.0) as u8;
                let g = (y_val - 0.344136 * u_val - 0.714136 * v_val).clamp(0.0, 255.0) as u8;
                let b = (y_val + 1.772 * u_val).clamp(0.0, 255.0) as u8;

                let rgba_idx = y_idx * 4;
                rgba_data[rgba_idx] = r;
                rgba_data[rgba_idx + 1] = g;
                rgba_data[rgba_idx + 2] = b;
                rgba_data[rgba_idx + 3] = 255;
            }
        }

        Ok(Frame::new(
            self.width,
            self.height,
            rgba_data,
            self.timestamp_ms,
            self.frame_number,
        ))
    }
}

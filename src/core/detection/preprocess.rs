use super::detector::InputTensor;
use crate::core::error::OverlayError;
use crate::core::video::Frame;
use rayon::prelude::*;

/// 全分辨率帧 → 检测器输入
///
/// 最近邻缩放到目标分辨率，丢弃 alpha，像素除以 255，NHWC [1, H, W, 3]。
pub fn preprocess(frame: &Frame, target: (u32, u32)) -> Result<InputTensor, OverlayError> {
    let (tw, th) = target;
    if tw == 0 || th == 0 {
        return Err(OverlayError::InvalidConfig(format!(
            "detector input size {}x{}",
            tw, th
        )));
    }

    let img = frame.as_rgba_image()?;
    let resized = if img.dimensions() == (tw, th) {
        img
    } else {
        image::imageops::resize(&img, tw, th, image::imageops::FilterType::Nearest)
    };
    let raw = resized.as_raw();

    let mut data = vec![0f32; (tw * th * 3) as usize];
    data.par_chunks_mut(3)
        .zip(raw.par_chunks(4))
        .for_each(|(out, rgba)| {
            out[0] = rgba[0] as f32 / 255.0;
            out[1] = rgba[1] as f32 / 255.0;
            out[2] = rgba[2] as f32 / 255.0;
        });

    Ok(InputTensor {
        data,
        shape: [1, th as usize, tw as usize, 3],
    })
}

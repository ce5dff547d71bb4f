//! 实时检测叠加层（宿主驱动）

use crate::api::models::overlay::{CameraFrame, FrameDecision, OverlayBox, OverlayStats};
use crate::core::detection::{preprocess, RawOutput};
use crate::core::error::OverlayError;
use crate::core::pipeline::{OverlayConfig, Session};
use flutter_rust_bridge::frb;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// 叠加层 API 错误类型，FRB 友好的设计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayApiError {
    pub error_type: String,
    pub message: String,
}

impl From<OverlayError> for OverlayApiError {
    fn from(e: OverlayError) -> Self {
        let error_type = match &e {
            OverlayError::NotReady(_) => "NotReady",
            OverlayError::UnrecognizedOutputShape(_) => "UnrecognizedOutputShape",
            OverlayError::DetectorFailure(_) => "DetectorFailure",
            OverlayError::InvalidFrame(_) => "InvalidFrame",
            OverlayError::InvalidConfig(_) | OverlayError::Config(_) => "InvalidConfig",
        };
        Self {
            error_type: error_type.to_string(),
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for OverlayApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_type, self.message)
    }
}

impl std::error::Error for OverlayApiError {}

/// 检测叠加引擎 - 门控 + 解码 + 缓存，模型推理与 vsync 由 Dart 侧负责
///
/// ```dart
/// final engine = OverlayEngine.create(configJson: null);
/// final decision = engine.submitFrame(frame: cameraFrame);
/// if (decision.runDetection) {
///   final input = engine.prepareInput(frame: cameraFrame);
///   final boxes = engine.submitOutput(iteration: decision.iteration, values: out, shape: shape);
/// }
/// ```
#[frb(opaque)]
pub struct OverlayEngine {
    session: Mutex<Session>,
    /// 在途检测请求的轮次，至多一个；锁顺序 session → pending
    pending: Mutex<Option<u64>>,
}

impl OverlayEngine {
    /// 创建引擎；config_json 为空时使用默认参数
    #[frb(sync)]
    pub fn create(config_json: Option<String>) -> Result<Self, OverlayApiError> {
        crate::init_logging();
        let config = match config_json {
            Some(json) => OverlayConfig::from_json(&json)?,
            None => OverlayConfig::default(),
        };
        info!(
            "🎬 OverlayEngine: created (gate {}x{}, input {}x{}, threshold {})",
            config.gate_width,
            config.gate_height,
            config.input_width,
            config.input_height,
            config.confidence_threshold
        );
        Ok(Self {
            session: Mutex::new(Session::new(config)?),
            pending: Mutex::new(None),
        })
    }

    /// 每个显示节拍调用一次：直接用 Y plane 做门控
    ///
    /// 同一时刻最多一个检测请求在途；在途期间不推进门控基准，
    /// 结果回来后下一帧与发起请求的那一帧比较。
    #[frb(sync)]
    pub fn submit_frame(&self, frame: CameraFrame) -> FrameDecision {
        let mut session = self.lock_session();
        let iteration = session.next_iteration();

        if frame.width == 0 || frame.height == 0 || frame.y_plane.is_empty() {
            session.record_not_ready();
            return Self::decision(&session, false, iteration);
        }

        let mut pending = self.lock_pending();
        if let Some(waiting) = *pending {
            if iteration.saturating_sub(waiting) <= session.config().max_pending_frames {
                session.record_skip();
                return Self::decision(&session, false, iteration);
            }
            warn!(
                "⌛ Detection for iteration {} never returned, requesting a new one",
                waiting
            );
            *pending = None;
            session.record_discarded();
            session.forget_baseline();
        }

        let run_detection = session.should_detect_luma(&frame.y_plane, frame.width, frame.height);
        if run_detection {
            *pending = Some(iteration);
        } else {
            session.record_skip();
        }
        Self::decision(&session, run_detection, iteration)
    }

    /// 生成检测器输入：NHWC [1, H, W, 3]，像素 [0,1]
    #[frb(sync)]
    pub fn prepare_input(&self, frame: CameraFrame) -> Result<Vec<f32>, OverlayApiError> {
        let input_size = self.lock_session().config().input_size();
        let rgba = frame.to_raw().to_rgba()?;
        let tensor = preprocess(&rgba, input_size)?;
        Ok(tensor.data)
    }

    /// 提交检测输出，返回当前应绘制的框
    ///
    /// 只接受在途的那一轮；reset 之前或已超时的结果直接丢弃。
    #[frb(sync)]
    pub fn submit_output(
        &self,
        iteration: u64,
        values: Vec<f32>,
        shape: Vec<u32>,
    ) -> Vec<OverlayBox> {
        let mut session = self.lock_session();

        let is_latest = {
            let mut pending = self.lock_pending();
            if *pending == Some(iteration) {
                *pending = None;
                true
            } else {
                false
            }
        };
        if !is_latest {
            warn!("⚠️ Discarding detector output for stale iteration {}", iteration);
            session.record_discarded();
            return Self::boxes_of(&session);
        }

        let shape: Vec<usize> = shape.into_iter().map(|d| d as usize).collect();
        let result = session.decode(&[RawOutput::new(values, shape)]);
        session.commit(result, iteration);
        Self::boxes_of(&session)
    }

    /// Dart 侧推理失败时调用，保持缓存不变；下一帧会重新请求检测
    #[frb(sync)]
    pub fn report_failure(&self, iteration: u64, message: String) {
        warn!("❌ Detector failed at iteration {}: {}", iteration, message);
        let mut session = self.lock_session();
        let mut pending = self.lock_pending();
        if *pending == Some(iteration) {
            *pending = None;
            session.forget_baseline();
        }
        session.record_failure();
    }

    #[frb(sync)]
    pub fn current_boxes(&self) -> Vec<OverlayBox> {
        Self::boxes_of(&self.lock_session())
    }

    #[frb(sync, getter)]
    pub fn stats(&self) -> OverlayStats {
        self.lock_session().stats().into()
    }

    /// 相机重新获取时调用；在途输出会被丢弃，轮次编号继续递增
    #[frb(sync)]
    pub fn reset(&self) {
        let mut session = self.lock_session();
        *self.lock_pending() = None;
        session.reset();
    }

    fn decision(session: &Session, run_detection: bool, iteration: u64) -> FrameDecision {
        FrameDecision {
            run_detection,
            iteration,
            boxes: Self::boxes_of(session),
        }
    }

    fn boxes_of(session: &Session) -> Vec<OverlayBox> {
        session
            .current()
            .boxes()
            .iter()
            .map(|b| OverlayBox::from_box(b, session.style()))
            .collect()
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<u64>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for OverlayEngine {
    fn drop(&mut self) {
        info!("🗑️ OverlayEngine: released");
    }
}

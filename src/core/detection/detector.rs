use crate::core::error::OverlayError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// 预处理后的检测器输入，NHWC: [1, H, W, 3]，像素值 [0,1]
#[derive(Debug, Clone)]
pub struct InputTensor {
    pub data: Vec<f32>,
    pub shape: [usize; 4],
}

impl InputTensor {
    pub fn width(&self) -> usize {
        self.shape[2]
    }

    pub fn height(&self) -> usize {
        self.shape[1]
    }
}

/// 检测器原始输出张量
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    pub values: Vec<f32>,
    pub shape: Vec<usize>,
}

impl RawOutput {
    pub fn new(values: Vec<f32>, shape: Vec<usize>) -> Self {
        Self { values, shape }
    }
}

/// 检测器：耗时的模型推理
///
/// 可能返回多个输出张量，解码只使用第一个。
#[async_trait]
pub trait Detector: Send + Sync {
    /// 模型未加载完成时返回 false，调度器会跳过本轮
    fn is_ready(&self) -> bool {
        true
    }

    /// 模型描述（输入输出形状等），启动时打印一次
    fn describe(&self) -> String {
        "detector".to_string()
    }

    async fn infer(&self, input: &InputTensor) -> Result<Vec<RawOutput>, OverlayError>;
}

/// 测试/演示用检测器：固定输出，记录调用次数
pub struct MockDetector {
    outputs: Vec<RawOutput>,
    ready: AtomicBool,
    fail: AtomicBool,
    latency: Duration,
    calls: AtomicU64,
}

impl MockDetector {
    pub fn new() -> Self {
        Self::with_outputs(Vec::new())
    }

    pub fn with_outputs(outputs: Vec<RawOutput>) -> Self {
        Self {
            outputs,
            ready: AtomicBool::new(true),
            fail: AtomicBool::new(false),
            latency: Duration::ZERO,
            calls: AtomicU64::new(0),
        }
    }

    /// 单条 6 字段记录
    pub fn with_single_box(confidence: f32, class_index: f32) -> Self {
        Self::with_outputs(vec![RawOutput::new(
            vec![0.5, 0.5, 0.25, 0.25, confidence, class_index],
            vec![1, 1, 6],
        )])
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Detector for MockDetector {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn describe(&self) -> String {
        format!("mock detector ({} outputs)", self.outputs.len())
    }

    async fn infer(&self, _input: &InputTensor) -> Result<Vec<RawOutput>, OverlayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(OverlayError::DetectorFailure("mock failure".to_string()));
        }
        Ok(self.outputs.clone())
    }
}

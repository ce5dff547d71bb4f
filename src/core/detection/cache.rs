use super::model::DetectionResult;

/// 最近一次检测结果缓存
///
/// 每次 update 整体替换，不做跨帧平滑：画面上的框保持不动，直到下一次检测直接跳到新位置。
#[derive(Debug, Default)]
pub struct DetectionCache {
    result: DetectionResult,
    /// 产出该结果的调度轮次；None 表示尚未有任何检测
    produced_at: Option<u64>,
    updates: u64,
}

impl DetectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, result: DetectionResult, iteration: u64) {
        self.result = result;
        self.produced_at = Some(iteration);
        self.updates += 1;
    }

    /// 首次检测之前返回空结果
    pub fn current(&self) -> &DetectionResult {
        &self.result
    }

    pub fn produced_at(&self) -> Option<u64> {
        self.produced_at
    }

    pub fn update_count(&self) -> u64 {
        self.updates
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

use super::config::OverlayConfig;
use crate::core::detection::{DetectionCache, DetectionResult, OutputDecoder, RawOutput};
use crate::core::error::OverlayError;
use crate::core::overlay::BoxStyle;
use crate::core::video::{ChangeGate, Frame};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// 循环统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    pub ticks: u64,
    pub detections: u64,
    pub skips: u64,
    pub not_ready: u64,
    pub failures: u64,
    /// stop 之后返回、被丢弃的检测结果
    pub discarded: u64,
}

/// 一次会话的全部可变状态：门控基准 + 结果缓存
///
/// 相机重新获取时整体 reset。
pub struct Session {
    config: OverlayConfig,
    gate: ChangeGate,
    decoder: OutputDecoder,
    cache: DetectionCache,
    style: BoxStyle,
    stats: LoopStats,
    iteration: u64,
}

impl Session {
    pub fn new(config: OverlayConfig) -> Result<Self, OverlayError> {
        config.validate()?;
        Ok(Self {
            gate: ChangeGate::with_params(
                config.gate_size(),
                config.gate_stride,
                config.change_threshold,
            ),
            decoder: OutputDecoder::new(config.confidence_threshold, config.input_size()),
            cache: DetectionCache::new(),
            style: BoxStyle::default(),
            stats: LoopStats::default(),
            iteration: 0,
            config,
        })
    }

    pub fn with_style(mut self, style: BoxStyle) -> Self {
        self.style = style;
        self
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    pub fn style(&self) -> &BoxStyle {
        &self.style
    }

    /// 开始新一轮，返回轮次编号；reset 后继续递增，旧轮次号不会被复用
    pub fn next_iteration(&mut self) -> u64 {
        self.iteration += 1;
        self.stats.ticks += 1;
        self.iteration
    }

    pub fn should_detect(&mut self, frame: &Frame) -> Result<bool, OverlayError> {
        self.gate.observe(frame)
    }

    pub fn should_detect_luma(&mut self, y_plane: &[u8], width: u32, height: u32) -> bool {
        self.gate.should_detect_luma(y_plane, width, height)
    }

    /// 只解码第一个输出张量，其余忽略
    pub fn decode(&self, outputs: &[RawOutput]) -> DetectionResult {
        match outputs.first() {
            Some(primary) => self.decoder.decode_result(&primary.values, &primary.shape),
            None => {
                debug!("detector returned no outputs");
                DetectionResult::empty()
            }
        }
    }

    /// 本轮检测没有落地（失败或被丢弃）：清掉门控基准，下一轮重新检测
    pub fn forget_baseline(&mut self) {
        self.gate.reset();
    }

    pub fn commit(&mut self, result: DetectionResult, iteration: u64) {
        debug!(
            "commit iteration={} boxes={}",
            iteration,
            result.len()
        );
        self.cache.update(result, iteration);
        self.stats.detections += 1;
    }

    pub fn current(&self) -> &DetectionResult {
        self.cache.current()
    }

    pub fn cache(&self) -> &DetectionCache {
        &self.cache
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn record_skip(&mut self) {
        self.stats.skips += 1;
    }

    pub fn record_not_ready(&mut self) {
        self.stats.not_ready += 1;
    }

    pub fn record_failure(&mut self) {
        self.stats.failures += 1;
    }

    pub fn record_discarded(&mut self) {
        self.stats.discarded += 1;
    }

    pub fn reset(&mut self) {
        self.gate.reset();
        self.cache.clear();
        self.stats = LoopStats::default();
        info!("🔄 Session reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_frame(fill: u8) -> Frame {
        Frame::new(64, 64, vec![fill; 64 * 64 * 4], 0, 0)
    }

    #[test]
    fn test_session_rejects_invalid_config() {
        let config = OverlayConfig {
            gate_stride: 0,
            ..Default::default()
        };
        assert!(Session::new(config).is_err());
    }

    #[test]
    fn test_decode_uses_first_output_only() {
        let session = Session::new(OverlayConfig::default()).unwrap();
        let outputs = vec![
            RawOutput::new(vec![0.5, 0.5, 0.1, 0.1, 0.9, 1.0], vec![1, 6]),
            RawOutput::new(vec![0.5, 0.5, 0.1, 0.1, 0.9, 2.0, 0.5, 0.5, 0.1, 0.1, 0.9, 3.0], vec![2, 6]),
        ];
        let result = session.decode(&outputs);
        assert_eq!(result.len(), 1);
        assert_eq!(result.boxes()[0].class_index, Some(1));
        assert!(session.decode(&[]).is_empty());
    }

    #[test]
    fn test_commit_and_stats() {
        let mut session = Session::new(OverlayConfig::default()).unwrap();
        let it = session.next_iteration();
        assert!(session.should_detect(&create_test_frame(10)).unwrap());
        let result = session.decode(&[RawOutput::new(
            vec![0.5, 0.5, 0.1, 0.1, 0.9, 0.0],
            vec![1, 6],
        )]);
        session.commit(result, it);

        assert_eq!(session.current().len(), 1);
        assert_eq!(session.cache().produced_at(), Some(1));
        assert_eq!(session.stats().ticks, 1);
        assert_eq!(session.stats().detections, 1);
    }

    #[test]
    fn test_forget_baseline_redetects_same_frame() {
        let mut session = Session::new(OverlayConfig::default()).unwrap();
        assert!(session.should_detect(&create_test_frame(10)).unwrap());
        assert!(!session.should_detect(&create_test_frame(10)).unwrap());

        session.forget_baseline();
        assert!(session.should_detect(&create_test_frame(10)).unwrap());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut session = Session::new(OverlayConfig::default()).unwrap();
        let it = session.next_iteration();
        session.should_detect(&create_test_frame(10)).unwrap();
        session.commit(DetectionResult::empty(), it);
        session.record_skip();

        session.reset();

        assert_eq!(session.stats(), LoopStats::default());
        assert_eq!(session.next_iteration(), it + 1);
        assert_eq!(session.cache().produced_at(), None);
        // 门控基准也被清掉：同样的帧再次触发检测
        assert!(session.should_detect(&create_test_frame(10)).unwrap());
    }
}

//! 检测循环调度
//!
//! 每个显示节拍执行一轮：取帧 → 门控 →（复用缓存 | 预处理 + 推理 + 解码 + 更新缓存）→ 绘制。
//! 同一时刻最多一轮在执行，因此最多只有一个检测在途，缓存更新严格按轮次有序。

use super::session::{LoopStats, Session};
use super::state::{LoopAction, LoopControl, LoopState, RunToken};
use crate::core::detection::{preprocess, DetectionResult, Detector};
use crate::core::error::OverlayError;
use crate::core::overlay::{render_result, OverlayRenderer};
use crate::core::video::FrameSource;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::MissedTickBehavior;

/// 单轮执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// 循环已停止，驱动任务应退出
    Stopped,
    /// 帧源或检测器未就绪，本轮空转
    NotReady,
    /// 画面无明显变化，绘制缓存结果
    Reused { boxes: usize },
    /// 完成一次检测并更新缓存
    Detected { boxes: usize },
    /// 检测失败，绘制缓存结果，循环继续
    Failed,
    /// 在途检测返回时循环已停止或会话已重置，结果被丢弃
    Discarded,
}

/// 内部驱动任务的登记：generation 变化后旧任务自行退出
#[derive(Debug, Default)]
struct DriverSlot {
    generation: u64,
    active: bool,
}

pub struct DetectionLoop {
    session: Arc<Mutex<Session>>,
    control: LoopControl,
    driver: Mutex<DriverSlot>,
    source: Arc<dyn FrameSource>,
    detector: Arc<dyn Detector>,
    renderer: Arc<dyn OverlayRenderer>,
    /// 保证同一时刻只有一轮在执行
    iteration_lock: tokio::sync::Mutex<()>,
}

impl DetectionLoop {
    pub fn new(
        session: Session,
        source: Arc<dyn FrameSource>,
        detector: Arc<dyn Detector>,
        renderer: Arc<dyn OverlayRenderer>,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            control: LoopControl::new(),
            driver: Mutex::new(DriverSlot::default()),
            source,
            detector,
            renderer,
            iteration_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 启动内部节拍驱动；已有驱动任务时为 no-op，返回是否新建了驱动任务
    ///
    /// 先 `start_manual` 再 `start` 也会补上驱动任务，宿主的 `tick` 与之串行执行。
    pub fn start(self: &Arc<Self>) -> Result<bool, OverlayError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| OverlayError::NotReady("tokio runtime"))?;

        let action = self.control.start();
        let mut driver = self.lock_driver();
        let spawn = match action {
            // Stopped 之后旧任务可能还没醒来退出，直接换代
            LoopAction::Spawn => true,
            LoopAction::Resume | LoopAction::Ignore => !driver.active,
            _ => false,
        };
        if !spawn {
            if action == LoopAction::Resume {
                info!("▶️ Detection loop resumed before stop took effect");
            }
            return Ok(false);
        }

        driver.generation += 1;
        driver.active = true;
        let generation = driver.generation;
        drop(driver);

        let period = self.lock_session().config().tick_interval();
        info!(
            "🚀 Detection loop started ({:?} per tick, {})",
            period,
            self.detector.describe()
        );
        runtime.spawn(Arc::clone(self).drive(period, generation));
        Ok(true)
    }

    /// 由宿主自行按 vsync 调用 `tick()`，不创建驱动任务
    pub fn start_manual(&self) -> bool {
        let started = self.control.start() == LoopAction::Spawn;
        if started {
            info!("🚀 Detection loop started (host-driven, {})", self.detector.describe());
        }
        started
    }

    /// 下一轮边界生效；在途检测结果会被丢弃
    pub fn stop(&self) {
        if self.control.stop() == LoopAction::Cancel {
            info!("⏹️ Detection loop stop requested");
        }
    }

    pub fn state(&self) -> LoopState {
        self.control.state()
    }

    pub fn session(&self) -> Arc<Mutex<Session>> {
        Arc::clone(&self.session)
    }

    pub fn stats(&self) -> LoopStats {
        self.lock_session().stats()
    }

    pub fn current(&self) -> DetectionResult {
        self.lock_session().current().clone()
    }

    /// 相机重新获取后调用；在途检测结果会被丢弃
    pub fn reset_session(&self) {
        let mut session = self.lock_session();
        self.control.invalidate();
        session.reset();
    }

    async fn drive(self: Arc<Self>, period: std::time::Duration, generation: u64) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if self.lock_driver().generation != generation {
                debug!("driver {} superseded", generation);
                return;
            }
            if self.tick().await == TickOutcome::Stopped {
                break;
            }
        }

        let mut driver = self.lock_driver();
        if driver.generation == generation {
            driver.active = false;
        }
        info!("🛑 Detection loop exited");
    }

    /// 执行一轮
    pub async fn tick(&self) -> TickOutcome {
        let _guard = self.iteration_lock.lock().await;
        let Some(token) = self.control.begin_iteration() else {
            return TickOutcome::Stopped;
        };
        self.iterate(token).await
    }

    async fn iterate(&self, token: RunToken) -> TickOutcome {
        let iteration = self.lock_session().next_iteration();

        if !self.detector.is_ready() {
            debug!("tick {}: detector not ready", iteration);
            self.lock_session().record_not_ready();
            return TickOutcome::NotReady;
        }

        let frame = match self.source.frame() {
            Ok(frame) => frame,
            Err(e) => {
                if e.is_transient() {
                    debug!("tick {}: {}", iteration, e);
                } else {
                    warn!("⚠️ Frame source error at tick {}: {}", iteration, e);
                }
                self.lock_session().record_not_ready();
                return TickOutcome::NotReady;
            }
        };

        let gate = self.lock_session().should_detect(&frame);
        match gate {
            Ok(true) => {}
            Ok(false) => {
                let cached = {
                    let mut session = self.lock_session();
                    session.record_skip();
                    session.current().clone()
                };
                self.render(&cached);
                return TickOutcome::Reused {
                    boxes: cached.len(),
                };
            }
            Err(e) => {
                debug!("tick {}: unusable frame: {}", iteration, e);
                self.lock_session().record_not_ready();
                return TickOutcome::NotReady;
            }
        }

        let input_size = self.lock_session().config().input_size();
        let outputs = match preprocess(&frame, input_size) {
            Ok(tensor) => self.detector.infer(&tensor).await,
            Err(e) => Err(e),
        };

        let outputs = match outputs {
            Ok(outputs) => outputs,
            Err(e) => {
                error!("❌ Detection failed at tick {}: {}", iteration, e);
                let cached = {
                    let mut session = self.lock_session();
                    session.record_failure();
                    session.forget_baseline();
                    session.current().clone()
                };
                if self.control.is_current(&token) {
                    self.render(&cached);
                }
                return TickOutcome::Failed;
            }
        };

        let result = {
            let mut session = self.lock_session();
            let result = session.decode(&outputs);
            if !self.control.is_current(&token) {
                warn!(
                    "⚠️ Discarding detection from tick {} after stop/reset",
                    iteration
                );
                session.record_discarded();
                session.forget_baseline();
                return TickOutcome::Discarded;
            }
            session.commit(result.clone(), iteration);
            result
        };

        self.render(&result);
        TickOutcome::Detected {
            boxes: result.len(),
        }
    }

    fn render(&self, result: &DetectionResult) {
        let style = self.lock_session().style().clone();
        render_result(self.renderer.as_ref(), result, &style);
    }

    fn lock_driver(&self) -> MutexGuard<'_, DriverSlot> {
        self.driver.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detection::{MockDetector, RawOutput};
    use crate::core::overlay::renderer::tests::RecordingRenderer;
    use crate::core::pipeline::OverlayConfig;
    use crate::core::video::{Frame, FrameSlot};
    use std::collections::VecDeque;
    use std::time::Duration;

    fn create_test_frame(fill: u8, frame_number: u64) -> Frame {
        Frame::new(64, 64, vec![fill; 64 * 64 * 4], frame_number * 33, frame_number)
    }

    /// 按顺序吐帧，吐完后返回 NotReady
    struct ScriptedSource {
        frames: Mutex<VecDeque<Frame>>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Frame>) -> Self {
            Self {
                frames: Mutex::new(frames.into()),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn frame(&self) -> Result<Frame, OverlayError> {
            self.frames
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(OverlayError::NotReady("script"))
        }
    }

    struct Fixture {
        lp: Arc<DetectionLoop>,
        detector: Arc<MockDetector>,
        renderer: Arc<RecordingRenderer>,
    }

    fn fixture(source: Arc<dyn FrameSource>, detector: MockDetector, config: OverlayConfig) -> Fixture {
        let detector = Arc::new(detector);
        let renderer = Arc::new(RecordingRenderer::default());
        let lp = Arc::new(DetectionLoop::new(
            Session::new(config).unwrap(),
            source,
            detector.clone(),
            renderer.clone(),
        ));
        Fixture {
            lp,
            detector,
            renderer,
        }
    }

    #[tokio::test]
    async fn test_static_scene_then_change_triggers_one_detection() {
        let mut frames = vec![create_test_frame(100, 0)];
        frames.extend((1..=10).map(|i| create_test_frame(100, i)));
        frames.push(create_test_frame(200, 11));

        let f = fixture(
            Arc::new(ScriptedSource::new(frames)),
            MockDetector::with_single_box(0.9, 1.0),
            OverlayConfig::default(),
        );
        assert!(f.lp.start_manual());

        // 会话基准帧：首帧总会检测
        assert_eq!(f.lp.tick().await, TickOutcome::Detected { boxes: 1 });
        let baseline_calls = f.detector.call_count();
        let baseline_updates = f.lp.session().lock().unwrap().cache().update_count();

        let mut outcomes = Vec::new();
        for _ in 0..11 {
            outcomes.push(f.lp.tick().await);
        }

        assert_eq!(f.detector.call_count() - baseline_calls, 1);
        assert_eq!(
            f.lp.session().lock().unwrap().cache().update_count() - baseline_updates,
            1
        );
        assert!(outcomes[..10]
            .iter()
            .all(|o| *o == TickOutcome::Reused { boxes: 1 }));
        assert_eq!(outcomes[10], TickOutcome::Detected { boxes: 1 });
        assert_eq!(f.lp.stats().skips, 10);
    }

    #[tokio::test]
    async fn test_skipped_tick_renders_cached_boxes() {
        let f = fixture(
            Arc::new(ScriptedSource::new(vec![
                create_test_frame(50, 0),
                create_test_frame(50, 1),
            ])),
            MockDetector::with_single_box(0.8, 0.0),
            OverlayConfig::default(),
        );
        f.lp.start_manual();

        f.lp.tick().await;
        assert_eq!(f.lp.tick().await, TickOutcome::Reused { boxes: 1 });
        assert_eq!(f.renderer.clear_count(), 2);
        assert_eq!(f.renderer.labels(), vec!["class 0 80%"]);
    }

    #[tokio::test]
    async fn test_not_ready_source_keeps_looping() {
        let slot = Arc::new(FrameSlot::new());
        let f = fixture(slot.clone(), MockDetector::with_single_box(0.9, 0.0), OverlayConfig::default());
        f.lp.start_manual();

        assert_eq!(f.lp.tick().await, TickOutcome::NotReady);
        assert_eq!(f.lp.state(), LoopState::Running);

        slot.push(create_test_frame(10, 1));
        assert_eq!(f.lp.tick().await, TickOutcome::Detected { boxes: 1 });
        assert_eq!(f.lp.stats().not_ready, 1);
    }

    #[tokio::test]
    async fn test_not_ready_detector_does_not_consume_gate() {
        let slot = Arc::new(FrameSlot::new());
        slot.push(create_test_frame(10, 1));
        let f = fixture(slot.clone(), MockDetector::with_single_box(0.9, 0.0), OverlayConfig::default());
        f.detector.set_ready(false);
        f.lp.start_manual();

        assert_eq!(f.lp.tick().await, TickOutcome::NotReady);
        assert_eq!(f.detector.call_count(), 0);

        // 模型加载完成后，同一静止画面仍然能拿到第一次检测
        f.detector.set_ready(true);
        assert_eq!(f.lp.tick().await, TickOutcome::Detected { boxes: 1 });
    }

    #[tokio::test]
    async fn test_detector_failure_does_not_halt_loop() {
        let f = fixture(
            Arc::new(ScriptedSource::new(vec![
                create_test_frame(0, 0),
                create_test_frame(255, 1),
            ])),
            MockDetector::with_single_box(0.9, 0.0),
            OverlayConfig::default(),
        );
        f.lp.start_manual();
        f.detector.set_failing(true);

        assert_eq!(f.lp.tick().await, TickOutcome::Failed);
        assert_eq!(f.lp.state(), LoopState::Running);
        assert!(f.lp.current().is_empty());

        f.detector.set_failing(false);
        assert_eq!(f.lp.tick().await, TickOutcome::Detected { boxes: 1 });
        assert_eq!(f.lp.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_unrecognized_output_commits_empty_result() {
        let detector = MockDetector::with_outputs(vec![RawOutput::new(vec![0.9; 8], vec![2, 4])]);
        let f = fixture(
            Arc::new(ScriptedSource::new(vec![create_test_frame(0, 0)])),
            detector,
            OverlayConfig::default(),
        );
        f.lp.start_manual();

        assert_eq!(f.lp.tick().await, TickOutcome::Detected { boxes: 0 });
        assert_eq!(f.lp.session().lock().unwrap().cache().update_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_discards_inflight_result() {
        let f = fixture(
            Arc::new(ScriptedSource::new(vec![create_test_frame(0, 0)])),
            MockDetector::with_single_box(0.9, 0.0).with_latency(Duration::from_millis(50)),
            OverlayConfig::default(),
        );
        f.lp.start_manual();

        let lp = f.lp.clone();
        let inflight = tokio::spawn(async move { lp.tick().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.detector.call_count(), 1);

        f.lp.stop();
        assert_eq!(inflight.await.unwrap(), TickOutcome::Discarded);

        let session = f.lp.session();
        assert_eq!(session.lock().unwrap().cache().update_count(), 0);
        assert_eq!(f.lp.stats().discarded, 1);

        assert_eq!(f.lp.tick().await, TickOutcome::Stopped);
        assert_eq!(f.lp.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_reset_discards_inflight_result() {
        let slot = Arc::new(FrameSlot::new());
        slot.push(create_test_frame(0, 0));
        let f = fixture(
            slot,
            MockDetector::with_single_box(0.9, 0.0).with_latency(Duration::from_millis(50)),
            OverlayConfig::default(),
        );
        f.lp.start_manual();

        let lp = f.lp.clone();
        let inflight = tokio::spawn(async move { lp.tick().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.detector.call_count(), 1);

        f.lp.reset_session();
        assert_eq!(inflight.await.unwrap(), TickOutcome::Discarded);

        {
            let session = f.lp.session();
            let session = session.lock().unwrap();
            assert!(session.current().is_empty());
            assert_eq!(session.cache().produced_at(), None);
            assert_eq!(session.stats().discarded, 1);
        }
        assert_eq!(f.lp.state(), LoopState::Running);

        // 被丢弃的那一帧不作为基准，同一画面重新检测
        assert_eq!(f.lp.tick().await, TickOutcome::Detected { boxes: 1 });
        assert_eq!(f.detector.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_retries_static_scene() {
        let slot = Arc::new(FrameSlot::new());
        slot.push(create_test_frame(30, 0));
        let f = fixture(slot, MockDetector::with_single_box(0.9, 0.0), OverlayConfig::default());
        f.lp.start_manual();

        f.detector.set_failing(true);
        assert_eq!(f.lp.tick().await, TickOutcome::Failed);

        f.detector.set_failing(false);
        assert_eq!(f.lp.tick().await, TickOutcome::Detected { boxes: 1 });
        assert_eq!(f.lp.tick().await, TickOutcome::Reused { boxes: 1 });
    }

    #[tokio::test]
    async fn test_start_after_manual_spawns_driver() {
        let slot = Arc::new(FrameSlot::new());
        slot.push(create_test_frame(10, 0));
        let config = OverlayConfig {
            refresh_hz: 500.0,
            ..Default::default()
        };
        let f = fixture(slot, MockDetector::with_single_box(0.9, 0.0), config);

        // 手动模式停止后尚未到边界，此时 start 需要补一个驱动任务
        assert!(f.lp.start_manual());
        f.lp.stop();
        assert!(f.lp.start().unwrap());
        assert!(!f.lp.start().unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(f.lp.stats().ticks > 1);
        assert_eq!(f.lp.state(), LoopState::Running);

        f.lp.stop();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(f.lp.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_start_during_manual_mode_spawns_driver() {
        let slot = Arc::new(FrameSlot::new());
        slot.push(create_test_frame(10, 0));
        let config = OverlayConfig {
            refresh_hz: 500.0,
            ..Default::default()
        };
        let f = fixture(slot, MockDetector::with_single_box(0.9, 0.0), config);

        assert!(f.lp.start_manual());
        assert!(f.lp.start().unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(f.lp.stats().ticks > 1);
        f.lp.stop();
    }

    #[tokio::test]
    async fn test_start_twice_runs_one_loop() {
        let slot = Arc::new(FrameSlot::new());
        slot.push(create_test_frame(10, 0));
        let config = OverlayConfig {
            refresh_hz: 500.0,
            ..Default::default()
        };
        let f = fixture(slot, MockDetector::with_single_box(0.9, 0.0), config);

        assert!(f.lp.start().unwrap());
        assert!(!f.lp.start().unwrap());
        assert_eq!(f.lp.state(), LoopState::Running);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let stats = f.lp.stats();
        assert!(stats.ticks > 1);
        // 静止画面只检测一次
        assert_eq!(stats.detections, 1);
        assert_eq!(f.detector.call_count(), 1);

        f.lp.stop();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(f.lp.state(), LoopState::Stopped);

        let ticks_after_stop = f.lp.stats().ticks;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(f.lp.stats().ticks, ticks_after_stop);

        // 停止后可以重新启动
        assert!(f.lp.start().unwrap());
        f.lp.stop();
    }

    #[test]
    fn test_start_without_runtime_is_not_ready() {
        let f = fixture(
            Arc::new(FrameSlot::new()),
            MockDetector::new(),
            OverlayConfig::default(),
        );
        assert!(matches!(f.lp.start(), Err(OverlayError::NotReady(_))));
        assert_eq!(f.lp.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_reset_session_clears_cache() {
        let f = fixture(
            Arc::new(ScriptedSource::new(vec![
                create_test_frame(10, 0),
                create_test_frame(10, 1),
            ])),
            MockDetector::with_single_box(0.9, 0.0),
            OverlayConfig::default(),
        );
        f.lp.start_manual();
        f.lp.tick().await;
        assert_eq!(f.lp.current().len(), 1);

        f.lp.reset_session();
        assert!(f.lp.current().is_empty());
        // 基准被清空，同一画面重新检测
        assert_eq!(f.lp.tick().await, TickOutcome::Detected { boxes: 1 });
    }
}

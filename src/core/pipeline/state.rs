use std::sync::Mutex;

/// 检测循环状态机，只能通过 start/stop 和轮次边界迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
    StopRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    Start,
    Stop,
    /// 每轮开始时的检查点
    Boundary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// 需要启动新的循环任务
    Spawn,
    /// 停止请求尚未被观察到，原任务继续运行
    Resume,
    /// 作废在途检测结果
    Cancel,
    Continue,
    Exit,
    Ignore,
}

impl LoopState {
    pub fn transition(&self, event: LoopEvent) -> (LoopState, LoopAction) {
        match (self, event) {
            (LoopState::Stopped, LoopEvent::Start) => (LoopState::Running, LoopAction::Spawn),
            (LoopState::Running, LoopEvent::Start) => (LoopState::Running, LoopAction::Ignore),
            (LoopState::StopRequested, LoopEvent::Start) => {
                (LoopState::Running, LoopAction::Resume)
            }

            (LoopState::Running, LoopEvent::Stop) => (LoopState::StopRequested, LoopAction::Cancel),
            (LoopState::StopRequested, LoopEvent::Stop) => {
                (LoopState::StopRequested, LoopAction::Ignore)
            }
            (LoopState::Stopped, LoopEvent::Stop) => (LoopState::Stopped, LoopAction::Ignore),

            (LoopState::Running, LoopEvent::Boundary) => (LoopState::Running, LoopAction::Continue),
            (LoopState::StopRequested, LoopEvent::Boundary) => (LoopState::Stopped, LoopAction::Exit),
            (LoopState::Stopped, LoopEvent::Boundary) => (LoopState::Stopped, LoopAction::Exit),
        }
    }
}

/// 一轮迭代开始时领取的令牌，提交结果前校验
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunToken {
    epoch: u64,
}

#[derive(Debug)]
struct ControlInner {
    state: LoopState,
    epoch: u64,
}

/// 状态机 + 取消纪元，多线程共享
#[derive(Debug)]
pub struct LoopControl {
    inner: Mutex<ControlInner>,
}

impl LoopControl {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ControlInner {
                state: LoopState::Stopped,
                epoch: 0,
            }),
        }
    }

    fn apply(&self, event: LoopEvent) -> (LoopAction, u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let (next, action) = inner.state.transition(event);
        inner.state = next;
        if action == LoopAction::Cancel {
            inner.epoch += 1;
        }
        (action, inner.epoch)
    }

    pub fn start(&self) -> LoopAction {
        self.apply(LoopEvent::Start).0
    }

    pub fn stop(&self) -> LoopAction {
        self.apply(LoopEvent::Stop).0
    }

    /// 轮次边界：仍在运行则领取令牌，否则返回 None 表示任务应退出
    pub fn begin_iteration(&self) -> Option<RunToken> {
        match self.apply(LoopEvent::Boundary) {
            (LoopAction::Continue, epoch) => Some(RunToken { epoch }),
            _ => None,
        }
    }

    /// 作废已发出的令牌但不改变运行状态（会话重置）
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.epoch += 1;
    }

    /// 令牌是否仍然有效（循环在运行且期间没有 stop 过）
    pub fn is_current(&self, token: &RunToken) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.state == LoopState::Running && inner.epoch == token.epoch
    }

    pub fn state(&self) -> LoopState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }
}

impl Default for LoopControl {
    fn default() -> Self {
        Self::new()
    }
}

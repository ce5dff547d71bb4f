//! 自适应检测循环
//!
//! 核心策略：
//! 1. 帧差门控 - 缩略灰度图 + 跨步绝对差，快速过滤无变化帧
//! 2. 单飞检测 - 同一时刻最多一个检测在途
//! 3. 结果缓存 - 跳过检测的帧直接复用上一次结果

pub mod config;
pub mod scheduler;
pub mod session;
pub mod state;

pub use config::OverlayConfig;
pub use scheduler::{DetectionLoop, TickOutcome};
pub use session::{LoopStats, Session};
pub use state::{LoopAction, LoopControl, LoopState, RunToken};

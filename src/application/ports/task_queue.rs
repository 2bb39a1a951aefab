//! Task Queue Port - 本地顺序执行队列
//!
//! 定义任务队列的抽象接口，具体实现在 infrastructure/worker 层

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Task;

/// 本地进程错误
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to start \"{program}\": {reason}")]
    Spawn { program: String, reason: String },

    #[error("\"{program}\" terminated unexpectedly, exit code: {code}")]
    Exit { program: String, code: i32 },
}

impl ProcessError {
    pub fn spawn(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Spawn {
            program: program.into(),
            reason: reason.into(),
        }
    }
}

/// Task Queue Port
///
/// 任务严格按提交顺序逐个执行，任意时刻最多一个外部进程在运行
#[async_trait]
pub trait TaskQueuePort: Send + Sync {
    /// 追加任务；空命令被拒绝（返回 false，不入队）
    fn enqueue(&self, task: Task) -> bool;

    /// 若当前没有 drain 在运行则启动一个，返回是否新启动
    fn run_queued(&self) -> bool;

    /// 终止当前任务的进程树并丢弃所有未开始的任务，返回丢弃数量
    fn cancel_all(&self) -> usize;

    fn pending_len(&self) -> usize;

    fn is_draining(&self) -> bool;

    /// 等待当前 drain 结束
    async fn wait_idle(&self);
}

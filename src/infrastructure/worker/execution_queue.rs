//! Execution Queue - 本地任务顺序执行
//!
//! 任务按提交顺序逐个启动；drain worker 按需启动，队列清空后退出。
//! pending 列表、drain 标志和当前进程句柄由同一把锁保护，
//! 出队和启动在锁内完成，因此 cancel_all 之后不会再有已丢弃的任务被启动。

use async_trait::async_trait;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::application::ports::{ConsolePort, ProcessError, TaskQueuePort};
use crate::domain::{Task, TaskExit};
use crate::infrastructure::process::{ProcessControl, ProcessHandle, ProcessSupervisor};

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Task>,
    draining: bool,
    current: Option<ProcessControl>,
}

struct Inner {
    supervisor: ProcessSupervisor,
    console: Arc<dyn ConsolePort>,
    state: Mutex<QueueState>,
    /// true = 没有 drain 在运行
    idle: watch::Sender<bool>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 本地执行队列
///
/// 克隆共享同一个队列；进程内通常只创建一个
#[derive(Clone)]
pub struct ExecutionQueue {
    inner: Arc<Inner>,
}

impl ExecutionQueue {
    pub fn new(console: Arc<dyn ConsolePort>) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                supervisor: ProcessSupervisor::new(console.clone()),
                console,
                state: Mutex::new(QueueState::default()),
                idle,
            }),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    async fn drain(inner: Arc<Inner>) {
        tracing::debug!("Drain started");
        let mut executed = 0usize;

        loop {
            let (mut task, spawned) = {
                let mut state = inner.lock();
                let Some(task) = state.pending.pop_front() else {
                    state.draining = false;
                    state.current = None;
                    inner.idle.send_replace(true);
                    break;
                };
                let spawned = inner
                    .supervisor
                    .spawn(task.command(), task.working_dir().map(|dir| dir.as_path()));
                if let Ok(handle) = &spawned {
                    state.current = Some(handle.control());
                }
                (task, spawned)
            };

            tracing::info!(task_id = %task.id(), command = ?task.command(), "Task started");
            let exit = Self::await_exit(&inner, spawned).await;
            inner.lock().current = None;

            Self::report(&inner, &task, &exit);
            if let Some(callback) = task.take_callback() {
                if catch_unwind(AssertUnwindSafe(move || callback(exit))).is_err() {
                    inner.console.error(&format!(
                        "Completion callback of \"{}\" panicked",
                        task.program()
                    ));
                }
            }
            executed += 1;
        }

        tracing::debug!(executed = executed, "Drain finished");
    }

    async fn await_exit(inner: &Inner, spawned: Result<ProcessHandle, ProcessError>) -> TaskExit {
        match spawned {
            Ok(handle) => handle.wait().await,
            Err(e) => {
                inner.console.error(&e.to_string());
                let reason = match e {
                    ProcessError::Spawn { reason, .. } => reason,
                    other => other.to_string(),
                };
                TaskExit::SpawnFailed(reason)
            }
        }
    }

    fn report(inner: &Inner, task: &Task, exit: &TaskExit) {
        tracing::info!(task_id = %task.id(), exit = %exit, "Task finished");
        match exit {
            TaskExit::Exited(code) if *code != 0 => {
                let err = ProcessError::Exit {
                    program: task.program().to_string(),
                    code: *code,
                };
                inner.console.error(&err.to_string());
            }
            TaskExit::Terminated => {
                inner
                    .console
                    .warn(&format!("\"{}\" was terminated", task.program()));
            }
            _ => {}
        }
    }
}

#[async_trait]
impl TaskQueuePort for ExecutionQueue {
    fn enqueue(&self, task: Task) -> bool {
        if task.is_empty() {
            tracing::warn!("Rejected empty command");
            return false;
        }
        tracing::debug!(task_id = %task.id(), command = ?task.command(), "Task enqueued");
        self.inner.lock().pending.push_back(task);
        true
    }

    fn run_queued(&self) -> bool {
        {
            let mut state = self.inner.lock();
            if state.draining {
                return false;
            }
            state.draining = true;
            self.inner.idle.send_replace(false);
        }
        tokio::spawn(Self::drain(self.inner.clone()));
        true
    }

    fn cancel_all(&self) -> usize {
        let (discarded, current) = {
            let mut state = self.inner.lock();
            let discarded = state.pending.len();
            state.pending.clear();
            (discarded, state.current.take())
        };

        if let Some(control) = current {
            control.kill_tree();
        }
        tracing::info!(discarded = discarded, "Queue cancelled");
        discarded
    }

    fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    fn is_draining(&self) -> bool {
        self.inner.lock().draining
    }

    async fn wait_idle(&self) {
        let mut rx = self.inner.idle.subscribe();
        // watch 通道只在发送端全部释放时报错，此处 inner 一直持有发送端
        let _ = rx.wait_for(|idle| *idle).await;
    }
}

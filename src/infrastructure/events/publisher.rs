//! Console Publisher Implementation
//!
//! 控制台事件推送实现：子进程输出、远程日志、诊断和传输进度
//! 通过 broadcast 通道分发给所有订阅者（GUI、CLI）

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::ports::{ConsoleLevel, ConsolePort, ProgressPort};

/// 默认通道容量
const DEFAULT_CAPACITY: usize = 1024;

/// 控制台事件类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ConsoleEvent {
    /// 一行控制台文本
    Line { level: ConsoleLevel, text: String },
    /// 单文件上传进度
    FileProgress { file: String, percent: u8 },
    /// 批量上传进度
    BatchProgress { completed: usize, total: usize },
}

impl ConsoleEvent {
    /// 带前缀的显示文本（进度事件返回 None）
    pub fn display_line(&self) -> Option<String> {
        match self {
            ConsoleEvent::Line { level, text } => Some(format!("{}{}", level.prefix(), text)),
            _ => None,
        }
    }
}

/// 控制台事件发布器
pub struct ConsolePublisher {
    channel: broadcast::Sender<ConsoleEvent>,
}

impl ConsolePublisher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { channel: tx }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 订阅控制台事件
    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.channel.subscribe()
    }

    fn publish(&self, event: ConsoleEvent) {
        if let Err(e) = self.channel.send(event) {
            tracing::trace!(error = %e, "Console event dropped (no receivers)");
        }
    }
}

impl Default for ConsolePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsolePort for ConsolePublisher {
    fn emit(&self, level: ConsoleLevel, line: &str) {
        match level {
            ConsoleLevel::Output => tracing::debug!(target: "console", "{}", line),
            ConsoleLevel::Info => tracing::info!("{}", line),
            ConsoleLevel::Warn => tracing::warn!("{}", line),
            ConsoleLevel::Error => tracing::error!("{}", line),
        }

        self.publish(ConsoleEvent::Line {
            level,
            text: line.to_string(),
        });
    }
}

impl ProgressPort for ConsolePublisher {
    fn file_progress(&self, file_name: &str, percent: u8) {
        self.publish(ConsoleEvent::FileProgress {
            file: file_name.to_string(),
            percent,
        });
    }

    fn batch_progress(&self, completed: usize, total: usize) {
        self.publish(ConsoleEvent::BatchProgress { completed, total });
    }
}

/// 取出接收器中当前已有的全部事件（测试与批量显示使用）
pub fn drain_events(rx: &mut broadcast::Receiver<ConsoleEvent>) -> Vec<ConsoleEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped = skipped, "Console receiver lagged");
            }
            Err(_) => break,
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_lines_and_progress() {
        let publisher = ConsolePublisher::new();
        let mut rx = publisher.subscribe();

        publisher.output("hello");
        publisher.error("boom");
        publisher.file_progress("a.wav", 50);
        publisher.batch_progress(1, 2);

        let events = drain_events(&mut rx);
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].display_line().as_deref(), Some("hello"));
        assert_eq!(events[1].display_line().as_deref(), Some("[ERROR] boom"));
        assert_eq!(
            events[2],
            ConsoleEvent::FileProgress {
                file: "a.wav".to_string(),
                percent: 50
            }
        );
        assert!(events[3].display_line().is_none());
    }

    #[test]
    fn test_publish_without_receivers_is_silent() {
        let publisher = ConsolePublisher::with_capacity(0);
        publisher.info("nobody listening");
    }
}

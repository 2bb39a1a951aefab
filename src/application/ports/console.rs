//! Console Port - 控制台输出与传输进度
//!
//! 子进程输出、远程日志回传和所有诊断信息都汇入控制台；
//! 具体实现在 infrastructure/events 层

use serde::{Deserialize, Serialize};

/// 控制台行类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleLevel {
    /// 子进程或远程 worker 的原始输出
    Output,
    Info,
    Warn,
    Error,
}

impl ConsoleLevel {
    /// 诊断前缀，原始输出不加前缀
    pub fn prefix(&self) -> &'static str {
        match self {
            ConsoleLevel::Output => "",
            ConsoleLevel::Info => "[INFO] ",
            ConsoleLevel::Warn => "[WARNING] ",
            ConsoleLevel::Error => "[ERROR] ",
        }
    }
}

/// Console Port
pub trait ConsolePort: Send + Sync {
    fn emit(&self, level: ConsoleLevel, line: &str);

    fn output(&self, line: &str) {
        self.emit(ConsoleLevel::Output, line);
    }

    fn info(&self, line: &str) {
        self.emit(ConsoleLevel::Info, line);
    }

    fn warn(&self, line: &str) {
        self.emit(ConsoleLevel::Warn, line);
    }

    fn error(&self, line: &str) {
        self.emit(ConsoleLevel::Error, line);
    }
}

/// Progress Port
///
/// 单文件进度为百分比（每个文件从 0 重新计数），批量进度为已完成文件数
pub trait ProgressPort: Send + Sync {
    fn file_progress(&self, file_name: &str, percent: u8);

    fn batch_progress(&self, _completed: usize, _total: usize) {}
}

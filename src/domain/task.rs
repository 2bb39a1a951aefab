//! Task - 排队执行的外部命令

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// 任务完成回调，只会被调用一次
pub type CompletionCallback = Box<dyn FnOnce(TaskExit) + Send + 'static>;

/// 任务结束状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskExit {
    /// 进程正常退出，携带退出码
    Exited(i32),
    /// 进程被信号/强制终止（取消）
    Terminated,
    /// 进程未能启动
    SpawnFailed(String),
}

impl TaskExit {
    pub fn success(&self) -> bool {
        matches!(self, TaskExit::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            TaskExit::Exited(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for TaskExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskExit::Exited(code) => write!(f, "exit code {}", code),
            TaskExit::Terminated => write!(f, "terminated"),
            TaskExit::SpawnFailed(reason) => write!(f, "spawn failed: {}", reason),
        }
    }
}

/// 排队任务
///
/// 入队后不可变；由 drain worker 恰好消费一次，回调执行后丢弃
pub struct Task {
    id: Uuid,
    command: Vec<String>,
    working_dir: Option<PathBuf>,
    on_complete: Option<CompletionCallback>,
    created_at: DateTime<Utc>,
}

impl Task {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Uuid::new_v4(),
            command: command.into_iter().map(Into::into).collect(),
            working_dir: None,
            on_complete: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(TaskExit) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_empty(&self) -> bool {
        self.command.is_empty()
    }

    /// 可执行文件名（跳过前缀环境变量），用于诊断输出
    pub fn program(&self) -> &str {
        self.command
            .iter()
            .find(|arg| parse_env_assignment(arg).is_none())
            .map(|arg| arg.as_str())
            .unwrap_or("")
    }

    /// 取出回调；None 表示调用方未注册回调
    pub(crate) fn take_callback(&mut self) -> Option<CompletionCallback> {
        self.on_complete.take()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("working_dir", &self.working_dir)
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}

/// 解析 `KEY=VALUE` 形式的前缀环境变量
///
/// KEY 必须是合法的环境变量名（字母或下划线开头）
pub fn parse_env_assignment(arg: &str) -> Option<(&str, &str)> {
    let (key, value) = arg.split_once('=')?;
    let mut chars = key.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key, value))
}

/// 将命令拆分为前缀环境变量和真正的 argv
pub fn split_env_prefix(command: &[String]) -> (Vec<(&str, &str)>, &[String]) {
    let mut envs = Vec::new();
    for (i, arg) in command.iter().enumerate() {
        match parse_env_assignment(arg) {
            Some(pair) => envs.push(pair),
            None => return (envs, &command[i..]),
        }
    }
    (envs, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_assignment() {
        assert_eq!(
            parse_env_assignment("CUDA_VISIBLE_DEVICES=0"),
            Some(("CUDA_VISIBLE_DEVICES", "0"))
        );
        assert_eq!(parse_env_assignment("--out=dir"), None);
        assert_eq!(parse_env_assignment("9X=1"), None);
        assert_eq!(parse_env_assignment("python"), None);
    }

    #[test]
    fn test_split_env_prefix() {
        let command: Vec<String> = vec!["A=1".into(), "B=2".into(), "python".into(), "X=3".into()];
        let (envs, argv) = split_env_prefix(&command);
        assert_eq!(envs, vec![("A", "1"), ("B", "2")]);
        assert_eq!(argv, &command[2..]);
    }

    #[test]
    fn test_program_skips_env_prefix() {
        let task = Task::new(["CUDA_VISIBLE_DEVICES=1", "python", "train.py"]);
        assert_eq!(task.program(), "python");
        assert!(!task.is_empty());
        assert!(Task::new(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_task_exit() {
        assert!(TaskExit::Exited(0).success());
        assert!(!TaskExit::Exited(2).success());
        assert_eq!(TaskExit::Exited(2).code(), Some(2));
        assert_eq!(TaskExit::Terminated.code(), None);
    }
}

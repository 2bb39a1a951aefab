//! 应用层错误定义
//!
//! 统一的流水线动作错误类型

use thiserror::Error;

use crate::application::ports::{ProcessError, RemoteError, WorkspaceError};

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 验证错误（缺少输入文件、没有可用模型等）
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 本地进程错误
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// 远程交互错误
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// 工作区错误
    #[error("Workspace error: {0}")]
    WorkspaceError(String),

    /// 状态无效
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ApplicationError {
    /// 创建验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// 创建状态无效错误
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// 远程端点是否已失效
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_connection_lost())
    }
}

impl From<WorkspaceError> for ApplicationError {
    fn from(err: WorkspaceError) -> Self {
        Self::WorkspaceError(err.to_string())
    }
}

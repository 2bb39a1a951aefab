//! Remote Worker Port - 远程 worker 控制
//!
//! 定义远程委派的抽象接口，具体实现在 infrastructure/remote 层

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use super::console::ProgressPort;
use crate::domain::{FileUsage, Instruction, RemoteEndpoint, TrainingConfig};

/// 远程交互错误
#[derive(Debug, Error)]
pub enum RemoteError {
    /// 连接失败；端点应视为失效，需要重新连接
    #[error("Cannot connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// 传输中途的 I/O 故障
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// 响应格式错误
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 客户端已关闭
    #[error("Remote connection closed")]
    Closed,
}

impl RemoteError {
    pub fn connect(endpoint: impl ToString, reason: impl ToString) -> Self {
        Self::Connect {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// 是否意味着端点失效
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, RemoteError::Connect { .. } | RemoteError::Closed)
    }
}

/// Remote Worker Port
///
/// 每次操作独立建立连接、完成一次请求/响应后关闭；客户端只保存端点身份
#[async_trait]
pub trait RemoteWorkerPort: Send + Sync {
    fn endpoint(&self) -> &RemoteEndpoint;

    /// 端点仍可用（未关闭、未发生连接错误）
    fn is_alive(&self) -> bool;

    /// 发送一条指令，并把响应流逐行转发到控制台直到对端关闭
    async fn send_instruction(&self, instruction: &Instruction) -> Result<(), RemoteError>;

    /// GET_CONF：获取远端训练配置
    async fn fetch_config(&self) -> Result<TrainingConfig, RemoteError>;

    /// GET_RESULTS：拉取结果文件写入 destination，返回写入的文件数
    async fn fetch_results(&self, destination: &Path) -> Result<usize, RemoteError>;

    /// 通过文件传输通道上传单个文件，返回发送的字节数
    async fn transfer(
        &self,
        usage: FileUsage,
        file: &Path,
        progress: &dyn ProgressPort,
    ) -> Result<u64, RemoteError>;

    /// 幂等关闭
    fn close(&self);
}

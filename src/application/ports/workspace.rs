//! Workspace Port - 本地工作区文件访问
//!
//! 本地模式下的配置读写、检查点查找、推理输入暂存；
//! 具体实现在 infrastructure/adapters/storage 层

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::{ClearTarget, TrainingConfig};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid config document: {0}")]
    InvalidConfig(String),
}

/// 可清理条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearableEntry {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Workspace Port
#[async_trait]
pub trait WorkspacePort: Send + Sync {
    /// 读取训练配置：日志目录中的副本优先，否则读 configs/config.json
    async fn load_training_config(&self) -> Result<TrainingConfig, WorkspaceError>;

    /// 写回 configs/config.json
    async fn save_training_config(&self, config: &TrainingConfig) -> Result<(), WorkspaceError>;

    /// 是否处于续训状态（日志目录已有配置副本）
    async fn is_resuming(&self) -> bool;

    /// 步数最大的生成器检查点
    async fn latest_generator_checkpoint(&self) -> Result<Option<PathBuf>, WorkspaceError>;

    /// 切片输出目录下是否至少有一个说话人目录
    async fn has_sliced_speakers(&self) -> Result<bool, WorkspaceError>;

    /// 清理目标下需要删除的条目
    async fn clearable_entries(&self, target: ClearTarget)
        -> Result<Vec<ClearableEntry>, WorkspaceError>;

    /// 将推理输入复制到推理输入目录，返回复制后的文件名
    async fn stage_inference_inputs(&self, files: &[PathBuf]) -> Result<Vec<String>, WorkspaceError>;

    /// 确保目录存在
    async fn ensure_dir(&self, dir: &Path) -> Result<(), WorkspaceError>;
}

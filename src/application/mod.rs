//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（Console、TaskQueue、RemoteWorker、Workspace）
//! - commands: 流水线动作命令及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod ports;

// Re-exports
pub use commands::{
    handlers::{PipelineHandler, PipelineSettings},
    ActionOutcome, ClearCommand, InferCommand, PreprocessCommand, SliceCommand, TrainCommand,
};

pub use error::ApplicationError;

pub use ports::{
    // Console
    ConsoleLevel,
    ConsolePort,
    ProgressPort,
    // Task queue
    ProcessError,
    TaskQueuePort,
    // Remote worker
    RemoteError,
    RemoteWorkerPort,
    // Workspace
    ClearableEntry,
    WorkspaceError,
    WorkspacePort,
};

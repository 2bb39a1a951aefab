//! sovits-agent - 语音模型流水线的任务执行与远程委派
//!
//! 架构设计: Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - 任务、远程指令、端点地址、训练配置、工作区布局
//!
//! 应用层 (application/):
//! - Ports: 端口定义（Console, TaskQueue, RemoteWorker, Workspace）
//! - Commands: 流水线动作（切片、预处理、训练、推理、清理、中止）
//!
//! 基础设施层 (infrastructure/):
//! - Process: 子进程启动与进程树终止
//! - Worker: 顺序执行队列
//! - Remote: 控制通道、文件传输通道、结果回传通道
//! - Adapters: 本地工作区
//! - Events: 控制台事件发布

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};

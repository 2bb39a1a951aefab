//! 应用层 - 命令
//!
//! 流水线动作命令及其处理器

mod pipeline_commands;

pub mod handlers;

pub use pipeline_commands::*;

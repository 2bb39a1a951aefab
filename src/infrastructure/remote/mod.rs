//! Remote Layer - 远程 worker 委派
//!
//! - client: 控制连接（指令、配置、结果）
//! - file_transfer: 文件上传通道
//! - result_retrieval: 结果文件接收
//! - framing: 长度前缀帧

mod client;
mod file_transfer;
mod framing;
mod result_retrieval;

pub use client::{RemoteClientConfig, TcpRemoteClient};
pub use framing::{read_frame, write_frame, MAX_FRAME_LEN};

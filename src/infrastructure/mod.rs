//! Infrastructure Layer - 基础设施层
//!
//! 提供所有端口的具体实现

pub mod adapters;
pub mod events;
pub mod process;
pub mod remote;
pub mod worker;

pub use adapters::FileWorkspace;
pub use events::{ConsoleEvent, ConsolePublisher};
pub use process::{ProcessControl, ProcessHandle, ProcessSupervisor};
pub use remote::{RemoteClientConfig, TcpRemoteClient};
pub use worker::ExecutionQueue;

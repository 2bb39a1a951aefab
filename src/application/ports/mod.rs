//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod console;
mod remote_worker;
mod task_queue;
mod workspace;

pub use console::{ConsoleLevel, ConsolePort, ProgressPort};
pub use remote_worker::{RemoteError, RemoteWorkerPort};
pub use task_queue::{ProcessError, TaskQueuePort};
pub use workspace::{ClearableEntry, WorkspaceError, WorkspacePort};

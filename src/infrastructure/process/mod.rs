//! Process Layer - 外部进程启动与进程树终止

mod kill_tree;
mod supervisor;

pub use kill_tree::kill_tree;
pub use supervisor::{ProcessControl, ProcessHandle, ProcessSupervisor};

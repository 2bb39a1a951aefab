//! Worker Layer - 本地任务顺序执行

mod execution_queue;

pub use execution_queue::ExecutionQueue;

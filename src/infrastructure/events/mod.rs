//! Events Layer - 控制台事件推送
//!
//! - publisher: broadcast 控制台事件
//! - relay: 字节流逐行转发

mod publisher;
mod relay;

pub use publisher::{drain_events, ConsoleEvent, ConsolePublisher};
pub use relay::{decode_line, relay_lines, relay_lines_with_idle_timeout};

//! Command Handlers 实现

mod pipeline_handlers;

pub use pipeline_handlers::*;

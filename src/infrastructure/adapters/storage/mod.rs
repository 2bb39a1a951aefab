//! Storage Adapters

mod file_workspace;

pub use file_workspace::FileWorkspace;

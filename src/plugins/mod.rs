//! Plugin registry and dependency resolution
//!
//! # Overview
//!
//! - **Plugin**: id, dependencies, plugin data and an init function
//! - **DependencyGraph**: Kahn's algorithm with registration-order tie breaks

pub mod plugin;
pub mod resolver;

// Re-export all public types for convenience
pub use plugin::{Plugin, PluginInit};
pub use resolver::DependencyGraph;

//! Data manager host and plugin data
//!
//! # Overview
//!
//! - **DataManager**: trait for components that own mutable domain state
//! - **DataManagerHandle**: typed reference issued at registration
//! - **MutationScope**: collects the events and plans of one mutation
//! - **PluginData / PluginDataSet**: immutable configuration snapshots

pub mod manager;
pub mod plugin_data;

// Re-export all public types for convenience
pub use manager::{DataManager, DataManagerHandle, DataManagerRegistry, MutationScope};
pub use plugin_data::{downcast_plugin_data, PluginData, PluginDataAny, PluginDataSet};

pub(crate) use manager::ErasedDataManager;

//! Core identifiers and configuration
//!
//! # Overview
//!
//! - **Identifiers**: typed ids for plugins, reports, components, entities
//!   and scenarios
//! - **Configuration**: experiment configuration with validation and CLI support
//!
//! # Usage Example
//!
//! ```rust
//! use agent_sim_kernel::types::*;
//!
//! let plugin = PluginId::new("disease");
//! assert_eq!(plugin.as_str(), "disease");
//! assert_eq!(EntityId(7).to_string(), "7");
//!
//! let config = ExperimentConfig {
//!     population_size: 200,
//!     replicates: 3,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

pub mod config;
pub mod identifiers;

// Re-export all public types for convenience
pub use config::*;
pub use identifiers::*;

//! Typed event bus with label-based selective dispatch
//!
//! This module holds the event marker trait, labels and labelers, the
//! subscriber registry and the cached indexes that are refreshed from events.
//!
//! # Overview
//!
//! - **Event**: any `'static + Debug` value describing a completed change
//! - **EventLabel / EventLabeler**: targeted dispatch keys computed per event
//! - **EventBus**: subscribers by event type and by label
//! - **CachedIndexSpec / CachedIndex**: entity subsets kept current through
//!   declared event sensitivities
//!
//! # Usage Example
//!
//! ```rust
//! use agent_sim_kernel::events::*;
//!
//! #[derive(Debug)]
//! struct Infected { region: i64 }
//!
//! // Subscribers to this label only see infections in region 7
//! let labeler = EventLabeler::new("region", |_, e: &Infected| LabelKey::Int(e.region));
//! let label = EventLabel::new::<Infected>("region", 7i64);
//! assert_eq!(label.labeler_id(), labeler.id());
//! ```

pub mod bus;
pub mod event;
pub mod label;
pub mod sensitivity;

// Re-export all public types for convenience
pub use bus::EventBus;
pub use event::Event;
pub use label::{EventLabel, EventLabeler, LabelKey, LabelerId};
pub use sensitivity::{CachedIndex, CachedIndexSpec};

pub(crate) use bus::EventHandler;

//! Identifier types for the simulation kernel
//!
//! Plugins and reports are named by strings chosen by the model author.
//! Actors and data managers are numbered by the kernel in registration order,
//! which is deterministic for a given plugin set, so their ids are stable
//! across runs of the same scenario.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a plugin
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    /// Create a plugin id from a name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The plugin name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PLUGIN_{}", self.0)
    }
}

impl From<&str> for PluginId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identifier of a report; also the stem of the report's output file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    /// Create a report id from a name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The report name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "REPORT_{}", self.0)
    }
}

impl From<&str> for ReportId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Kernel-assigned identifier of an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub usize);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ACTOR_{}", self.0)
    }
}

/// Kernel-assigned identifier of a data manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataManagerId(pub usize);

impl fmt::Display for DataManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DM_{}", self.0)
    }
}

/// Kernel-assigned identifier of a cached index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexId(pub usize);

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "INDEX_{}", self.0)
    }
}

/// Identifier of an entity in a model population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a scenario within an experiment
///
/// Displayed as the bare number because it is the first column of every
/// output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub usize);

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The component that owns a plan or a subscription
///
/// Plan keys and duplicate-subscription checks are scoped by component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentId {
    /// An actor
    Actor(ActorId),
    /// A data manager
    DataManager(DataManagerId),
    /// A report
    Report(ReportId),
    /// A kernel-maintained cached index
    Index(IndexId),
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentId::Actor(id) => write!(f, "{}", id),
            ComponentId::DataManager(id) => write!(f, "{}", id),
            ComponentId::Report(id) => write!(f, "{}", id),
            ComponentId::Index(id) => write!(f, "{}", id),
        }
    }
}

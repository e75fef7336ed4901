//! Error types and handling
//!
//! Two tiers of failure exist inside a simulation:
//!
//! - [`ContractError`]: a precondition violation (bad argument, unknown id,
//!   duplicate key, out-of-range value). It aborts the current scenario only.
//! - [`StructuralError`]: a wiring bug (cyclic plugin dependency, ambiguous
//!   data manager, duplicate labeler). It is detected before simulation time
//!   advances and is fatal to the whole experiment.

use crate::events::LabelerId;
use crate::types::{PluginId, ReportId};
use std::fmt;
use thiserror::Error;

/// Enumerated kinds of contract violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractErrorKind {
    /// A plan time is earlier than the current time or not finite
    InvalidTime,
    /// A plan key is already in use by a pending plan of the same component
    DuplicatePlanKey,
    /// Restored plan data has no registered converter
    UnknownPlanDataType,
    /// The same subscriber registered twice for the same event type or label
    DuplicateSubscription,
    /// A label names a labeler that is not registered
    UnknownLabeler,
    /// No data manager of the requested type or handle exists
    UnknownDataManager,
    /// The data manager is currently initializing or mutating
    DataManagerUnavailable,
    /// A data manager was initialized a second time
    DataManagerAlreadyInitialized,
    /// A cached index id is unknown
    UnknownIndex,
    /// A report row does not match its header
    InvalidReportItem,
    /// A report released rows under two different headers
    ReportHeaderMismatch,
    /// A plugin data value was missing or of the wrong type
    MissingPluginData,
    /// An entity id is not part of the population
    UnknownEntity,
    /// A value is out of its permitted range
    InvalidValue,
    /// A dimension or scenario definition is malformed
    InvalidDimension,
}

impl fmt::Display for ContractErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ContractErrorKind::InvalidTime => "invalid plan time",
            ContractErrorKind::DuplicatePlanKey => "duplicate plan key",
            ContractErrorKind::UnknownPlanDataType => "unknown plan data type",
            ContractErrorKind::DuplicateSubscription => "duplicate subscription",
            ContractErrorKind::UnknownLabeler => "unknown labeler",
            ContractErrorKind::UnknownDataManager => "unknown data manager",
            ContractErrorKind::DataManagerUnavailable => "data manager unavailable",
            ContractErrorKind::DataManagerAlreadyInitialized => "data manager already initialized",
            ContractErrorKind::UnknownIndex => "unknown cached index",
            ContractErrorKind::InvalidReportItem => "invalid report item",
            ContractErrorKind::ReportHeaderMismatch => "report header mismatch",
            ContractErrorKind::MissingPluginData => "missing plugin data",
            ContractErrorKind::UnknownEntity => "unknown entity",
            ContractErrorKind::InvalidValue => "invalid value",
            ContractErrorKind::InvalidDimension => "invalid dimension",
        };
        f.write_str(text)
    }
}

/// A precondition violation carrying its enumerated kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct ContractError {
    /// What kind of contract was violated
    pub kind: ContractErrorKind,
    /// Human readable detail
    pub detail: String,
}

impl ContractError {
    /// Create a contract error
    pub fn new(kind: ContractErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }
}

/// Wiring failures detected before any simulation time advances
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    /// The plugin dependency graph contains a cycle
    #[error("Cyclic plugin dependency among: {}", join_ids(.involved))]
    CyclicDependency {
        /// Plugins that could not be ordered
        involved: Vec<PluginId>,
    },

    /// A plugin depends on a plugin that was never registered
    #[error("Plugin {plugin} depends on unregistered plugin {dependency}")]
    MissingPluginDependency {
        /// The dependent plugin
        plugin: PluginId,
        /// The missing dependency
        dependency: PluginId,
    },

    /// Two plugins were registered with the same id
    #[error("Plugin {0} registered more than once")]
    DuplicatePlugin(PluginId),

    /// A type lookup matched more than one data manager
    #[error("Data manager lookup for {type_name} is ambiguous ({count} registered)")]
    AmbiguousDataManager {
        /// Requested type
        type_name: &'static str,
        /// Number of matching managers
        count: usize,
    },

    /// A lookup during initialization was not backed by an initialized dependency
    #[error("Data manager {type_name} requested by {requester} is not provided by an initialized dependency")]
    UnresolvedDataManagerDependency {
        /// The plugin performing the lookup
        requester: PluginId,
        /// Requested type
        type_name: &'static str,
    },

    /// A labeler id was registered twice for the same event type
    #[error("Labeler {labeler} registered more than once")]
    DuplicateLabeler {
        /// The offending labeler
        labeler: LabelerId,
    },

    /// Two reports were registered with the same id
    #[error("Report {0} registered more than once")]
    DuplicateReport(ReportId),
}

fn join_ids(ids: &[PluginId]) -> String {
    ids.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", ")
}

/// Errors that can occur while building or running a simulation
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Precondition violation
    #[error("Contract violation: {0}")]
    Contract(#[from] ContractError),

    /// Wiring failure
    #[error("Structural failure: {0}")]
    Structural(#[from] StructuralError),

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A scenario panicked; caught at the scenario boundary
    #[error("Scenario panicked: {0}")]
    Panicked(String),
}

impl SimulationError {
    /// Create a contract error
    pub fn contract(kind: ContractErrorKind, detail: impl Into<String>) -> Self {
        Self::Contract(ContractError::new(kind, detail))
    }

    /// The contract kind, if this is a contract violation
    pub fn contract_kind(&self) -> Option<ContractErrorKind> {
        match self {
            SimulationError::Contract(error) => Some(error.kind),
            _ => None,
        }
    }

    /// Whether this is a wiring failure that must abort the experiment
    pub fn is_structural(&self) -> bool {
        matches!(self, SimulationError::Structural(_))
    }

    /// Check if sibling scenarios may continue after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            SimulationError::Contract(_) => true,
            SimulationError::Structural(_) => false,
            SimulationError::IoError(_) => true,
            SimulationError::SerializationError(_) => true,
            SimulationError::Panicked(_) => true,
        }
    }

    /// Get the error category
    pub fn category(&self) -> &'static str {
        match self {
            SimulationError::Contract(_) => "Contract",
            SimulationError::Structural(_) => "Structural",
            SimulationError::IoError(_) => "IO",
            SimulationError::SerializationError(_) => "Serialization",
            SimulationError::Panicked(_) => "Panic",
        }
    }
}

/// Result type for simulation operations
pub type SimulationResult<T> = Result<T, SimulationError>;

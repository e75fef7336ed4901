//! Experiment-level errors
//!
//! Scenario failures that sibling scenarios survive are recorded as
//! `Failed` and never surface here. An [`ExperimentError`] means the
//! experiment as a whole stopped.

use std::path::PathBuf;
use thiserror::Error;

use crate::simulation::{ContractError, StructuralError};
use crate::types::ScenarioId;

/// Errors that stop an experiment
#[derive(Debug, Error)]
pub enum ExperimentError {
    /// A scenario hit a wiring failure
    #[error("Scenario {scenario} failed structurally: {source}")]
    Structural {
        /// Scenario that surfaced the failure
        scenario: ScenarioId,
        /// The failure
        source: StructuralError,
    },

    /// Dimensions or composition could not be expanded
    #[error("Invalid experiment definition: {0}")]
    InvalidDefinition(#[from] ContractError),

    /// A scenario failed while `halt_on_failure` was set
    #[error("Scenario {scenario} failed and halt on failure is set: {detail}")]
    HaltedOnFailure {
        /// Scenario that failed
        scenario: ScenarioId,
        /// Failure detail
        detail: String,
    },

    /// The progress log belongs to a different experiment
    #[error(
        "Progress log describes {found_scenarios} scenarios with seed {found_seed}, \
         expected {expected_scenarios} with seed {expected_seed}"
    )]
    ProgressMismatch {
        /// Scenarios in this experiment
        expected_scenarios: usize,
        /// Scenarios recorded in the log
        found_scenarios: usize,
        /// Master seed of this experiment
        expected_seed: u64,
        /// Master seed recorded in the log
        found_seed: u64,
    },

    /// A complete line of the progress log could not be parsed
    #[error("Corrupt progress log {path:?} at line {line}: {reason}")]
    CorruptProgressLog {
        /// Log file
        path: PathBuf,
        /// One-based line number
        line: usize,
        /// Parse failure
        reason: String,
    },

    /// The worker pool could not be started
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExperimentError {
    /// Get the error category
    pub fn category(&self) -> &'static str {
        match self {
            ExperimentError::Structural { .. } => "Structural",
            ExperimentError::InvalidDefinition(_) => "Definition",
            ExperimentError::HaltedOnFailure { .. } => "Halted",
            ExperimentError::ProgressMismatch { .. } | ExperimentError::CorruptProgressLog { .. } => "Progress",
            ExperimentError::ThreadPool(_) => "ThreadPool",
            ExperimentError::Io(_) => "IO",
            ExperimentError::Serialization(_) => "Serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PluginId;

    #[test]
    fn test_structural_error_names_scenario() {
        let error = ExperimentError::Structural {
            scenario: ScenarioId(4),
            source: StructuralError::DuplicatePlugin(PluginId::new("people")),
        };
        assert_eq!(error.to_string(), "Scenario 4 failed structurally: Plugin PLUGIN_people registered more than once");
        assert_eq!(error.category(), "Structural");
    }

    #[test]
    fn test_progress_mismatch_display() {
        let error = ExperimentError::ProgressMismatch {
            expected_scenarios: 4,
            found_scenarios: 2,
            expected_seed: 1,
            found_seed: 1,
        };
        assert!(error.to_string().contains("expected 4"));
        assert_eq!(error.category(), "Progress");
    }
}

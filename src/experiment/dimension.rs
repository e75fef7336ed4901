//! Experiment dimensions
//!
//! A dimension is one axis of variation. Each level is a function that
//! rewrites a copy of the base plugin data and returns the values of the
//! dimension's metadata columns for that level.

use std::fmt;
use std::sync::Arc;

use crate::data::PluginDataSet;
use crate::simulation::{ContractError, ContractErrorKind};

/// Applies one level of a dimension to a scenario's plugin data
pub type LevelFn = Arc<dyn Fn(&mut PluginDataSet) -> Result<Vec<String>, ContractError> + Send + Sync>;

/// One axis of an experiment
///
/// ```rust
/// use agent_sim_kernel::experiment::Dimension;
///
/// let dimension = Dimension::new("beta", ["beta"])
///     .with_level(|_| Ok(vec!["0.1".into()]))
///     .with_level(|_| Ok(vec!["0.2".into()]));
/// assert_eq!(dimension.level_count(), 2);
/// ```
#[derive(Clone)]
pub struct Dimension {
    name: String,
    meta_columns: Vec<String>,
    levels: Vec<LevelFn>,
}

impl Dimension {
    /// Create a dimension with its metadata column names and no levels
    pub fn new<I, S>(name: impl Into<String>, meta_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            meta_columns: meta_columns.into_iter().map(Into::into).collect(),
            levels: Vec::new(),
        }
    }

    /// Append a level
    pub fn with_level<F>(mut self, level: F) -> Self
    where
        F: Fn(&mut PluginDataSet) -> Result<Vec<String>, ContractError> + Send + Sync + 'static,
    {
        self.levels.push(Arc::new(level));
        self
    }

    /// Dimension name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metadata column names this dimension contributes
    pub fn meta_columns(&self) -> &[String] {
        &self.meta_columns
    }

    /// Number of levels
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub(crate) fn validate(&self) -> Result<(), ContractError> {
        if self.levels.is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidDimension,
                format!("dimension '{}' has no levels", self.name),
            ));
        }
        if let Some(column) = self.meta_columns.iter().find(|c| c.is_empty() || c.contains(['\t', '\n', '\r'])) {
            return Err(ContractError::new(
                ContractErrorKind::InvalidDimension,
                format!("dimension '{}' has an invalid column name {:?}", self.name, column),
            ));
        }
        Ok(())
    }

    /// Apply `level` to `data` and return its metadata values
    pub(crate) fn apply(&self, level: usize, data: &mut PluginDataSet) -> Result<Vec<String>, ContractError> {
        let apply = self.levels.get(level).ok_or_else(|| {
            ContractError::new(
                ContractErrorKind::InvalidDimension,
                format!("dimension '{}' has no level {}", self.name, level),
            )
        })?;
        let values = apply(data)?;
        if values.len() != self.meta_columns.len() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidDimension,
                format!(
                    "level {} of '{}' returned {} values for {} columns",
                    level,
                    self.name,
                    values.len(),
                    self.meta_columns.len()
                ),
            ));
        }
        if let Some(value) = values.iter().find(|value| value.contains(['\t', '\n', '\r'])) {
            return Err(ContractError::new(
                ContractErrorKind::InvalidDimension,
                format!("level {} of '{}' has value {:?} containing a delimiter", level, self.name, value),
            ));
        }
        Ok(values)
    }
}

impl fmt::Debug for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dimension")
            .field("name", &self.name)
            .field("meta_columns", &self.meta_columns)
            .field("levels", &self.levels.len())
            .finish()
    }
}

//! Immutable plugin configuration snapshots
//!
//! A plugin data value is a plain immutable struct produced by a fallible
//! builder. The same value type seeds a simulation and, when state recording
//! is enabled, describes a data manager's state at the end of a run.

use indexmap::IndexMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::simulation::{ContractError, ContractErrorKind};
use crate::types::PluginId;

/// Type-erasure helpers backing [`PluginData`]
///
/// Implemented for every `'static + PartialEq` type; there is no need to
/// implement it by hand.
pub trait PluginDataAny: Any {
    /// Upcast for downcasting to the concrete data type
    fn as_any(&self) -> &dyn Any;

    /// Structural equality against another erased value
    fn dyn_eq(&self, other: &dyn Any) -> bool;

    /// Concrete type name, for diagnostics
    fn data_type_name(&self) -> &'static str;
}

impl<T: Any + PartialEq> PluginDataAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }

    fn data_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Immutable, versioned snapshot of a plugin's configuration or state
pub trait PluginData: PluginDataAny + fmt::Debug + Send + Sync {
    /// Schema version of the value
    fn version(&self) -> u32 {
        1
    }
}

impl PartialEq for dyn PluginData {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other.as_any())
    }
}

/// Downcast erased plugin data to its concrete type
pub fn downcast_plugin_data<T: PluginData>(data: &dyn PluginData) -> Option<&T> {
    data.as_any().downcast_ref::<T>()
}

/// Plugin data values keyed by the plugin they configure
///
/// Each plugin holds at most one value per concrete data type. Registration
/// order is kept so that iteration is deterministic.
#[derive(Debug, Clone, Default)]
pub struct PluginDataSet {
    entries: IndexMap<PluginId, Vec<Arc<dyn PluginData>>>,
}

impl PluginDataSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any value of the same type for that plugin
    pub fn insert<T: PluginData>(&mut self, plugin: PluginId, data: T) {
        self.insert_arc(plugin, Arc::new(data));
    }

    /// Insert an already shared value
    pub fn insert_arc(&mut self, plugin: PluginId, data: Arc<dyn PluginData>) {
        let values = self.entries.entry(plugin).or_default();
        let incoming = (*data).as_any().type_id();
        match values.iter_mut().find(|value| (***value).as_any().type_id() == incoming) {
            Some(slot) => *slot = data,
            None => values.push(data),
        }
    }

    /// Value of type `T` for `plugin`
    pub fn get<T: PluginData>(&self, plugin: &PluginId) -> Option<&T> {
        self.entries
            .get(plugin)?
            .iter()
            .find_map(|value| downcast_plugin_data::<T>(&**value))
    }

    /// Like [`get`](Self::get) but a missing value is a contract error
    pub fn require<T: PluginData>(&self, plugin: &PluginId) -> Result<&T, ContractError> {
        self.get::<T>(plugin).ok_or_else(|| {
            ContractError::new(
                ContractErrorKind::MissingPluginData,
                format!("{} has no {}", plugin, std::any::type_name::<T>()),
            )
        })
    }

    /// All values for `plugin`, in insertion order
    pub fn for_plugin(&self, plugin: &PluginId) -> &[Arc<dyn PluginData>] {
        self.entries.get(plugin).map_or(&[], Vec::as_slice)
    }

    /// Plugins with at least one value
    pub fn plugin_ids(&self) -> impl Iterator<Item = &PluginId> {
        self.entries.keys()
    }

    /// Total number of values
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for PluginDataSet {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|(plugin, values)| {
                let theirs = other.for_plugin(plugin);
                values.len() == theirs.len()
                    && values.iter().zip(theirs).all(|(a, b)| **a == **b)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Population {
        size: usize,
    }

    impl PluginData for Population {}

    #[derive(Debug, Clone, PartialEq)]
    struct Rates {
        beta: u32,
    }

    impl PluginData for Rates {
        fn version(&self) -> u32 {
            2
        }
    }

    #[test]
    fn test_insert_replaces_same_type() {
        let people = PluginId::new("people");
        let mut set = PluginDataSet::new();
        set.insert(people.clone(), Population { size: 10 });
        set.insert(people.clone(), Rates { beta: 3 });
        set.insert(people.clone(), Population { size: 20 });

        assert_eq!(set.len(), 2);
        assert_eq!(set.get::<Population>(&people), Some(&Population { size: 20 }));
        assert_eq!(set.get::<Rates>(&people).map(|r| r.version()), Some(2));
    }

    #[test]
    fn test_require_missing_is_contract_error() {
        let set = PluginDataSet::new();
        let error = set.require::<Population>(&PluginId::new("people")).unwrap_err();
        assert_eq!(error.kind, ContractErrorKind::MissingPluginData);
    }

    #[test]
    fn test_structural_equality() {
        let a: Arc<dyn PluginData> = Arc::new(Population { size: 5 });
        let b: Arc<dyn PluginData> = Arc::new(Population { size: 5 });
        let c: Arc<dyn PluginData> = Arc::new(Rates { beta: 5 });
        assert!(*a == *b);
        assert!(*a != *c);

        let mut left = PluginDataSet::new();
        let mut right = PluginDataSet::new();
        left.insert_arc(PluginId::new("p"), a);
        right.insert_arc(PluginId::new("p"), b);
        assert_eq!(left, right);
    }
}

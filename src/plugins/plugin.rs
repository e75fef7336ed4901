//! Plugin definition

use std::fmt;
use std::sync::Arc;

use crate::data::PluginData;
use crate::simulation::{PluginContext, SimulationResult};
use crate::types::PluginId;

/// Initialization function of a plugin
pub type PluginInit = Box<dyn FnOnce(&mut PluginContext<'_>) -> SimulationResult<()>>;

/// A unit of model composition
///
/// A plugin declares the plugins it depends on, carries its configuration as
/// plugin data, and registers data managers, actors, reports and labelers
/// from its init function.
///
/// ```rust
/// use agent_sim_kernel::plugins::Plugin;
///
/// let plugin = Plugin::new("contagion", |_context| Ok(())).with_dependency("people");
/// assert_eq!(plugin.id().as_str(), "contagion");
/// assert_eq!(plugin.dependencies()[0].as_str(), "people");
/// ```
pub struct Plugin {
    id: PluginId,
    dependencies: Vec<PluginId>,
    data: Vec<Arc<dyn PluginData>>,
    init: PluginInit,
}

impl Plugin {
    /// Create a plugin with no dependencies
    pub fn new<F>(id: impl Into<PluginId>, init: F) -> Self
    where
        F: FnOnce(&mut PluginContext<'_>) -> SimulationResult<()> + 'static,
    {
        Self { id: id.into(), dependencies: Vec::new(), data: Vec::new(), init: Box::new(init) }
    }

    /// Require another plugin to be initialized first
    pub fn with_dependency(mut self, dependency: impl Into<PluginId>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// Attach a plugin data value
    pub fn with_data<T: PluginData>(self, data: T) -> Self {
        self.with_shared_data(Arc::new(data))
    }

    /// Attach an already shared plugin data value
    pub fn with_shared_data(mut self, data: Arc<dyn PluginData>) -> Self {
        self.data.push(data);
        self
    }

    /// Plugin id
    pub fn id(&self) -> &PluginId {
        &self.id
    }

    /// Declared dependencies, without duplicates
    pub fn dependencies(&self) -> &[PluginId] {
        &self.dependencies
    }

    /// Attached plugin data
    pub fn data(&self) -> &[Arc<dyn PluginData>] {
        &self.data
    }

    pub(crate) fn into_parts(self) -> (PluginId, Vec<Arc<dyn PluginData>>, PluginInit) {
        (self.id, self.data, self.init)
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

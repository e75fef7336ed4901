//! Cached indexes kept current by event sensitivities
//!
//! A cached index holds the subset of a population that satisfies a
//! predicate. Rather than re-scanning the population after every change, the
//! index declares for each relevant event type which entities an event may
//! have made stale; only those entities are re-evaluated.

use std::any::{Any, TypeId};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use super::event::Event;
use crate::simulation::{Kernel, SimulationResult};
use crate::types::EntityId;

pub(crate) type PopulationFn = Rc<dyn Fn(&Kernel) -> SimulationResult<Vec<EntityId>>>;
pub(crate) type PredicateFn = Rc<dyn Fn(&Kernel, EntityId) -> SimulationResult<bool>>;
pub(crate) type StaleFn = Rc<dyn Fn(&Kernel, &dyn Any) -> Vec<EntityId>>;

/// Declares that events of one type may invalidate some entities
#[derive(Clone)]
pub(crate) struct Sensitivity {
    pub(crate) event_type: TypeId,
    pub(crate) stale: StaleFn,
}

/// Definition of a cached index, passed to `add_cached_index`
///
/// ```rust
/// use agent_sim_kernel::events::CachedIndexSpec;
/// use agent_sim_kernel::types::EntityId;
///
/// #[derive(Debug)]
/// struct Recovered { person: EntityId }
///
/// let spec = CachedIndexSpec::new(
///     "infectious",
///     |_| Ok((0..10).map(EntityId).collect()),
///     |_, person| Ok(person.0 % 2 == 0),
/// )
/// .sensitive_to(|_, event: &Recovered| vec![event.person]);
/// assert_eq!(spec.name(), "infectious");
/// ```
pub struct CachedIndexSpec {
    pub(crate) name: String,
    pub(crate) population: PopulationFn,
    pub(crate) predicate: PredicateFn,
    pub(crate) sensitivities: Vec<Sensitivity>,
}

impl CachedIndexSpec {
    /// Create an index over a population filtered by a predicate
    pub fn new<P, F>(name: impl Into<String>, population: P, predicate: F) -> Self
    where
        P: Fn(&Kernel) -> SimulationResult<Vec<EntityId>> + 'static,
        F: Fn(&Kernel, EntityId) -> SimulationResult<bool> + 'static,
    {
        Self {
            name: name.into(),
            population: Rc::new(population),
            predicate: Rc::new(predicate),
            sensitivities: Vec::new(),
        }
    }

    /// Re-evaluate the entities returned by `stale` whenever an `E` is published
    pub fn sensitive_to<E, S>(mut self, stale: S) -> Self
    where
        E: Event,
        S: Fn(&Kernel, &E) -> Vec<EntityId> + 'static,
    {
        self.sensitivities.push(Sensitivity {
            event_type: TypeId::of::<E>(),
            stale: Rc::new(move |kernel: &Kernel, event: &dyn Any| {
                event
                    .downcast_ref::<E>()
                    .map(|event| stale(kernel, event))
                    .unwrap_or_default()
            }),
        });
        self
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CachedIndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedIndexSpec")
            .field("name", &self.name)
            .field("sensitivities", &self.sensitivities.len())
            .finish_non_exhaustive()
    }
}

/// Live membership of a cached index
#[derive(Debug, Clone, Default)]
pub struct CachedIndex {
    name: String,
    members: BTreeSet<EntityId>,
    evaluations: u64,
}

impl CachedIndex {
    pub(crate) fn new(name: String) -> Self {
        Self { name, members: BTreeSet::new(), evaluations: 0 }
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members in ascending entity order
    pub fn members(&self) -> &BTreeSet<EntityId> {
        &self.members
    }

    /// Whether `entity` is a member
    pub fn contains(&self, entity: EntityId) -> bool {
        self.members.contains(&entity)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Predicate evaluations performed since creation
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub(crate) fn set_membership(&mut self, entity: EntityId, member: bool) {
        self.evaluations += 1;
        if member {
            self.members.insert(entity);
        } else {
            self.members.remove(&entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_updates() {
        let mut index = CachedIndex::new("even".into());
        index.set_membership(EntityId(2), true);
        index.set_membership(EntityId(4), true);
        index.set_membership(EntityId(2), false);

        assert!(index.contains(EntityId(4)));
        assert!(!index.contains(EntityId(2)));
        assert_eq!(index.len(), 1);
        assert_eq!(index.evaluations(), 3);
    }

    #[test]
    fn test_sensitivities_are_recorded_per_type() {
        #[derive(Debug)]
        struct A;
        #[derive(Debug)]
        struct B;

        let spec = CachedIndexSpec::new("all", |_| Ok(Vec::new()), |_, _| Ok(true))
            .sensitive_to(|_, _: &A| Vec::new())
            .sensitive_to(|_, _: &B| Vec::new());
        let types: Vec<TypeId> = spec.sensitivities.iter().map(|s| s.event_type).collect();
        assert_eq!(types, vec![TypeId::of::<A>(), TypeId::of::<B>()]);
    }
}

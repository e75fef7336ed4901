//! Event labels and labelers
//!
//! A labeler maps an event to a label. Consumers that only care about a
//! narrow slice of a high-volume event stream subscribe to a label instead of
//! the whole event type, and the bus reaches them with a hash lookup rather
//! than a scan over every subscriber.

use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use super::event::Event;
use crate::simulation::Kernel;
use crate::types::EntityId;

/// Identifier of a labeler, unique per event type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelerId(String);

impl LabelerId {
    /// Create a labeler id
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The labeler name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LabelerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LabelerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The primary key part of a label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LabelKey {
    /// Matches every event the labeler sees
    Unit,
    /// Integer key
    Int(i64),
    /// Entity key
    Entity(EntityId),
    /// Text key
    Text(String),
    /// Several keys combined, e.g. (property, region)
    Composite(Vec<LabelKey>),
}

impl From<i64> for LabelKey {
    fn from(value: i64) -> Self {
        LabelKey::Int(value)
    }
}

impl From<EntityId> for LabelKey {
    fn from(value: EntityId) -> Self {
        LabelKey::Entity(value)
    }
}

impl From<&str> for LabelKey {
    fn from(value: &str) -> Self {
        LabelKey::Text(value.to_string())
    }
}

impl From<String> for LabelKey {
    fn from(value: String) -> Self {
        LabelKey::Text(value)
    }
}

/// Targeted dispatch key: event type, labeler and primary key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventLabel {
    event_type: TypeId,
    event_type_name: &'static str,
    labeler_id: LabelerId,
    primary_key: LabelKey,
}

impl EventLabel {
    /// Build the label a subscriber wants to receive
    pub fn new<E: Event>(labeler_id: impl Into<LabelerId>, primary_key: impl Into<LabelKey>) -> Self {
        Self {
            event_type: TypeId::of::<E>(),
            event_type_name: std::any::type_name::<E>(),
            labeler_id: labeler_id.into(),
            primary_key: primary_key.into(),
        }
    }

    /// Event type this label applies to
    pub fn event_type(&self) -> TypeId {
        self.event_type
    }

    /// Event type name, for diagnostics
    pub fn event_type_name(&self) -> &'static str {
        self.event_type_name
    }

    /// Labeler that computes this label
    pub fn labeler_id(&self) -> &LabelerId {
        &self.labeler_id
    }

    /// Primary key
    pub fn primary_key(&self) -> &LabelKey {
        &self.primary_key
    }
}

impl fmt::Display for EventLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}={:?}]", self.event_type_name, self.labeler_id, self.primary_key)
    }
}

/// Computes a label key for events of type `E`
///
/// The labeling function must be pure and deterministic given the current
/// simulation state.
///
/// ```rust
/// use agent_sim_kernel::events::{EventLabel, EventLabeler, LabelKey};
///
/// #[derive(Debug)]
/// struct Moved { region: i64 }
///
/// let labeler = EventLabeler::new("region", |_, event: &Moved| LabelKey::Int(event.region));
/// assert_eq!(labeler.id().as_str(), "region");
/// let wanted = EventLabel::new::<Moved>("region", 4i64);
/// assert_eq!(wanted.primary_key(), &LabelKey::Int(4));
/// ```
pub struct EventLabeler<E> {
    id: LabelerId,
    label_fn: Rc<dyn Fn(&Kernel, &E) -> LabelKey>,
}

impl<E: Event> EventLabeler<E> {
    /// Create a labeler
    pub fn new<F>(id: impl Into<LabelerId>, label_fn: F) -> Self
    where
        F: Fn(&Kernel, &E) -> LabelKey + 'static,
    {
        Self { id: id.into(), label_fn: Rc::new(label_fn) }
    }

    /// Labeler id
    pub fn id(&self) -> &LabelerId {
        &self.id
    }

    /// Compute the label of an event
    pub fn label_for(&self, kernel: &Kernel, event: &E) -> EventLabel {
        EventLabel {
            event_type: TypeId::of::<E>(),
            event_type_name: std::any::type_name::<E>(),
            labeler_id: self.id.clone(),
            primary_key: (self.label_fn)(kernel, event),
        }
    }

    pub(crate) fn erase(self) -> ErasedLabeler {
        let id = self.id.clone();
        ErasedLabeler {
            id,
            label: Rc::new(move |kernel: &Kernel, event: &dyn Any| {
                event.downcast_ref::<E>().map(|event| self.label_for(kernel, event))
            }),
        }
    }
}

impl<E> fmt::Debug for EventLabeler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLabeler")
            .field("id", &self.id)
            .field("event_type", &std::any::type_name::<E>())
            .finish_non_exhaustive()
    }
}

/// Labeler with its event type erased, as stored by the bus
#[derive(Clone)]
pub(crate) struct ErasedLabeler {
    pub(crate) id: LabelerId,
    pub(crate) label: Rc<dyn Fn(&Kernel, &dyn Any) -> Option<EventLabel>>,
}

impl fmt::Debug for ErasedLabeler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedLabeler").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Changed {
        region: i64,
    }

    #[derive(Debug)]
    struct Other;

    #[test]
    fn test_labels_compare_by_type_labeler_and_key() {
        let a = EventLabel::new::<Changed>("region", 1i64);
        let b = EventLabel::new::<Changed>("region", 1i64);
        let c = EventLabel::new::<Changed>("region", 2i64);
        let d = EventLabel::new::<Other>("region", 1i64);
        let e = EventLabel::new::<Changed>("district", 1i64);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(a, e);
    }

    #[test]
    fn test_composite_key_from_parts() {
        let key = LabelKey::Composite(vec!["age".into(), LabelKey::Entity(EntityId(3))]);
        let label = EventLabel::new::<Changed>("property_region", key.clone());
        assert_eq!(label.primary_key(), &key);
        assert_eq!(label.labeler_id().as_str(), "property_region");
    }

    #[test]
    fn test_labeler_keys_events_by_field() {
        let kernel = Kernel::new(0, None, None, indexmap::IndexMap::new());
        let labeler = EventLabeler::new("region", |_, event: &Changed| LabelKey::Int(event.region));

        let label = labeler.label_for(&kernel, &Changed { region: 7 });
        assert_eq!(label, EventLabel::new::<Changed>("region", 7i64));
        assert_ne!(labeler.label_for(&kernel, &Changed { region: 8 }), label);
    }
}

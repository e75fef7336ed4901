//! Subscriber registry for synchronous event dispatch
//!
//! The bus only stores who wants what. Delivery is driven by
//! [`Kernel::publish`](crate::simulation::Kernel::publish), which needs
//! mutable access to the rest of the kernel while handlers run.
//!
//! Delivery order for one published event:
//! 1. cached-index refresh handlers for the event type
//! 2. subscribers of the event type, in subscription order
//! 3. for each labeler of the type in registration order, the subscribers of
//!    the computed label in subscription order
//!
//! The handler lists are captured when the event is published, so changes to
//! subscriptions made by a handler take effect from the next publication.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::label::{ErasedLabeler, EventLabel, LabelerId};
use crate::simulation::{ContractError, ContractErrorKind, Kernel, SimulationResult, StructuralError};
use crate::types::ComponentId;

/// Event handler with its event type erased
pub(crate) type EventHandler = Rc<dyn Fn(&mut Kernel, &dyn Any) -> SimulationResult<()>>;

#[derive(Clone)]
struct Subscription {
    subscriber: ComponentId,
    handler: EventHandler,
}

/// Registry of event subscribers and labelers
#[derive(Default)]
pub struct EventBus {
    index_refresh: HashMap<TypeId, Vec<Subscription>>,
    by_type: HashMap<TypeId, Vec<Subscription>>,
    by_label: HashMap<EventLabel, Vec<Subscription>>,
    labelers: HashMap<TypeId, Vec<ErasedLabeler>>,
    published: u64,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(
        &mut self,
        event_type: TypeId,
        event_type_name: &'static str,
        subscriber: ComponentId,
        handler: EventHandler,
    ) -> Result<(), ContractError> {
        let subscriptions = self.by_type.entry(event_type).or_default();
        if subscriptions.iter().any(|s| s.subscriber == subscriber) {
            return Err(ContractError::new(
                ContractErrorKind::DuplicateSubscription,
                format!("{} already subscribed to {}", subscriber, event_type_name),
            ));
        }
        subscriptions.push(Subscription { subscriber, handler });
        Ok(())
    }

    pub(crate) fn subscribe_by_label(
        &mut self,
        label: EventLabel,
        subscriber: ComponentId,
        handler: EventHandler,
    ) -> Result<(), ContractError> {
        if !self.has_labeler(label.event_type(), label.labeler_id()) {
            return Err(ContractError::new(
                ContractErrorKind::UnknownLabeler,
                format!(
                    "no labeler {} registered for {}",
                    label.labeler_id(),
                    label.event_type_name()
                ),
            ));
        }

        let subscriptions = self.by_label.entry(label.clone()).or_default();
        if subscriptions.iter().any(|s| s.subscriber == subscriber) {
            return Err(ContractError::new(
                ContractErrorKind::DuplicateSubscription,
                format!("{} already subscribed to {}", subscriber, label),
            ));
        }
        subscriptions.push(Subscription { subscriber, handler });
        Ok(())
    }

    /// Cached indexes refresh before any subscriber sees the event
    pub(crate) fn subscribe_index_refresh(
        &mut self,
        event_type: TypeId,
        index: ComponentId,
        handler: EventHandler,
    ) {
        self.index_refresh
            .entry(event_type)
            .or_default()
            .push(Subscription { subscriber: index, handler });
    }

    pub(crate) fn unsubscribe(&mut self, event_type: TypeId, subscriber: &ComponentId) -> bool {
        remove_subscriber(self.by_type.get_mut(&event_type), subscriber)
    }

    pub(crate) fn unsubscribe_by_label(&mut self, label: &EventLabel, subscriber: &ComponentId) -> bool {
        let removed = remove_subscriber(self.by_label.get_mut(label), subscriber);
        if self.by_label.get(label).is_some_and(|s| s.is_empty()) {
            self.by_label.remove(label);
        }
        removed
    }

    pub(crate) fn add_labeler(
        &mut self,
        event_type: TypeId,
        labeler: ErasedLabeler,
    ) -> Result<(), StructuralError> {
        if self.has_labeler(event_type, &labeler.id) {
            return Err(StructuralError::DuplicateLabeler { labeler: labeler.id });
        }
        self.labelers.entry(event_type).or_default().push(labeler);
        Ok(())
    }

    fn has_labeler(&self, event_type: TypeId, id: &LabelerId) -> bool {
        self.labelers
            .get(&event_type)
            .is_some_and(|labelers| labelers.iter().any(|labeler| &labeler.id == id))
    }

    pub(crate) fn labelers_for(&self, event_type: TypeId) -> Vec<ErasedLabeler> {
        self.labelers.get(&event_type).cloned().unwrap_or_default()
    }

    /// Handlers for one publication, in delivery order
    pub(crate) fn handlers_for(&self, event_type: TypeId, labels: &[EventLabel]) -> Vec<EventHandler> {
        let mut handlers: Vec<EventHandler> = Vec::new();
        for table in [&self.index_refresh, &self.by_type] {
            if let Some(subscriptions) = table.get(&event_type) {
                handlers.extend(subscriptions.iter().map(|s| Rc::clone(&s.handler)));
            }
        }
        for label in labels {
            if let Some(subscriptions) = self.by_label.get(label) {
                handlers.extend(subscriptions.iter().map(|s| Rc::clone(&s.handler)));
            }
        }
        handlers
    }

    pub(crate) fn record_publication(&mut self) {
        self.published += 1;
    }

    /// Number of events published so far
    pub fn published_count(&self) -> u64 {
        self.published
    }

    /// Number of subscribers to the whole event type
    pub fn subscriber_count(&self, event_type: TypeId) -> usize {
        self.by_type.get(&event_type).map_or(0, Vec::len)
    }

    /// Number of subscribers to one label
    pub fn label_subscriber_count(&self, label: &EventLabel) -> usize {
        self.by_label.get(label).map_or(0, Vec::len)
    }
}

fn remove_subscriber(subscriptions: Option<&mut Vec<Subscription>>, subscriber: &ComponentId) -> bool {
    let Some(subscriptions) = subscriptions else {
        return false;
    };
    let before = subscriptions.len();
    subscriptions.retain(|s| &s.subscriber != subscriber);
    subscriptions.len() != before
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.by_type.len())
            .field("labels", &self.by_label.len())
            .field("labeled_types", &self.labelers.len())
            .field("published", &self.published)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLabeler;
    use crate::events::LabelKey;
    use crate::types::ActorId;

    #[derive(Debug)]
    struct Ping(i64);

    fn handler() -> EventHandler {
        Rc::new(|_, _| Ok(()))
    }

    fn actor(n: usize) -> ComponentId {
        ComponentId::Actor(ActorId(n))
    }

    fn ping_labeler() -> ErasedLabeler {
        EventLabeler::new("value", |_, ping: &Ping| LabelKey::Int(ping.0)).erase()
    }

    #[test]
    fn test_duplicate_type_subscription_rejected() {
        let mut bus = EventBus::new();
        let ty = TypeId::of::<Ping>();
        bus.subscribe(ty, "Ping", actor(0), handler()).unwrap();
        bus.subscribe(ty, "Ping", actor(1), handler()).unwrap();

        let error = bus.subscribe(ty, "Ping", actor(0), handler()).unwrap_err();
        assert_eq!(error.kind, ContractErrorKind::DuplicateSubscription);
        assert_eq!(bus.subscriber_count(ty), 2);
    }

    #[test]
    fn test_label_subscription_requires_labeler() {
        let mut bus = EventBus::new();
        let label = EventLabel::new::<Ping>("value", 3i64);

        let error = bus.subscribe_by_label(label.clone(), actor(0), handler()).unwrap_err();
        assert_eq!(error.kind, ContractErrorKind::UnknownLabeler);

        bus.add_labeler(TypeId::of::<Ping>(), ping_labeler()).unwrap();
        bus.subscribe_by_label(label.clone(), actor(0), handler()).unwrap();
        assert_eq!(bus.label_subscriber_count(&label), 1);
    }

    #[test]
    fn test_duplicate_labeler_is_structural() {
        let mut bus = EventBus::new();
        bus.add_labeler(TypeId::of::<Ping>(), ping_labeler()).unwrap();
        let error = bus.add_labeler(TypeId::of::<Ping>(), ping_labeler()).unwrap_err();
        assert!(matches!(error, StructuralError::DuplicateLabeler { .. }));
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = EventBus::new();
        let ty = TypeId::of::<Ping>();
        bus.subscribe(ty, "Ping", actor(0), handler()).unwrap();

        assert!(bus.unsubscribe(ty, &actor(0)));
        assert!(!bus.unsubscribe(ty, &actor(0)));
        // Subscribing again after removal is allowed
        bus.subscribe(ty, "Ping", actor(0), handler()).unwrap();
    }

    #[test]
    fn test_handlers_only_for_matching_labels() {
        let mut bus = EventBus::new();
        let ty = TypeId::of::<Ping>();
        bus.add_labeler(ty, ping_labeler()).unwrap();
        bus.subscribe(ty, "Ping", actor(0), handler()).unwrap();
        bus.subscribe_by_label(EventLabel::new::<Ping>("value", 1i64), actor(1), handler())
            .unwrap();
        bus.subscribe_by_label(EventLabel::new::<Ping>("value", 2i64), actor(2), handler())
            .unwrap();

        let handlers = bus.handlers_for(ty, &[EventLabel::new::<Ping>("value", 2i64)]);
        assert_eq!(handlers.len(), 2);
        let handlers = bus.handlers_for(ty, &[EventLabel::new::<Ping>("value", 9i64)]);
        assert_eq!(handlers.len(), 1);
    }
}

//! Time-ordered plan queue with deterministic ordering.
//!
//! Plans are ordered by `(time, priority, sequence)`:
//! - earlier time first
//! - lower priority value first among equal times
//! - insertion order (sequence number) among equal time and priority
//!
//! Removal by key is lazy: the heap entry stays behind and is skipped when it
//! reaches the top.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::converter::{PlanQueueSnapshot, SnapshotPlan};
use super::plan::{PlanCallback, PlanData, PlanHandle, PlanId, PlanKey, PlanSpec};
use crate::types::ComponentId;

/// Heap entry; the callback lives in `PlanQueue::pending`
#[derive(Debug, Clone, Copy)]
struct QueuedPlan {
    time: f64,
    priority: i32,
    sequence: u64,
}

impl PartialEq for QueuedPlan {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedPlan {}

impl PartialOrd for QueuedPlan {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedPlan {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.priority.cmp(&other.priority))
            .then(self.sequence.cmp(&other.sequence))
    }
}

/// A plan waiting in the queue
pub(crate) struct PendingPlan {
    pub(crate) owner: ComponentId,
    pub(crate) time: f64,
    pub(crate) priority: i32,
    pub(crate) key: Option<PlanKey>,
    pub(crate) active: bool,
    pub(crate) data: Option<Arc<dyn PlanData>>,
    pub(crate) callback: PlanCallback,
}

impl fmt::Debug for PendingPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingPlan")
            .field("owner", &self.owner)
            .field("time", &self.time)
            .field("priority", &self.priority)
            .field("key", &self.key)
            .field("active", &self.active)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

/// Priority-ordered plan queue
///
/// Time validation is the caller's job: the queue accepts any finite time.
#[derive(Debug, Default)]
pub struct PlanQueue {
    /// Min-heap ordered by (time, priority, sequence)
    heap: BinaryHeap<Reverse<QueuedPlan>>,
    /// Live plans by sequence number
    pending: HashMap<u64, PendingPlan>,
    /// Pending keyed plans by owner and key
    keys: HashMap<(ComponentId, PlanKey), u64>,
    /// Monotonic sequence counter for tie-breaking
    next_sequence: u64,
    /// Number of pending active plans
    active_count: usize,
}

impl PlanQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `owner` already has a pending plan under `key`
    pub(crate) fn contains_key(&self, owner: &ComponentId, key: &PlanKey) -> bool {
        self.keys.contains_key(&(owner.clone(), key.clone()))
    }

    /// Add a plan; duplicate keys must be rejected by the caller first
    pub(crate) fn push(
        &mut self,
        owner: ComponentId,
        spec: PlanSpec,
        callback: PlanCallback,
    ) -> PlanHandle {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if let Some(key) = &spec.key {
            self.keys.insert((owner.clone(), key.clone()), sequence);
        }
        if spec.active {
            self.active_count += 1;
        }

        self.heap.push(Reverse(QueuedPlan {
            time: spec.time,
            priority: spec.priority,
            sequence,
        }));
        self.pending.insert(
            sequence,
            PendingPlan {
                owner,
                time: spec.time,
                priority: spec.priority,
                key: spec.key,
                active: spec.active,
                data: spec.data,
                callback,
            },
        );

        PlanHandle { id: PlanId(sequence), time: spec.time }
    }

    /// Remove a pending plan by key. Unknown or executed keys return `false`.
    pub(crate) fn remove(&mut self, owner: &ComponentId, key: &PlanKey) -> bool {
        let Some(sequence) = self.keys.remove(&(owner.clone(), key.clone())) else {
            return false;
        };
        match self.pending.remove(&sequence) {
            Some(plan) => {
                if plan.active {
                    self.active_count -= 1;
                }
                true
            }
            None => false,
        }
    }

    /// Payload of a pending keyed plan
    pub(crate) fn plan_data(&self, owner: &ComponentId, key: &PlanKey) -> Option<&Arc<dyn PlanData>> {
        self.keys
            .get(&(owner.clone(), key.clone()))
            .and_then(|sequence| self.pending.get(sequence))
            .and_then(|plan| plan.data.as_ref())
    }

    /// Drop heap entries whose plans were removed
    fn discard_removed(&mut self) {
        while let Some(Reverse(top)) = self.heap.peek() {
            if self.pending.contains_key(&top.sequence) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Time of the next plan, if any
    pub fn next_time(&mut self) -> Option<f64> {
        self.discard_removed();
        self.heap.peek().map(|Reverse(top)| top.time)
    }

    /// Remove and return the next plan
    pub(crate) fn pop(&mut self) -> Option<PendingPlan> {
        self.discard_removed();
        let Reverse(top) = self.heap.pop()?;
        let plan = self.pending.remove(&top.sequence)?;
        if let Some(key) = &plan.key {
            self.keys.remove(&(plan.owner.clone(), key.clone()));
        }
        if plan.active {
            self.active_count -= 1;
        }
        Some(plan)
    }

    /// Whether any active plan is pending
    pub fn has_active(&self) -> bool {
        self.active_count > 0
    }

    /// Number of pending plans
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Capture the pending plans that carry plan data, in execution order
    pub(crate) fn snapshot(&self) -> PlanQueueSnapshot {
        let mut ordered: Vec<(QueuedPlan, &PendingPlan)> = self
            .pending
            .iter()
            .map(|(sequence, plan)| {
                (QueuedPlan { time: plan.time, priority: plan.priority, sequence: *sequence }, plan)
            })
            .collect();
        ordered.sort_by(|a, b| a.0.cmp(&b.0));

        let mut skipped = 0usize;
        let mut plans = Vec::with_capacity(ordered.len());
        for (_, plan) in ordered {
            match &plan.data {
                Some(data) => plans.push(SnapshotPlan {
                    owner: plan.owner.clone(),
                    time: plan.time,
                    priority: plan.priority,
                    key: plan.key.clone(),
                    active: plan.active,
                    data: Arc::clone(data),
                }),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!("Snapshot skipped {} pending plans without plan data", skipped);
        }

        PlanQueueSnapshot { plans }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActorId;

    fn owner() -> ComponentId {
        ComponentId::Actor(ActorId(0))
    }

    fn noop() -> PlanCallback {
        Box::new(|_| Ok(()))
    }

    fn drain_times(queue: &mut PlanQueue) -> Vec<(f64, u64)> {
        let mut out = Vec::new();
        while let Some(plan) = queue.pop() {
            let tag = match plan.key {
                Some(key) => key.as_str().parse().unwrap(),
                None => u64::MAX,
            };
            out.push((plan.time, tag));
        }
        out
    }

    #[test]
    fn test_time_then_insertion_order() {
        let mut queue = PlanQueue::new();
        for (index, time) in [5.0, 3.0, 3.0, 7.0].into_iter().enumerate() {
            queue.push(owner(), PlanSpec::at(time).with_key(index.to_string()), noop());
        }

        let order: Vec<u64> = drain_times(&mut queue).into_iter().map(|(_, tag)| tag).collect();
        assert_eq!(order, vec![1, 2, 0, 3]);
    }

    #[test]
    fn test_priority_breaks_time_ties() {
        let mut queue = PlanQueue::new();
        queue.push(owner(), PlanSpec::at(1.0).with_key("0"), noop());
        queue.push(owner(), PlanSpec::at(1.0).with_key("1").with_priority(-5), noop());
        queue.push(owner(), PlanSpec::at(0.5).with_key("2").with_priority(10), noop());

        let order: Vec<u64> = drain_times(&mut queue).into_iter().map(|(_, tag)| tag).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_remove_by_key() {
        let mut queue = PlanQueue::new();
        queue.push(owner(), PlanSpec::at(1.0).with_key("1"), noop());
        queue.push(owner(), PlanSpec::at(2.0).with_key("2"), noop());

        assert!(queue.remove(&owner(), &PlanKey::new("1")));
        assert!(!queue.remove(&owner(), &PlanKey::new("1")));
        assert!(!queue.remove(&owner(), &PlanKey::new("unknown")));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_time(), Some(2.0));
    }

    #[test]
    fn test_keys_are_scoped_by_owner() {
        let mut queue = PlanQueue::new();
        let other = ComponentId::Actor(ActorId(1));
        queue.push(owner(), PlanSpec::at(1.0).with_key("k"), noop());

        assert!(queue.contains_key(&owner(), &PlanKey::new("k")));
        assert!(!queue.contains_key(&other, &PlanKey::new("k")));
        assert!(!queue.remove(&other, &PlanKey::new("k")));
    }

    #[test]
    fn test_passive_plans_do_not_count_as_active() {
        let mut queue = PlanQueue::new();
        queue.push(owner(), PlanSpec::at(1.0).passive(), noop());
        assert!(!queue.has_active());

        queue.push(owner(), PlanSpec::at(2.0).with_key("a"), noop());
        assert!(queue.has_active());

        queue.remove(&owner(), &PlanKey::new("a"));
        assert!(!queue.has_active());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_executed_key_is_released() {
        let mut queue = PlanQueue::new();
        queue.push(owner(), PlanSpec::at(1.0).with_key("k"), noop());
        assert!(queue.pop().is_some());
        assert!(!queue.contains_key(&owner(), &PlanKey::new("k")));
        assert!(!queue.remove(&owner(), &PlanKey::new("k")));
    }

    #[test]
    fn test_snapshot_keeps_only_plans_with_data() {
        let mut queue = PlanQueue::new();
        queue.push(owner(), PlanSpec::at(3.0).with_data(3u32), noop());
        queue.push(owner(), PlanSpec::at(1.0), noop());
        queue.push(owner(), PlanSpec::at(2.0).with_data(2u32).passive(), noop());

        let snapshot = queue.snapshot();
        let times: Vec<f64> = snapshot.plans.iter().map(|plan| plan.time).collect();
        assert_eq!(times, vec![2.0, 3.0]);
        assert!(!snapshot.plans[0].active);
    }
}

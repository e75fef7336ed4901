//! Tests for typed and labeled event delivery

use agent_sim_kernel::data::{DataManager, MutationScope};
use agent_sim_kernel::events::{CachedIndexSpec, EventLabel, EventLabeler, LabelKey};
use agent_sim_kernel::plugins::Plugin;
use agent_sim_kernel::simulation::{
    ActorContext, ContractError, ContractErrorKind, DataManagerContext, Kernel, Simulation, SimulationError,
    SimulationResult, StructuralError,
};
use agent_sim_kernel::types::EntityId;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq)]
struct RegionChange {
    person: EntityId,
    region: i64,
}

#[derive(Debug, Default)]
struct RegionManager {
    regions: Vec<i64>,
}

impl RegionManager {
    fn move_to(&mut self, scope: &mut MutationScope<'_>, person: EntityId, region: i64) -> Result<(), ContractError> {
        let slot = self
            .regions
            .get_mut(person.0 as usize)
            .ok_or_else(|| ContractError::new(ContractErrorKind::UnknownEntity, format!("person {}", person)))?;
        *slot = region;
        scope.publish(RegionChange { person, region });
        Ok(())
    }
}

impl DataManager for RegionManager {
    fn init(&mut self, context: &mut DataManagerContext<'_>) -> SimulationResult<()> {
        self.regions = vec![0; 4];
        context.add_labeler(EventLabeler::new("region", |_, change: &RegionChange| LabelKey::from(change.region)))
    }
}

type Received = Rc<RefCell<Vec<(&'static str, RegionChange)>>>;

fn region_plugin() -> Plugin {
    Plugin::new("regions", |context| {
        context.add_data_manager(RegionManager::default());
        Ok(())
    })
}

fn mover_plugin(moves: Vec<(f64, u64, i64)>) -> Plugin {
    Plugin::new("mover", move |context| {
        context.add_actor(move |actor| {
            let regions = actor.data_manager::<RegionManager>()?;
            for (time, person, region) in moves {
                actor.add_plan(time, move |context| {
                    context.mutate(regions, |manager, scope| manager.move_to(scope, EntityId(person), region))
                })?;
            }
            Ok(())
        });
        Ok(())
    })
    .with_dependency("regions")
}

fn watcher_plugin(received: Received) -> Plugin {
    Plugin::new("watchers", move |context| {
        let by_type = Rc::clone(&received);
        context.add_actor(move |actor| {
            actor.subscribe(move |_: &mut ActorContext<'_>, change: &RegionChange| {
                by_type.borrow_mut().push(("all", *change));
                Ok(())
            })
        });
        let region_one = Rc::clone(&received);
        context.add_actor(move |actor| {
            actor.subscribe_by_label(
                EventLabel::new::<RegionChange>("region", 1i64),
                move |_: &mut ActorContext<'_>, change: &RegionChange| {
                    region_one.borrow_mut().push(("region-1", *change));
                    Ok(())
                },
            )
        });
        let region_two = Rc::clone(&received);
        context.add_actor(move |actor| {
            actor.subscribe_by_label(
                EventLabel::new::<RegionChange>("region", 2i64),
                move |_: &mut ActorContext<'_>, change: &RegionChange| {
                    region_two.borrow_mut().push(("region-2", *change));
                    Ok(())
                },
            )
        });
        Ok(())
    })
    .with_dependency("regions")
}

/// Label subscribers receive exactly the events their label selects
#[test]
fn test_labeled_delivery_is_exact() {
    let received: Received = Rc::default();

    let outcome = Simulation::builder()
        .add_plugin(region_plugin())
        .add_plugin(mover_plugin(vec![(1.0, 0, 1), (2.0, 1, 2), (3.0, 2, 1), (4.0, 3, 3)]))
        .add_plugin(watcher_plugin(Rc::clone(&received)))
        .build()
        .unwrap()
        .run()
        .unwrap();

    let received = received.borrow();
    let count = |who: &str| received.iter().filter(|(name, _)| *name == who).count();
    assert_eq!(count("all"), 4);
    assert_eq!(count("region-1"), 2);
    assert_eq!(count("region-2"), 1);

    let region_one: Vec<EntityId> =
        received.iter().filter(|(name, _)| *name == "region-1").map(|(_, change)| change.person).collect();
    assert_eq!(region_one, vec![EntityId(0), EntityId(2)]);
    assert!(received.iter().all(|(name, change)| match *name {
        "region-1" => change.region == 1,
        "region-2" => change.region == 2,
        _ => true,
    }));
    assert_eq!(outcome.statistics.events_published, 4);
}

/// Type subscribers are notified in subscription order
#[test]
fn test_type_subscribers_notified_in_registration_order() {
    let received: Rc<RefCell<Vec<usize>>> = Rc::default();
    let inner = Rc::clone(&received);

    Simulation::builder()
        .add_plugin(region_plugin())
        .add_plugin(mover_plugin(vec![(1.0, 0, 5)]))
        .add_plugin(
            Plugin::new("ordered", move |context| {
                for n in 0..3 {
                    let log = Rc::clone(&inner);
                    context.add_actor(move |actor| {
                        actor.subscribe(move |_: &mut ActorContext<'_>, _: &RegionChange| {
                            log.borrow_mut().push(n);
                            Ok(())
                        })
                    });
                }
                Ok(())
            })
            .with_dependency("regions"),
        )
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(*received.borrow(), vec![0, 1, 2]);
}

/// Unsubscribing stops delivery to later publications
#[test]
fn test_unsubscribe_stops_delivery() {
    let received: Rc<RefCell<Vec<i64>>> = Rc::default();
    let inner = Rc::clone(&received);

    Simulation::builder()
        .add_plugin(region_plugin())
        .add_plugin(mover_plugin(vec![(1.0, 0, 1), (2.0, 0, 2)]))
        .add_plugin(
            Plugin::new("once", move |context| {
                context.add_actor(move |actor| {
                    actor.subscribe(move |context: &mut ActorContext<'_>, change: &RegionChange| {
                        inner.borrow_mut().push(change.region);
                        assert!(context.unsubscribe::<RegionChange>());
                        Ok(())
                    })
                });
                Ok(())
            })
            .with_dependency("regions"),
        )
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(*received.borrow(), vec![1]);
}

/// Subscribing twice to the same type from one component is rejected
#[test]
fn test_duplicate_subscription_rejected() {
    let result = Simulation::builder()
        .add_plugin(Plugin::new("twice", |context| {
            context.add_actor(|actor| {
                actor.subscribe(|_: &mut ActorContext<'_>, _: &RegionChange| Ok(()))?;
                actor.subscribe(|_: &mut ActorContext<'_>, _: &RegionChange| Ok(()))
            });
            Ok(())
        }))
        .build()
        .unwrap()
        .run();

    assert_eq!(result.unwrap_err().contract_kind(), Some(ContractErrorKind::DuplicateSubscription));
}

/// A label naming an unregistered labeler is rejected
#[test]
fn test_label_without_labeler_rejected() {
    let result = Simulation::builder()
        .add_plugin(Plugin::new("lonely", |context| {
            context.add_actor(|actor| {
                actor.subscribe_by_label(
                    EventLabel::new::<RegionChange>("nobody", LabelKey::Unit),
                    |_: &mut ActorContext<'_>, _: &RegionChange| Ok(()),
                )
            });
            Ok(())
        }))
        .build()
        .unwrap()
        .run();

    assert_eq!(result.unwrap_err().contract_kind(), Some(ContractErrorKind::UnknownLabeler));
}

/// Two labelers with one id for one event type are a structural error
#[test]
fn test_duplicate_labeler_is_structural() {
    let result = Simulation::builder()
        .add_plugin(region_plugin())
        .add_plugin(
            Plugin::new("copycat", |context| {
                context.add_labeler(EventLabeler::new("region", |_, change: &RegionChange| {
                    LabelKey::from(change.person)
                }))
            })
            .with_dependency("regions"),
        )
        .build()
        .unwrap()
        .run();

    match result {
        Err(SimulationError::Structural(StructuralError::DuplicateLabeler { labeler })) => {
            assert_eq!(labeler.as_str(), "region");
        }
        other => panic!("Expected DuplicateLabeler, got {:?}", other.map(|_| ())),
    }
}

/// A cached index re-evaluates only the entities a published event names
#[test]
fn test_cached_index_refreshes_only_stale_entities() {
    let observed: Rc<RefCell<Vec<(Vec<EntityId>, u64)>>> = Rc::default();
    let inner = Rc::clone(&observed);

    Simulation::builder()
        .add_plugin(region_plugin())
        .add_plugin(mover_plugin(vec![(1.0, 2, 1), (2.0, 3, 1), (3.0, 2, 0)]))
        .add_plugin(
            Plugin::new("indexer", move |context| {
                context.add_actor(move |actor| {
                    let regions = actor.data_manager::<RegionManager>()?;
                    let spec = CachedIndexSpec::new(
                        "in_region_one",
                        |_: &Kernel| Ok((0..4).map(EntityId).collect()),
                        move |kernel: &Kernel, person: EntityId| {
                            Ok(kernel.data_manager_ref(regions)?.regions[person.0 as usize] == 1)
                        },
                    )
                    .sensitive_to(|_: &Kernel, change: &RegionChange| vec![change.person]);
                    let index = actor.add_cached_index(spec)?;

                    // The initial scan evaluates the whole population
                    let initial = actor.cached_index(index)?;
                    assert!(initial.is_empty());
                    assert_eq!(initial.evaluations(), 4);

                    for time in [1.5, 2.5, 3.5] {
                        let log = Rc::clone(&inner);
                        actor.add_plan(time, move |context| {
                            let current = context.cached_index(index)?;
                            log.borrow_mut().push((current.members().iter().copied().collect(), current.evaluations()));
                            Ok(())
                        })?;
                    }
                    Ok(())
                });
                Ok(())
            })
            .with_dependency("regions"),
        )
        .build()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(
        *observed.borrow(),
        vec![
            (vec![EntityId(2)], 5),
            (vec![EntityId(2), EntityId(3)], 6),
            (vec![EntityId(3)], 7),
        ]
    );
}

//! Tests for stopping a run at a halt time and continuing it from its state

use agent_sim_kernel::demo::{self, DiseaseData, DiseaseSnapshot, DiseaseState, DISEASE_PLUGIN};
use agent_sim_kernel::plans::PlanSpec;
use agent_sim_kernel::plugins::Plugin;
use agent_sim_kernel::simulation::{ActorContext, ContractErrorKind, Simulation, SimulationOutcome};
use agent_sim_kernel::types::PluginId;

const SEED: u64 = 20_240_611;
const HALT: f64 = 10.0;

fn disease() -> DiseaseData {
    DiseaseData::builder()
        .population_size(200)
        .initial_infections(5)
        .transmission_probability(0.3)
        .contact_rate(2.0)
        .infectious_period(7.0)
        .horizon(40.0)
        .build()
        .unwrap()
}

fn rows(outcome: &SimulationOutcome) -> Vec<Vec<String>> {
    outcome.report_items.iter().map(|item| item.values().to_vec()).collect()
}

fn run(halt_time: Option<f64>) -> SimulationOutcome {
    let data = demo::base_data(disease());
    let mut builder = Simulation::builder().add_plugins(demo::plugins(&data).unwrap()).seed(SEED).record_state(true);
    if let Some(halt_time) = halt_time {
        builder = builder.halt_time(halt_time);
    }
    builder.build().unwrap().run().unwrap()
}

/// Halting and resuming produces the same rows as running straight through
#[test]
fn test_resumed_run_matches_uninterrupted_run() {
    let uninterrupted = run(None);
    assert!(uninterrupted.final_time() > HALT, "epidemic ended before the halt time");

    let halted = run(Some(HALT));
    assert!(halted.statistics.halted);
    assert_eq!(halted.final_time(), HALT);

    let state = halted.state.clone().expect("state recorded");
    assert_eq!(state.time(), HALT);
    assert!(!state.plans().is_empty());

    let snapshot = halted
        .plugin_data
        .get::<DiseaseSnapshot>(&PluginId::new(DISEASE_PLUGIN))
        .expect("disease snapshot recorded")
        .clone();
    let mut data = demo::base_data(disease());
    data.insert(PluginId::new(DISEASE_PLUGIN), snapshot);

    // The seed is irrelevant once the generator state is restored
    let resumed = Simulation::builder()
        .add_plugins(demo::plugins(&data).unwrap())
        .seed(0)
        .resume_from(state)
        .build()
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(resumed.statistics.plans_restored, halted.state.as_ref().unwrap().plans().len());

    // The halted run's last row is its end-of-run flush at the halt time
    let halted_rows = rows(&halted);
    let (before_halt, end_flush) = halted_rows.split_at(halted_rows.len() - 1);
    assert_eq!(end_flush[0][0], format!("{:.3}", HALT));

    let mut stitched = before_halt.to_vec();
    stitched.extend(rows(&resumed));
    assert_eq!(stitched, rows(&uninterrupted));
    assert_eq!(resumed.final_time(), uninterrupted.final_time());
}

/// The snapshot reflects the population at the halt time
#[test]
fn test_snapshot_counts_match_last_report_row() {
    let halted = run(Some(HALT));
    let snapshot = halted
        .plugin_data
        .get::<DiseaseSnapshot>(&PluginId::new(DISEASE_PLUGIN))
        .expect("disease snapshot recorded");

    let count = |state: DiseaseState| snapshot.states().iter().filter(|s| **s == state).count().to_string();
    let last = rows(&halted).pop().unwrap();
    assert_eq!(
        last,
        vec![
            format!("{:.3}", HALT),
            count(DiseaseState::Susceptible),
            count(DiseaseState::Infectious),
            count(DiseaseState::Recovered),
        ]
    );
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Wake(u32);

/// Restoring a plan whose payload has no converter is a contract error
#[test]
fn test_restore_without_converter_fails() {
    let with_converter = Plugin::new("sleeper", |context| {
        context.add_actor(|actor| {
            actor.set_plan_data_converter(|_: &mut ActorContext<'_>, _: &Wake| Ok(()));
            actor.add_data_plan(PlanSpec::at(5.0).with_data(Wake(1)))?;
            Ok(())
        });
        Ok(())
    });
    let halted = Simulation::builder()
        .add_plugin(with_converter)
        .halt_time(1.0)
        .record_state(true)
        .build()
        .unwrap()
        .run()
        .unwrap();
    let state = halted.state.expect("state recorded");
    assert_eq!(state.plans().len(), 1);

    let without_converter = Plugin::new("sleeper", |context| {
        context.add_actor(|_| Ok(()));
        Ok(())
    });
    let error = Simulation::builder()
        .add_plugin(without_converter)
        .resume_from(state)
        .build()
        .unwrap()
        .run()
        .unwrap_err();
    assert_eq!(error.contract_kind(), Some(ContractErrorKind::UnknownPlanDataType));
}

/// Plans without a payload are not part of the captured state
#[test]
fn test_plans_without_payload_are_not_captured() {
    let outcome = Simulation::builder()
        .add_plugin(Plugin::new("mixed", |context| {
            context.add_actor(|actor| {
                actor.set_plan_data_converter(|_: &mut ActorContext<'_>, _: &Wake| Ok(()));
                actor.add_data_plan(PlanSpec::at(5.0).with_data(Wake(2)))?;
                actor.add_plan(6.0, |_| Ok(()))?;
                Ok(())
            });
            Ok(())
        }))
        .halt_time(1.0)
        .record_state(true)
        .build()
        .unwrap()
        .run()
        .unwrap();

    let state = outcome.state.expect("state recorded");
    assert_eq!(state.plans().len(), 1);
    assert_eq!(outcome.statistics.plans_executed, 0);
}

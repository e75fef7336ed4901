//! Contagion actor
//!
//! Every infectious person gets two kinds of pending plans: a recovery at
//! the end of the infectious period and a chain of random contacts. Both
//! carry a [`DiseasePlan`] payload, so they survive a state snapshot and
//! are rebuilt by the converter registered here.

use rand::Rng;

use super::manager::{DiseaseManager, DiseaseState, DiseaseStateChange};
use crate::data::DataManagerHandle;
use crate::plans::{PlanKey, PlanSpec};
use crate::simulation::{ActorContext, SimulationResult};
use crate::types::EntityId;

/// Plan payloads of the contagion actor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiseasePlan {
    /// An infectious person meets someone at random
    Contact {
        /// The infectious person
        infector: EntityId,
    },
    /// An infectious person recovers
    Recover {
        /// Who recovers
        person: EntityId,
    },
}

impl DiseasePlan {
    /// Key of the pending plan; at most one of each kind per person
    pub fn key(&self) -> PlanKey {
        match self {
            DiseasePlan::Contact { infector } => PlanKey::new(format!("contact-{}", infector)),
            DiseasePlan::Recover { person } => PlanKey::new(format!("recover-{}", person)),
        }
    }

    fn schedule(self, context: &mut ActorContext<'_>, time: f64) -> SimulationResult<()> {
        context.add_data_plan(PlanSpec::at(time).with_key(self.key()).with_data(self))?;
        Ok(())
    }
}

/// Initialize the contagion actor
pub fn init_contagion_actor(context: &mut ActorContext<'_>) -> SimulationResult<()> {
    let manager = context.data_manager::<DiseaseManager>()?;

    context.set_plan_data_converter(move |context: &mut ActorContext<'_>, plan: &DiseasePlan| match *plan {
        DiseasePlan::Contact { infector } => make_contact(context, manager, infector),
        DiseasePlan::Recover { person } => recover(context, manager, person),
    });

    context.subscribe_by_label(
        DiseaseStateChange::label(DiseaseState::Infectious),
        move |context: &mut ActorContext<'_>, change: &DiseaseStateChange| {
            start_infection(context, manager, change.person)
        },
    )?;

    // A resumed run gets its pending plans from the snapshot
    if !context.is_resumed() {
        let infectious = context.data_manager_ref(manager)?.people_in(DiseaseState::Infectious);
        for person in infectious {
            start_infection(context, manager, person)?;
        }
    }
    Ok(())
}

fn start_infection(
    context: &mut ActorContext<'_>,
    manager: DataManagerHandle<DiseaseManager>,
    person: EntityId,
) -> SimulationResult<()> {
    let period = context.data_manager_ref(manager)?.parameters().infectious_period();
    let recovery = context.time() + period;
    DiseasePlan::Recover { person }.schedule(context, recovery)?;
    schedule_contact(context, manager, person)
}

fn schedule_contact(
    context: &mut ActorContext<'_>,
    manager: DataManagerHandle<DiseaseManager>,
    infector: EntityId,
) -> SimulationResult<()> {
    let (rate, horizon) = {
        let parameters = context.data_manager_ref(manager)?.parameters();
        (parameters.contact_rate(), parameters.horizon())
    };
    let draw: f64 = context.rng().gen();
    let time = context.time() - (1.0 - draw).ln() / rate;
    if time > horizon {
        return Ok(());
    }
    DiseasePlan::Contact { infector }.schedule(context, time)
}

fn make_contact(
    context: &mut ActorContext<'_>,
    manager: DataManagerHandle<DiseaseManager>,
    infector: EntityId,
) -> SimulationResult<()> {
    let (population, probability, infector_state) = {
        let diseases = context.data_manager_ref(manager)?;
        (diseases.population_size(), diseases.parameters().transmission_probability(), diseases.state(infector)?)
    };
    if infector_state != DiseaseState::Infectious {
        return Ok(());
    }

    let contact = EntityId(context.rng().gen_range(0..population as u64));
    let transmits = context.rng().gen::<f64>() < probability;
    if transmits
        && contact != infector
        && context.data_manager_ref(manager)?.state(contact)? == DiseaseState::Susceptible
    {
        context.mutate(manager, |diseases, scope| diseases.set_state(scope, contact, DiseaseState::Infectious))?;
    }
    schedule_contact(context, manager, infector)
}

fn recover(
    context: &mut ActorContext<'_>,
    manager: DataManagerHandle<DiseaseManager>,
    person: EntityId,
) -> SimulationResult<()> {
    context.remove_plan(&DiseasePlan::Contact { infector: person }.key());
    context.mutate(manager, |diseases, scope| diseases.set_state(scope, person, DiseaseState::Recovered))
}

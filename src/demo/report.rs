//! Compartment report
//!
//! Releases the size of each compartment once per time unit and once more
//! when the run ends. The infectious column comes from a cached index kept
//! current by state-change events; the other two from the manager's counts.

use super::manager::{DiseaseManager, DiseaseState, DiseaseStateChange};
use crate::data::DataManagerHandle;
use crate::events::CachedIndexSpec;
use crate::simulation::{PluginContext, ReportContext, ReportHeader, ReportItem, ReportPeriod, SimulationResult};
use crate::types::IndexId;

/// Report id, and the stem of its output file
pub const COMPARTMENT_REPORT: &str = "compartments";

/// Columns of the compartment report
pub const COMPARTMENT_COLUMNS: [&str; 4] = ["time", "susceptible", "infectious", "recovered"];

/// Register the compartment report
pub fn init_reports(context: &mut PluginContext<'_>) -> SimulationResult<()> {
    let manager = context.data_manager::<DiseaseManager>()?;

    context.add_report(COMPARTMENT_REPORT, move |report| {
        let infectious = report.add_cached_index(infectious_index(manager))?;
        let flush = move |report: &mut ReportContext<'_>| release_counts(report, manager, infectious);
        report.subscribe_to_period(ReportPeriod::Interval(1.0), flush)?;
        report.subscribe_to_period(ReportPeriod::EndOfSimulation, flush)
    })
}

fn infectious_index(manager: DataManagerHandle<DiseaseManager>) -> CachedIndexSpec {
    CachedIndexSpec::new(
        DiseaseState::Infectious.as_str(),
        move |kernel| Ok(kernel.data_manager_ref(manager)?.people()),
        move |kernel, person| Ok(kernel.data_manager_ref(manager)?.state(person)? == DiseaseState::Infectious),
    )
    .sensitive_to(|_, change: &DiseaseStateChange| vec![change.person])
}

fn release_counts(
    report: &mut ReportContext<'_>,
    manager: DataManagerHandle<DiseaseManager>,
    infectious: IndexId,
) -> SimulationResult<()> {
    let (susceptible, recovered) = {
        let diseases = report.data_manager_ref(manager)?;
        (diseases.count(DiseaseState::Susceptible), diseases.count(DiseaseState::Recovered))
    };
    let infectious = report.index_members(infectious)?.len();

    let values = vec![
        format!("{:.3}", report.time()),
        susceptible.to_string(),
        infectious.to_string(),
        recovered.to_string(),
    ];
    let item = ReportItem::new(ReportHeader::new(COMPARTMENT_COLUMNS), values)?;
    report.release_report_item(item)
}

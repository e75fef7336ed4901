//! Parallel scenario execution
//!
//! Scenarios run on a dedicated rayon pool, one isolated simulation each.
//! Results travel by value over a channel to the calling thread, which is
//! the only writer: it buffers out-of-order results and writes them in
//! scenario-id order, so the output files do not depend on the thread count.

use rayon::prelude::*;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::dimension::Dimension;
use super::error::ExperimentError;
use super::output::OutputManager;
use super::progress::{ProgressLog, PROGRESS_FILE};
use super::scenario::{self, ScenarioComposition, ScenarioDescriptor, ScenarioStatus};
use super::statistics::ExperimentStatistics;
use crate::data::PluginDataSet;
use crate::perf_span;
use crate::plugins::Plugin;
use crate::simulation::{Simulation, SimulationError, SimulationOutcome, SimulationResult};
use crate::types::ScenarioId;

/// Builds a scenario's plugins from its plugin data
///
/// Called on a worker thread once per scenario.
pub type PluginFactory = Arc<dyn Fn(&PluginDataSet) -> SimulationResult<Vec<Plugin>> + Send + Sync>;

/// Execution settings of an experiment
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentSettings {
    /// Worker threads; zero is treated as one
    pub thread_count: usize,
    /// Seed every scenario seed is derived from
    pub master_seed: u64,
    /// Directory for report files and the progress log
    pub output_directory: PathBuf,
    /// Skip scenarios the progress log records as succeeded
    pub continue_from_progress: bool,
    /// Stop the experiment at the first failed scenario
    pub halt_on_failure: bool,
    /// Halt time applied to every scenario
    pub halt_time: Option<f64>,
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            thread_count: 1,
            master_seed: 0,
            output_directory: PathBuf::from("output"),
            continue_from_progress: false,
            halt_on_failure: false,
            halt_time: None,
        }
    }
}

/// Outcome of an experiment execution
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    /// Final status of every scenario
    pub statuses: BTreeMap<ScenarioId, ScenarioStatus>,
    /// Failure detail of every scenario that failed in this execution
    pub failures: BTreeMap<ScenarioId, String>,
    /// Aggregated counters
    pub statistics: ExperimentStatistics,
}

impl ExperimentReport {
    /// Status of one scenario
    pub fn status(&self, scenario: ScenarioId) -> Option<ScenarioStatus> {
        self.statuses.get(&scenario).copied()
    }

    /// Check if every scenario has succeeded, now or earlier
    pub fn all_succeeded(&self) -> bool {
        self.statuses
            .values()
            .all(|status| matches!(status, ScenarioStatus::Succeeded | ScenarioStatus::PreviouslySucceeded))
    }
}

/// A set of scenarios over one plugin factory
///
/// ```rust,no_run
/// use agent_sim_kernel::experiment::{Dimension, Experiment, ExperimentSettings};
/// use agent_sim_kernel::plugins::Plugin;
///
/// let experiment = Experiment::new(|_data| Ok(vec![Plugin::new("empty", |_| Ok(()))]))
///     .add_dimension(Dimension::new("replicate", ["replicate"])
///         .with_level(|_| Ok(vec!["a".into()]))
///         .with_level(|_| Ok(vec!["b".into()])))
///     .with_settings(ExperimentSettings { thread_count: 2, ..ExperimentSettings::default() });
///
/// let report = experiment.execute().unwrap();
/// assert!(report.all_succeeded());
/// ```
#[derive(Clone)]
pub struct Experiment {
    base: PluginDataSet,
    dimensions: Vec<Dimension>,
    composition: ScenarioComposition,
    factory: PluginFactory,
    settings: ExperimentSettings,
}

impl Experiment {
    /// Create an experiment with empty base data and no dimensions
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&PluginDataSet) -> SimulationResult<Vec<Plugin>> + Send + Sync + 'static,
    {
        Self {
            base: PluginDataSet::new(),
            dimensions: Vec::new(),
            composition: ScenarioComposition::default(),
            factory: Arc::new(factory),
            settings: ExperimentSettings::default(),
        }
    }

    /// Plugin data every scenario starts from
    pub fn with_base_data(mut self, base: PluginDataSet) -> Self {
        self.base = base;
        self
    }

    /// Append a dimension
    pub fn add_dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    /// Choose how levels combine into scenarios
    pub fn with_composition(mut self, composition: ScenarioComposition) -> Self {
        self.composition = composition;
        self
    }

    /// Replace the execution settings
    pub fn with_settings(mut self, settings: ExperimentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Execution settings
    pub fn settings(&self) -> &ExperimentSettings {
        &self.settings
    }

    /// Metadata columns of the output files
    pub fn meta_columns(&self) -> Vec<String> {
        scenario::meta_columns(&self.dimensions)
    }

    /// All scenarios of the experiment
    pub fn expand(&self) -> Result<Vec<ScenarioDescriptor>, ExperimentError> {
        Ok(scenario::expand(&self.base, &self.dimensions, &self.composition, self.settings.master_seed)?)
    }

    /// Run the experiment
    ///
    /// Continues from the progress log when `continue_from_progress` is set.
    pub fn execute(&self) -> Result<ExperimentReport, ExperimentError> {
        self.run(self.settings.continue_from_progress)
    }

    /// Run only the scenarios the progress log does not record as succeeded
    pub fn resume(&self) -> Result<ExperimentReport, ExperimentError> {
        self.run(true)
    }

    fn run(&self, resume: bool) -> Result<ExperimentReport, ExperimentError> {
        let started = Instant::now();
        let settings = &self.settings;
        let scenarios = self.expand()?;
        let thread_count = settings.thread_count.max(1);

        let span = perf_span!("experiment", scenarios = scenarios.len(), threads = thread_count);
        let _enter = span.enter();

        let directory = &settings.output_directory;
        fs::create_dir_all(directory)?;
        let progress_path = directory.join(PROGRESS_FILE);
        let resuming = resume && progress_path.exists();
        if resume && !resuming {
            warn!("No progress log in {:?}, starting from scratch", directory);
        }

        let (progress, previous) = if resuming {
            let (log, snapshot) = ProgressLog::resume(&progress_path, scenarios.len(), settings.master_seed)?;
            (log, snapshot.succeeded())
        } else {
            (ProgressLog::create(&progress_path, scenarios.len(), settings.master_seed)?, BTreeSet::new())
        };
        let output = if resuming {
            OutputManager::resume(directory, self.meta_columns(), &previous)?
        } else {
            OutputManager::create(directory, self.meta_columns())?
        };

        let mut writer = ResultWriter {
            output,
            progress,
            statuses: BTreeMap::new(),
            failures: BTreeMap::new(),
            statistics: ExperimentStatistics::new(scenarios.len(), thread_count),
            halt_on_failure: settings.halt_on_failure,
        };
        for scenario in &scenarios {
            let status = if previous.contains(&scenario.id()) {
                writer.statistics.record_previous_success();
                ScenarioStatus::PreviouslySucceeded
            } else {
                ScenarioStatus::Ready
            };
            writer.statuses.insert(scenario.id(), status);
        }

        let pending: Vec<&ScenarioDescriptor> =
            scenarios.iter().filter(|scenario| !previous.contains(&scenario.id())).collect();
        info!(
            "Running {} of {} scenarios on {} threads",
            pending.len(),
            scenarios.len(),
            thread_count
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_count)
            .thread_name(|index| format!("scenario-worker-{}", index))
            .build()
            .map_err(|error| ExperimentError::ThreadPool(error.to_string()))?;

        let abort = AtomicBool::new(false);
        let order: Vec<ScenarioId> = pending.iter().map(|scenario| scenario.id()).collect();
        let (sender, receiver) = mpsc::channel::<ScenarioResult>();

        let fatal = thread::scope(|scope| {
            let abort = &abort;
            let pending = &pending;
            let factory = &self.factory;
            scope.spawn(move || {
                pool.install(|| {
                    pending.par_iter().for_each_with(sender, |sender, scenario| {
                        if abort.load(Ordering::Acquire) {
                            return;
                        }
                        let result = run_scenario(factory, scenario, settings);
                        // The receiver outlives every worker
                        let _ = sender.send(result);
                    });
                });
            });
            writer.drain(receiver, order, abort)
        });

        let mut statistics = writer.statistics;
        statistics.not_run = writer.statuses.values().filter(|status| **status == ScenarioStatus::Ready).count();
        statistics.wall_time = started.elapsed();

        if let Some(error) = fatal {
            error!("{}", statistics.summary());
            return Err(error);
        }
        info!("{}", statistics.summary());

        Ok(ExperimentReport { statuses: writer.statuses, failures: writer.failures, statistics })
    }
}

impl std::fmt::Debug for Experiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Experiment")
            .field("dimensions", &self.dimensions)
            .field("composition", &self.composition)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// One scenario's result as sent to the writer
struct ScenarioResult {
    scenario: ScenarioId,
    meta_values: Vec<String>,
    outcome: SimulationResult<SimulationOutcome>,
}

/// Build and run one scenario, catching panics at the instance boundary
fn run_scenario(factory: &PluginFactory, scenario: &ScenarioDescriptor, settings: &ExperimentSettings) -> ScenarioResult {
    let span = tracing::debug_span!("scenario", id = %scenario.id(), seed = scenario.seed());
    let _enter = span.enter();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let plugins = factory(scenario.data())?;
        let mut builder = Simulation::builder()
            .add_plugins(plugins)
            .seed(scenario.seed())
            .scenario(scenario.id());
        if let Some(halt_time) = settings.halt_time {
            builder = builder.halt_time(halt_time);
        }
        builder.build()?.run()
    }))
    .unwrap_or_else(|payload| Err(SimulationError::Panicked(panic_message(payload.as_ref()))));

    ScenarioResult { scenario: scenario.id(), meta_values: scenario.meta_values().to_vec(), outcome }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// State owned by the single writer thread
struct ResultWriter {
    output: OutputManager,
    progress: ProgressLog,
    statuses: BTreeMap<ScenarioId, ScenarioStatus>,
    failures: BTreeMap<ScenarioId, String>,
    statistics: ExperimentStatistics,
    halt_on_failure: bool,
}

impl ResultWriter {
    /// Write results in `order` until the channel closes or a fatal error
    ///
    /// After a fatal error the channel is still drained so workers finish.
    fn drain(
        &mut self,
        receiver: mpsc::Receiver<ScenarioResult>,
        order: Vec<ScenarioId>,
        abort: &AtomicBool,
    ) -> Option<ExperimentError> {
        let mut next = order.into_iter().peekable();
        let mut buffered: BTreeMap<ScenarioId, ScenarioResult> = BTreeMap::new();
        let mut fatal = None;

        for result in receiver {
            if fatal.is_some() {
                continue;
            }
            buffered.insert(result.scenario, result);

            while let Some(id) = next.peek().copied() {
                let Some(result) = buffered.remove(&id) else {
                    break;
                };
                next.next();
                if let Err(error) = self.accept(result) {
                    abort.store(true, Ordering::Release);
                    fatal = Some(error);
                    break;
                }
            }
        }

        if fatal.is_none() && !buffered.is_empty() {
            debug!("{} results left behind an aborted scenario", buffered.len());
        }
        fatal
    }

    fn accept(&mut self, result: ScenarioResult) -> Result<(), ExperimentError> {
        let scenario = result.scenario;
        match result.outcome {
            Ok(outcome) => {
                let (lines, failures) =
                    self.output.write_scenario(scenario, &result.meta_values, &outcome.report_items);
                if failures.is_empty() {
                    self.progress.record(scenario, ScenarioStatus::Succeeded, None)?;
                    self.statuses.insert(scenario, ScenarioStatus::Succeeded);
                    self.statistics.record_success(&outcome.statistics, lines);
                    debug!("Scenario {} succeeded with {} lines", scenario, lines);
                    Ok(())
                } else {
                    let detail = failures
                        .iter()
                        .map(|failure| format!("{}: {}", failure.report, failure.error))
                        .collect::<Vec<_>>()
                        .join("; ");
                    self.fail(scenario, detail)
                }
            }
            Err(SimulationError::Structural(source)) => {
                error!("Scenario {} failed structurally: {}", scenario, source);
                self.mark_failed(scenario, source.to_string())?;
                Err(ExperimentError::Structural { scenario, source })
            }
            Err(error) => self.fail(scenario, error.to_string()),
        }
    }

    fn fail(&mut self, scenario: ScenarioId, detail: String) -> Result<(), ExperimentError> {
        warn!("Scenario {} failed: {}", scenario, detail);
        self.mark_failed(scenario, detail.clone())?;
        if self.halt_on_failure {
            return Err(ExperimentError::HaltedOnFailure { scenario, detail });
        }
        Ok(())
    }

    fn mark_failed(&mut self, scenario: ScenarioId, detail: String) -> Result<(), ExperimentError> {
        self.progress.record(scenario, ScenarioStatus::Failed, Some(detail.clone()))?;
        self.statuses.insert(scenario, ScenarioStatus::Failed);
        self.failures.insert(scenario, detail);
        self.statistics.record_failure();
        Ok(())
    }
}

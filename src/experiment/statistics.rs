//! Experiment statistics
//!
//! Per-scenario run counters are folded into one summary as results reach
//! the writer thread.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::simulation::RunStatistics;

/// Summary of one experiment execution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExperimentStatistics {
    // Scenario outcomes
    /// Scenarios in the experiment
    pub scenario_count: usize,
    /// Scenarios that succeeded in this execution
    pub succeeded: usize,
    /// Scenarios that failed in this execution
    pub failed: usize,
    /// Scenarios skipped because an earlier execution completed them
    pub previously_succeeded: usize,
    /// Scenarios not run because the experiment stopped early
    pub not_run: usize,

    // Aggregated run counters
    /// Plans executed across all succeeded scenarios
    pub plans_executed: u64,
    /// Events published across all succeeded scenarios
    pub events_published: u64,
    /// Output lines written
    pub report_lines: usize,

    // Execution
    /// Worker threads used
    pub thread_count: usize,
    /// Wall-clock duration of the execution
    pub wall_time: Duration,
}

impl ExperimentStatistics {
    /// Create statistics for an experiment of `scenario_count` scenarios
    pub fn new(scenario_count: usize, thread_count: usize) -> Self {
        Self { scenario_count, thread_count, ..Self::default() }
    }

    /// Fold in a succeeded scenario
    pub fn record_success(&mut self, run: &RunStatistics, report_lines: usize) {
        self.succeeded += 1;
        self.plans_executed += run.plans_executed;
        self.events_published += run.events_published;
        self.report_lines += report_lines;
    }

    /// Count a failed scenario
    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Count a skipped scenario
    pub fn record_previous_success(&mut self) {
        self.previously_succeeded += 1;
    }

    /// Scenarios with a final outcome
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed + self.previously_succeeded
    }

    /// Percentage of scenarios that have succeeded, now or earlier
    pub fn success_percentage(&self) -> f64 {
        if self.scenario_count > 0 {
            (self.succeeded + self.previously_succeeded) as f64 / self.scenario_count as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Scenarios run per second of wall time
    pub fn scenarios_per_second(&self) -> f64 {
        let seconds = self.wall_time.as_secs_f64();
        if seconds > 0.0 {
            (self.succeeded + self.failed) as f64 / seconds
        } else {
            0.0
        }
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        format!(
            "Experiment Summary: {} scenarios | Succeeded: {} | Failed: {} | Skipped: {} | Not run: {} | {:.1}% complete",
            self.scenario_count,
            self.succeeded,
            self.failed,
            self.previously_succeeded,
            self.not_run,
            self.success_percentage()
        )
    }

    /// Multi-line report for the end of a command-line run
    pub fn generate_summary_report(&self) -> String {
        let mut report = String::new();
        report.push_str("=== Experiment Statistics ===\n");
        report.push_str(&format!("Scenarios: {}\n", self.scenario_count));
        report.push_str(&format!("  Succeeded: {}\n", self.succeeded));
        report.push_str(&format!("  Failed: {}\n", self.failed));
        report.push_str(&format!("  Previously succeeded: {}\n", self.previously_succeeded));
        report.push_str(&format!("  Not run: {}\n", self.not_run));
        report.push_str(&format!("Plans executed: {}\n", self.plans_executed));
        report.push_str(&format!("Events published: {}\n", self.events_published));
        report.push_str(&format!("Report lines written: {}\n", self.report_lines));
        report.push_str(&format!(
            "Wall time: {:.2?} on {} threads ({:.1} scenarios/s)\n",
            self.wall_time,
            self.thread_count,
            self.scenarios_per_second()
        ));
        report
    }
}

impl fmt::Display for ExperimentStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

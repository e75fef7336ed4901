//! Statistics collection for a single simulation run

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Counters gathered while one simulation instance runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    // Registration
    /// Number of plugins initialized
    pub plugins: usize,
    /// Number of data managers registered
    pub data_managers: usize,
    /// Number of actors registered
    pub actors: usize,
    /// Number of reports registered
    pub reports: usize,

    // Execution
    /// Plans whose callbacks ran
    pub plans_executed: u64,
    /// Plans restored from a state snapshot
    pub plans_restored: usize,
    /// Events published through the bus
    pub events_published: u64,
    /// Report items released
    pub report_items: usize,
    /// Simulation time when the run ended
    pub final_time: f64,
    /// Whether the run ended because of the halt time or a halt request
    pub halted: bool,

    /// Wall-clock duration of the run
    pub wall_time: Duration,
}

impl RunStatistics {
    /// Create empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one executed plan
    pub fn increment_plans_executed(&mut self) {
        self.plans_executed += 1;
    }

    /// Average events published per executed plan
    pub fn events_per_plan(&self) -> f64 {
        if self.plans_executed == 0 {
            0.0
        } else {
            self.events_published as f64 / self.plans_executed as f64
        }
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "Run Summary: t={:.3} | {} plans ({} restored) | {} events ({:.2}/plan) | {} report items{}",
            self.final_time,
            self.plans_executed,
            self.plans_restored,
            self.events_published,
            self.events_per_plan(),
            self.report_items,
            if self.halted { " | halted" } else { "" }
        )
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_per_plan() {
        let mut stats = RunStatistics::new();
        assert_eq!(stats.events_per_plan(), 0.0);

        stats.increment_plans_executed();
        stats.increment_plans_executed();
        stats.events_published = 5;
        assert_eq!(stats.events_per_plan(), 2.5);
    }

    #[test]
    fn test_summary_mentions_halt() {
        let stats = RunStatistics { halted: true, final_time: 10.0, ..Default::default() };
        assert!(stats.summary().contains("halted"));
        assert!(stats.to_string().starts_with("Run Summary: t=10.000"));
    }
}

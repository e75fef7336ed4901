//! Experiment progress log
//!
//! A JSON-lines file next to the report output. The first record names the
//! experiment (scenario count and master seed); every later record is the
//! outcome of one scenario. Records are appended only after that scenario's
//! output has been flushed, so a succeeded record always has its lines on
//! disk. A crash can leave a partial trailing record; it is dropped when the
//! log is resumed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::error::ExperimentError;
use super::scenario::ScenarioStatus;
use crate::types::ScenarioId;

/// File name of the progress log inside the output directory
pub const PROGRESS_FILE: &str = "progress.jsonl";

/// One line of the progress log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum ProgressRecord {
    /// Experiment header
    Experiment {
        /// Number of scenarios
        scenario_count: usize,
        /// Master seed
        master_seed: u64,
        /// When the log was created
        started_at: DateTime<Utc>,
    },
    /// Outcome of one scenario
    Scenario {
        /// Scenario id
        scenario_id: ScenarioId,
        /// Outcome
        status: ScenarioStatus,
        /// When the outcome was recorded
        completed_at: DateTime<Utc>,
        /// Failure detail
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

/// Statuses recovered from an existing log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// Scenario count from the header
    pub scenario_count: usize,
    /// Master seed from the header
    pub master_seed: u64,
    /// Latest recorded status per scenario
    pub statuses: BTreeMap<ScenarioId, ScenarioStatus>,
}

impl ProgressSnapshot {
    /// Scenarios whose output is complete on disk
    pub fn succeeded(&self) -> BTreeSet<ScenarioId> {
        self.statuses
            .iter()
            .filter(|(_, status)| matches!(status, ScenarioStatus::Succeeded | ScenarioStatus::PreviouslySucceeded))
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Append-only writer for the progress log
#[derive(Debug)]
pub struct ProgressLog {
    path: PathBuf,
    file: File,
}

impl ProgressLog {
    /// Start a new log, replacing any existing one
    pub fn create(path: impl AsRef<Path>, scenario_count: usize, master_seed: u64) -> Result<Self, ExperimentError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut log = Self { path, file };
        log.append(&ProgressRecord::Experiment { scenario_count, master_seed, started_at: Utc::now() })?;
        debug!("Created progress log {:?}", log.path);
        Ok(log)
    }

    /// Reopen an existing log for the same experiment
    ///
    /// A partial trailing record is truncated away before appending resumes.
    pub fn resume(
        path: impl AsRef<Path>,
        scenario_count: usize,
        master_seed: u64,
    ) -> Result<(Self, ProgressSnapshot), ExperimentError> {
        let path = path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path)?;
        let complete = complete_prefix(&content);
        if complete.len() < content.len() {
            warn!("Dropping partial trailing record from {:?}", path);
        }

        let snapshot = parse(&path, complete)?;
        if snapshot.scenario_count != scenario_count || snapshot.master_seed != master_seed {
            return Err(ExperimentError::ProgressMismatch {
                expected_scenarios: scenario_count,
                found_scenarios: snapshot.scenario_count,
                expected_seed: master_seed,
                found_seed: snapshot.master_seed,
            });
        }

        let file = OpenOptions::new().write(true).open(&path)?;
        file.set_len(complete.len() as u64)?;
        drop(file);
        let file = OpenOptions::new().append(true).open(&path)?;

        debug!("Resumed progress log {:?} with {} recorded scenarios", path, snapshot.statuses.len());
        Ok((Self { path, file }, snapshot))
    }

    /// Read an existing log without opening it for appending
    pub fn read(path: impl AsRef<Path>) -> Result<ProgressSnapshot, ExperimentError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        parse(path, complete_prefix(&content))
    }

    /// Record one scenario outcome
    pub fn record(
        &mut self,
        scenario_id: ScenarioId,
        status: ScenarioStatus,
        detail: Option<String>,
    ) -> Result<(), ExperimentError> {
        self.append(&ProgressRecord::Scenario { scenario_id, status, completed_at: Utc::now(), detail })
    }

    /// Path of the log
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&mut self, record: &ProgressRecord) -> Result<(), ExperimentError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}

/// The newline-terminated part of `content`
pub(crate) fn complete_prefix(content: &str) -> &str {
    match content.rfind('\n') {
        Some(end) => &content[..=end],
        None => "",
    }
}

fn parse(path: &Path, content: &str) -> Result<ProgressSnapshot, ExperimentError> {
    let corrupt = |line: usize, reason: String| ExperimentError::CorruptProgressLog {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut lines = content.lines().enumerate().filter(|(_, line)| !line.trim().is_empty());
    let mut snapshot = match lines.next() {
        Some((index, line)) => match serde_json::from_str(line) {
            Ok(ProgressRecord::Experiment { scenario_count, master_seed, .. }) => {
                ProgressSnapshot { scenario_count, master_seed, statuses: BTreeMap::new() }
            }
            Ok(_) => return Err(corrupt(index + 1, "first record is not an experiment header".into())),
            Err(error) => return Err(corrupt(index + 1, error.to_string())),
        },
        None => return Err(corrupt(1, "missing experiment header".into())),
    };

    for (index, line) in lines {
        match serde_json::from_str(line) {
            Ok(ProgressRecord::Scenario { scenario_id, status, .. }) => {
                snapshot.statuses.insert(scenario_id, status);
            }
            Ok(ProgressRecord::Experiment { .. }) => {
                return Err(corrupt(index + 1, "repeated experiment header".into()));
            }
            Err(error) => return Err(corrupt(index + 1, error.to_string())),
        }
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_record_and_resume() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PROGRESS_FILE);

        let mut log = ProgressLog::create(&path, 3, 42).unwrap();
        log.record(ScenarioId(1), ScenarioStatus::Succeeded, None).unwrap();
        log.record(ScenarioId(0), ScenarioStatus::Failed, Some("boom".into())).unwrap();
        drop(log);

        let (_, snapshot) = ProgressLog::resume(&path, 3, 42).unwrap();
        assert_eq!(snapshot.statuses.len(), 2);
        assert_eq!(snapshot.statuses[&ScenarioId(0)], ScenarioStatus::Failed);
        assert_eq!(snapshot.succeeded(), BTreeSet::from([ScenarioId(1)]));
    }

    #[test]
    fn test_partial_trailing_record_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PROGRESS_FILE);

        let mut log = ProgressLog::create(&path, 2, 7).unwrap();
        log.record(ScenarioId(0), ScenarioStatus::Succeeded, None).unwrap();
        drop(log);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"record\":\"scenario\",\"scenario_id\":1,\"sta").unwrap();
        drop(file);

        let (mut log, snapshot) = ProgressLog::resume(&path, 2, 7).unwrap();
        assert_eq!(snapshot.succeeded(), BTreeSet::from([ScenarioId(0)]));

        log.record(ScenarioId(1), ScenarioStatus::Succeeded, None).unwrap();
        drop(log);
        let (_, snapshot) = ProgressLog::resume(&path, 2, 7).unwrap();
        assert_eq!(snapshot.succeeded().len(), 2);
    }

    #[test]
    fn test_mismatched_experiment_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PROGRESS_FILE);
        ProgressLog::create(&path, 2, 7).unwrap();

        let error = ProgressLog::resume(&path, 3, 7).unwrap_err();
        assert!(matches!(error, ExperimentError::ProgressMismatch { found_scenarios: 2, .. }));
        assert!(ProgressLog::resume(&path, 2, 8).is_err());
    }

    #[test]
    fn test_read_leaves_log_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PROGRESS_FILE);
        let mut log = ProgressLog::create(&path, 4, 99).unwrap();
        log.record(ScenarioId(2), ScenarioStatus::Succeeded, None).unwrap();
        drop(log);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"record\"").unwrap();
        drop(file);
        let before = fs::read_to_string(&path).unwrap();

        let snapshot = ProgressLog::read(&path).unwrap();
        assert_eq!(snapshot.master_seed, 99);
        assert_eq!(snapshot.scenario_count, 4);
        assert_eq!(snapshot.succeeded(), BTreeSet::from([ScenarioId(2)]));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_complete_prefix() {
        assert_eq!(complete_prefix("a\nb\npart"), "a\nb\n");
        assert_eq!(complete_prefix("a\n"), "a\n");
        assert_eq!(complete_prefix("part"), "");
    }
}

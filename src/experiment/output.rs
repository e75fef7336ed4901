//! Resumable tab-delimited report output
//!
//! Each report gets one file, `<report>.tsv`, in the output directory. The
//! first line is the header `scenario`, the experiment's metadata columns
//! and the report's own columns. Every later line is one report row prefixed
//! by its scenario id and metadata values. A scenario's lines for one report
//! go out in a single write followed by a flush, so a crash leaves at most a
//! partial trailing line, which the next resume drops.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::error::ExperimentError;
use super::progress::complete_prefix;
use crate::simulation::ReportItem;
use crate::types::{ReportId, ScenarioId};

/// Extension of report output files
pub const OUTPUT_EXTENSION: &str = "tsv";

/// Why a scenario's rows for one report were not written
#[derive(Debug)]
pub struct StreamFailure {
    /// Report whose stream failed
    pub report: ReportId,
    /// What went wrong
    pub error: io::Error,
}

#[derive(Debug)]
struct ReportStream {
    path: PathBuf,
    header: Option<String>,
    file: Option<File>,
    poisoned: bool,
}

impl ReportStream {
    fn write(&mut self, header: &str, lines: &str) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other(format!("stream {:?} failed earlier", self.path)));
        }
        if let Some(existing) = &self.header {
            if existing != header {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("header {:?} does not match {:?} in {:?}", header, existing, self.path),
                ));
            }
        }

        let mut buffer = String::new();
        if self.header.is_none() {
            buffer.push_str(header);
            buffer.push('\n');
        }
        buffer.push_str(lines);

        let result = self.append(&buffer);
        match &result {
            Ok(()) => {
                if self.header.is_none() {
                    self.header = Some(header.to_string());
                }
            }
            Err(_) => self.poisoned = true,
        }
        result
    }

    fn append(&mut self, buffer: &str) -> io::Result<()> {
        if self.file.is_none() {
            // A stream without a header was never written this execution
            let file = if self.header.is_some() {
                OpenOptions::new().append(true).open(&self.path)?
            } else {
                File::create(&self.path)?
            };
            self.file = Some(file);
        }
        match self.file.as_mut() {
            Some(file) => {
                file.write_all(buffer.as_bytes())?;
                file.flush()
            }
            None => Err(io::Error::other("report stream not open")),
        }
    }
}

/// Writes report rows of many scenarios into per-report files
#[derive(Debug)]
pub struct OutputManager {
    directory: PathBuf,
    meta_columns: Vec<String>,
    streams: BTreeMap<ReportId, ReportStream>,
}

impl OutputManager {
    /// Start fresh output in `directory`
    ///
    /// Files of reports written by this execution are truncated on first use.
    pub fn create(directory: impl AsRef<Path>, meta_columns: Vec<String>) -> Result<Self, ExperimentError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory, meta_columns, streams: BTreeMap::new() })
    }

    /// Continue output in `directory`, keeping only the rows of `keep`
    ///
    /// Headers are kept verbatim. Rows of other scenarios and partial
    /// trailing lines are removed; a file is rewritten only if that changed
    /// its content.
    pub fn resume(
        directory: impl AsRef<Path>,
        meta_columns: Vec<String>,
        keep: &BTreeSet<ScenarioId>,
    ) -> Result<Self, ExperimentError> {
        let mut output = Self::create(directory, meta_columns)?;

        for entry in fs::read_dir(&output.directory)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(OUTPUT_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let content = fs::read_to_string(&path)?;
            let complete = complete_prefix(&content);
            let mut lines = complete.lines();
            let header = lines.next().map(str::to_string);

            let mut kept = String::new();
            if let Some(header) = &header {
                kept.push_str(header);
                kept.push('\n');
            }
            for line in lines {
                let scenario = line.split('\t').next().and_then(|id| id.parse().ok()).map(ScenarioId);
                if scenario.is_some_and(|id| keep.contains(&id)) {
                    kept.push_str(line);
                    kept.push('\n');
                }
            }

            if kept != content {
                debug!("Cleaning {:?}: {} bytes kept of {}", path, kept.len(), content.len());
                fs::write(&path, &kept)?;
            }

            output.streams.insert(
                ReportId::new(stem),
                ReportStream { path, header, file: None, poisoned: false },
            );
        }

        Ok(output)
    }

    /// Output directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of a report's output file
    pub fn report_path(&self, report: &ReportId) -> PathBuf {
        self.directory.join(format!("{}.{}", report.as_str(), OUTPUT_EXTENSION))
    }

    /// Write one scenario's rows, grouped by report in first-release order
    ///
    /// Returns the number of lines written and the reports whose streams
    /// failed. A failed stream stays failed for the rest of the execution.
    pub fn write_scenario(
        &mut self,
        scenario: ScenarioId,
        meta_values: &[String],
        items: &[ReportItem],
    ) -> (usize, Vec<StreamFailure>) {
        let mut grouped: Vec<(ReportId, String, String)> = Vec::new();
        let mut written = 0;

        for item in items {
            let Some(report) = item.report_id() else {
                continue;
            };
            let position = match grouped.iter().position(|(id, _, _)| id == report) {
                Some(position) => position,
                None => {
                    grouped.push((report.clone(), self.header_line(item), String::new()));
                    grouped.len() - 1
                }
            };
            let line = self.data_line(scenario, meta_values, item.values());
            grouped[position].2.push_str(&line);
            grouped[position].2.push('\n');
        }

        let mut failures = Vec::new();
        for (report, header, lines) in grouped {
            let path = self.report_path(&report);
            let stream = self
                .streams
                .entry(report.clone())
                .or_insert_with(|| ReportStream { path, header: None, file: None, poisoned: false });
            match stream.write(&header, &lines) {
                Ok(()) => written += lines.lines().count(),
                Err(error) => {
                    warn!("Report {} output failed for scenario {}: {}", report, scenario, error);
                    failures.push(StreamFailure { report, error });
                }
            }
        }
        (written, failures)
    }

    fn header_line(&self, item: &ReportItem) -> String {
        std::iter::once("scenario")
            .chain(self.meta_columns.iter().map(String::as_str))
            .chain(item.header().columns().iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\t")
    }

    fn data_line(&self, scenario: ScenarioId, meta_values: &[String], values: &[String]) -> String {
        let id = scenario.to_string();
        std::iter::once(id.as_str())
            .chain(meta_values.iter().map(String::as_str))
            .chain(values.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\t")
    }
}

//! Report rows and headers
//!
//! A report releases rows of string values under a header. The first row a
//! report releases fixes its header for the rest of the run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::{ContractError, ContractErrorKind};
use crate::types::ReportId;

/// Column names of a report
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportHeader {
    columns: Vec<String>,
}

impl ReportHeader {
    /// Create a header from column names
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { columns: columns.into_iter().map(Into::into).collect() }
    }

    /// Column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if the header has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One row released by a report
///
/// ```rust
/// use agent_sim_kernel::simulation::{ReportHeader, ReportItem};
///
/// let header = ReportHeader::new(["day", "infected"]);
/// let item = ReportItem::new(header.clone(), vec!["3".into(), "17".into()]).unwrap();
/// assert_eq!(item.values(), ["3", "17"]);
/// assert!(ReportItem::new(header, vec!["3".into()]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportItem {
    report_id: Option<ReportId>,
    header: ReportHeader,
    values: Vec<String>,
}

impl ReportItem {
    /// Create a row; the value count must match the header
    pub fn new(header: ReportHeader, values: Vec<String>) -> Result<Self, ContractError> {
        if header.is_empty() || header.len() != values.len() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidReportItem,
                format!("{} values for {} columns", values.len(), header.len()),
            ));
        }
        if let Some(value) = values.iter().find(|value| value.contains(['\t', '\n', '\r'])) {
            return Err(ContractError::new(
                ContractErrorKind::InvalidReportItem,
                format!("value {:?} contains a delimiter", value),
            ));
        }
        Ok(Self { report_id: None, header, values })
    }

    /// Report that released the row; set on release
    pub fn report_id(&self) -> Option<&ReportId> {
        self.report_id.as_ref()
    }

    pub(crate) fn set_report_id(&mut self, report: ReportId) {
        self.report_id = Some(report);
    }

    /// Header of the row
    pub fn header(&self) -> &ReportHeader {
        &self.header
    }

    /// Row values, one per header column
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// When a report's periodic flush runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReportPeriod {
    /// Every `dt` time units, starting `dt` after registration
    Interval(f64),
    /// Once, after the last plan has run
    EndOfSimulation,
}

/// Rows released during one run, with header consistency checks
#[derive(Debug, Default)]
pub(crate) struct ReportCollector {
    headers: HashMap<ReportId, ReportHeader>,
    items: Vec<ReportItem>,
}

impl ReportCollector {
    pub(crate) fn release(&mut self, report: ReportId, mut item: ReportItem) -> Result<(), ContractError> {
        match self.headers.get(&report) {
            Some(header) if header != &item.header => {
                return Err(ContractError::new(
                    ContractErrorKind::ReportHeaderMismatch,
                    format!(
                        "{} released {:?} after {:?}",
                        report,
                        item.header.columns(),
                        header.columns()
                    ),
                ));
            }
            Some(_) => {}
            None => {
                self.headers.insert(report.clone(), item.header.clone());
            }
        }
        item.set_report_id(report);
        self.items.push(item);
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn into_items(self) -> Vec<ReportItem> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_fixed_by_first_row() {
        let mut collector = ReportCollector::default();
        let report = ReportId::new("daily");
        let header = ReportHeader::new(["day", "count"]);

        collector
            .release(report.clone(), ReportItem::new(header.clone(), vec!["1".into(), "2".into()]).unwrap())
            .unwrap();
        collector
            .release(report.clone(), ReportItem::new(header, vec!["2".into(), "5".into()]).unwrap())
            .unwrap();

        let other = ReportHeader::new(["day", "total"]);
        let error = collector
            .release(report.clone(), ReportItem::new(other, vec!["3".into(), "1".into()]).unwrap())
            .unwrap_err();
        assert_eq!(error.kind, ContractErrorKind::ReportHeaderMismatch);

        let items = collector.into_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].report_id(), Some(&report));
    }

    #[test]
    fn test_delimiters_rejected() {
        let header = ReportHeader::new(["note"]);
        let error = ReportItem::new(header, vec!["a\tb".into()]).unwrap_err();
        assert_eq!(error.kind, ContractErrorKind::InvalidReportItem);
    }
}

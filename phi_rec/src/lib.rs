//! Core Phi contribution reconstruction for PEST record (`.rec`) files.
//!
//! The pipeline is a chain of plain functions:
//! [`tokenize_lines`] → [`extract_contributions`] → [`reconstruct`] → [`IterationTable`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod extract;
pub mod reconstruct;
pub mod table;
pub mod tokenize;

pub use extract::{extract_contributions, ContributionRecord};
pub use reconstruct::reconstruct;
pub use table::{net_phi, IterationRow, IterationTable, ITERATION_COLUMN, NET_PHI_COLUMN};
pub use tokenize::{tokenize_lines, ReportLine};

#[derive(Error, Debug)]
pub enum PhiError {
    #[error("failed to read report {}: {source}", path.display())]
    InputNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no '{marker}' lines found; not a PEST record file or the format has changed")]
    NoContributionData { marker: String },
    #[error("malformed record on line {line_no}: {reason} ('{token}') in: {line}")]
    MalformedRecord {
        line_no: usize,
        token: String,
        reason: &'static str,
        line: String,
    },
    #[error("NetPhi of iteration {iteration} is not finite (block ends on line {line_no})")]
    NonFiniteNetPhi { iteration: usize, line_no: usize },
    #[error("inconsistent block structure: {0}")]
    InconsistentBlockStructure(#[from] BlockFault),
}

/// Which block-structure rule a report broke.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockFault {
    #[error("group '{group}' repeats within the baseline block (line {line_no})")]
    DuplicateBaselineGroup { group: String, line_no: usize },
    #[error("{remaining} records after the baseline block do not divide into blocks of {groups} groups")]
    UnevenBlocks { remaining: usize, groups: usize },
    #[error("report holds only the baseline block; no iterations follow it")]
    NoIterations,
    #[error(
        "iteration {iteration} expected group '{expected}' but found '{found}' (line {line_no})"
    )]
    GroupOrderMismatch {
        iteration: usize,
        expected: String,
        found: String,
        line_no: usize,
    },
    #[error("group '{group}' has {found} values, expected {expected}")]
    GroupCountMismatch {
        group: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Params {
    /// Leading token identifying a contribution line.
    pub marker: String,
    /// Extension appended to the run identifier to locate the report.
    pub report_extension: String,
    pub chart_suffix: String,
    pub table_suffix: String,
    pub chart_width: u32,
    pub chart_height: u32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            marker: "Contribution".to_string(),
            report_extension: "rec".to_string(),
            chart_suffix: "__Phi_Out_wide.png".to_string(),
            table_suffix: "__Data_Table.csv".to_string(),
            chart_width: 1600,
            chart_height: 900,
        }
    }
}

impl Params {
    pub fn report_path(&self, run: &str) -> PathBuf {
        PathBuf::from(format!("{}.{}", run, self.report_extension))
    }

    pub fn chart_path(&self, run: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", run, self.chart_suffix))
    }

    pub fn table_path(&self, run: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", run, self.table_suffix))
    }
}

/// Read a report from disk.
pub fn load_report(path: &Path) -> Result<String, PhiError> {
    let bytes = fs::read(path).map_err(|source| PhiError::InputNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    // Record files occasionally carry latin-1 bytes in titles; they never touch marker lines.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Run the full text → table pipeline on an in-memory report.
pub fn reconstruct_report(text: &str, params: &Params) -> Result<IterationTable, PhiError> {
    let lines = tokenize_lines(text);
    let records = extract_contributions(&lines, &params.marker)?;
    reconstruct(&records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_GROUPS: &str = "\
 PEST RUN RECORD: CASE demo

   Contribution to phi from observation group \"wells\"  =  10
   Contribution to phi from observation group \"rivers\" =  5

 OPTIMISATION ITERATION NO.        : 1
   Contribution to phi from observation group \"wells\"  =  3
   Contribution to phi from observation group \"rivers\" =  2

 OPTIMISATION ITERATION NO.        : 2
   Contribution to phi from observation group \"wells\"  =  1
   Contribution to phi from observation group \"rivers\" =  1
";

    #[test]
    fn reconstructs_two_group_example() {
        let table = reconstruct_report(TWO_GROUPS, &Params::default()).unwrap();
        assert_eq!(table.groups(), &["wells".to_string(), "rivers".to_string()]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].iteration, 1);
        assert_eq!(table.rows()[0].values, vec![3.0, 2.0]);
        assert_eq!(table.rows()[0].net_phi(), 5.0);
        assert_eq!(table.rows()[1].values, vec![1.0, 1.0]);
        assert_eq!(table.rows()[1].net_phi(), 2.0);
    }

    #[test]
    fn missing_report_is_input_not_found() {
        let err = load_report(Path::new("definitely/not/here.rec")).unwrap_err();
        assert!(matches!(err, PhiError::InputNotFound { .. }));
        assert!(err.to_string().contains("definitely/not/here.rec"));
    }

    #[test]
    fn params_derive_output_paths() {
        let params = Params::default();
        assert_eq!(params.report_path("case1"), PathBuf::from("case1.rec"));
        assert_eq!(
            params.chart_path("runs/case1"),
            PathBuf::from("runs/case1__Phi_Out_wide.png")
        );
        assert_eq!(
            params.table_path("case1"),
            PathBuf::from("case1__Data_Table.csv")
        );
    }

    #[test]
    fn custom_marker_is_honoured() {
        let text = "Share x \"a\" = 1\nShare x \"a\" = 4\n";
        let params = Params {
            marker: "Share".to_string(),
            ..Params::default()
        };
        let table = reconstruct_report(text, &params).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].values, vec![4.0]);
        assert!(matches!(
            reconstruct_report(text, &Params::default()),
            Err(PhiError::NoContributionData { .. })
        ));
    }
}

use crate::BlockFault;

/// Column holding the iteration number in exported tables.
pub const ITERATION_COLUMN: &str = "IterNo";
/// Column holding the per-iteration sum of all groups.
pub const NET_PHI_COLUMN: &str = "NetPhi";

#[derive(Clone, Debug, PartialEq)]
pub struct IterationRow {
    /// 1-based iteration number.
    pub iteration: usize,
    /// One value per group, in canonical group order.
    pub values: Vec<f64>,
}

impl IterationRow {
    pub fn net_phi(&self) -> f64 {
        net_phi(&self.values)
    }
}

/// Sum of the group contributions for one iteration.
pub fn net_phi(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Per-iteration, per-group Phi contributions.
///
/// Built once from validated records and never modified afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationTable {
    groups: Vec<String>,
    rows: Vec<IterationRow>,
}

impl IterationTable {
    /// Assemble a table from one value column per group. Every column must hold
    /// `iterations` values.
    pub fn from_columns(
        groups: Vec<String>,
        columns: Vec<Vec<f64>>,
        iterations: usize,
    ) -> Result<Self, BlockFault> {
        for (group, column) in groups.iter().zip(&columns) {
            if column.len() != iterations {
                return Err(BlockFault::GroupCountMismatch {
                    group: group.clone(),
                    expected: iterations,
                    found: column.len(),
                });
            }
        }

        let rows = (0..iterations)
            .map(|idx| IterationRow {
                iteration: idx + 1,
                values: columns.iter().map(|column| column[idx]).collect(),
            })
            .collect();
        Ok(Self { groups, rows })
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn rows(&self) -> &[IterationRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The NetPhi column, one entry per iteration.
    pub fn net_phi_column(&self) -> Vec<f64> {
        self.rows.iter().map(IterationRow::net_phi).collect()
    }
}

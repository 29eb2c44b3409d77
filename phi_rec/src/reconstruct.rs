//! Reshape the flat record stream into an [`IterationTable`].
//!
//! Records arrive as blocks of one line per group. The first block is the baseline
//! (the phi before iteration 1), fixes the canonical group order and is dropped.
//! Every later block must repeat that order exactly.

use std::collections::HashSet;

use crate::extract::ContributionRecord;
use crate::table::IterationTable;
use crate::{BlockFault, PhiError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    ExpectingBaselineBlock,
    /// `position` indexes the canonical group expected next within the block.
    ExpectingIterationBlock { iteration: usize, position: usize },
}

struct BlockReader {
    group_count: usize,
    state: State,
    groups: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl BlockReader {
    fn new(group_count: usize) -> Self {
        Self {
            group_count,
            state: State::ExpectingBaselineBlock,
            groups: Vec::with_capacity(group_count),
            columns: Vec::new(),
        }
    }

    fn feed(&mut self, record: &ContributionRecord) -> Result<(), BlockFault> {
        match self.state {
            State::ExpectingBaselineBlock => {
                if self.groups.contains(&record.group) {
                    return Err(BlockFault::DuplicateBaselineGroup {
                        group: record.group.clone(),
                        line_no: record.line_no,
                    });
                }
                self.groups.push(record.group.clone());
                if self.groups.len() == self.group_count {
                    self.columns = vec![Vec::new(); self.group_count];
                    self.state = State::ExpectingIterationBlock {
                        iteration: 1,
                        position: 0,
                    };
                }
            }
            State::ExpectingIterationBlock {
                iteration,
                position,
            } => {
                let expected = &self.groups[position];
                if *expected != record.group {
                    return Err(BlockFault::GroupOrderMismatch {
                        iteration,
                        expected: expected.clone(),
                        found: record.group.clone(),
                        line_no: record.line_no,
                    });
                }
                self.columns[position].push(record.value);
                self.state = if position + 1 == self.group_count {
                    State::ExpectingIterationBlock {
                        iteration: iteration + 1,
                        position: 0,
                    }
                } else {
                    State::ExpectingIterationBlock {
                        iteration,
                        position: position + 1,
                    }
                };
            }
        }
        Ok(())
    }

    fn finish(self, iterations: usize) -> Result<IterationTable, BlockFault> {
        match self.state {
            State::ExpectingIterationBlock { position: 0, .. } => {
                IterationTable::from_columns(self.groups, self.columns, iterations)
            }
            // A block was cut short.
            _ => Err(BlockFault::UnevenBlocks {
                remaining: self.columns.iter().map(Vec::len).sum(),
                groups: self.group_count,
            }),
        }
    }
}

/// Rebuild the iteration table from contribution records in file order.
pub fn reconstruct(records: &[ContributionRecord]) -> Result<IterationTable, PhiError> {
    let group_count = records
        .iter()
        .map(|r| r.group.as_str())
        .collect::<HashSet<_>>()
        .len();
    if group_count == 0 {
        return Err(BlockFault::NoIterations.into());
    }

    let remaining = records.len().saturating_sub(group_count);
    if remaining % group_count != 0 {
        return Err(BlockFault::UnevenBlocks {
            remaining,
            groups: group_count,
        }
        .into());
    }
    let iterations = remaining / group_count;

    let mut reader = BlockReader::new(group_count);
    for record in records {
        reader.feed(record)?;
    }
    if iterations == 0 {
        return Err(BlockFault::NoIterations.into());
    }
    let table = reader.finish(iterations)?;

    if let Some(row) = table.rows().iter().find(|row| !row.net_phi().is_finite()) {
        // Baseline occupies the first block, so iteration i ends at record G*(i+1)-1.
        let line_no = records[group_count * (row.iteration + 1) - 1].line_no;
        return Err(PhiError::NonFiniteNetPhi {
            iteration: row.iteration,
            line_no,
        });
    }
    Ok(table)
}

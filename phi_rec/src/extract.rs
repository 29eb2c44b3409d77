use crate::table::{ITERATION_COLUMN, NET_PHI_COLUMN};
use crate::tokenize::ReportLine;
use crate::PhiError;

/// A single "contribution to phi" line, in file order.
#[derive(Clone, Debug, PartialEq)]
pub struct ContributionRecord {
    pub group: String,
    pub value: f64,
    pub line_no: usize,
}

impl ContributionRecord {
    /// Parse a marker line read right to left: the value is the last token and the
    /// group is the third from last, with quotes removed.
    pub fn parse(line: &ReportLine<'_>) -> Result<Self, PhiError> {
        let tokens: Vec<&str> = line.text.split_whitespace().collect();
        let malformed = |token: &str, reason: &'static str| PhiError::MalformedRecord {
            line_no: line.line_no,
            token: token.to_string(),
            reason,
            line: line.text.trim().to_string(),
        };

        if tokens.len() < 3 {
            let last = tokens.last().copied().unwrap_or_default();
            return Err(malformed(last, "too few tokens for group and value"));
        }

        let value_token = tokens[tokens.len() - 1];
        let value: f64 = value_token
            .parse()
            .map_err(|_| malformed(value_token, "value is not a number"))?;
        if !value.is_finite() {
            return Err(malformed(value_token, "value is not finite"));
        }

        let group_token = tokens[tokens.len() - 3];
        let group = group_token.replace('"', "");
        if group.is_empty() {
            return Err(malformed(group_token, "empty group identifier"));
        }
        if group == ITERATION_COLUMN || group == NET_PHI_COLUMN {
            return Err(malformed(group_token, "group name clashes with a table column"));
        }

        Ok(Self {
            group,
            value,
            line_no: line.line_no,
        })
    }
}

/// Select every line led by `marker` and parse it into a record.
pub fn extract_contributions(
    lines: &[ReportLine<'_>],
    marker: &str,
) -> Result<Vec<ContributionRecord>, PhiError> {
    let records = lines
        .iter()
        .filter(|line| line.starts_with_token(marker))
        .map(ContributionRecord::parse)
        .collect::<Result<Vec<_>, _>>()?;

    if records.is_empty() {
        return Err(PhiError::NoContributionData {
            marker: marker.to_string(),
        });
    }
    Ok(records)
}

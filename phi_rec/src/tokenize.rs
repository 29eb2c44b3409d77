/// One physical line of a report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportLine<'a> {
    /// 1-based line number within the report.
    pub line_no: usize,
    pub text: &'a str,
    /// First whitespace-delimited word, `None` for blank lines.
    pub leading: Option<&'a str>,
}

impl<'a> ReportLine<'a> {
    pub fn new(line_no: usize, text: &'a str) -> Self {
        let text = text.strip_suffix('\r').unwrap_or(text);
        Self {
            line_no,
            text,
            leading: text.split_whitespace().next(),
        }
    }

    pub fn starts_with_token(&self, token: &str) -> bool {
        self.leading == Some(token)
    }
}

/// Split raw report text into classified lines. Never fails.
pub fn tokenize_lines(text: &str) -> Vec<ReportLine<'_>> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| ReportLine::new(idx + 1, line))
        .collect()
}

//! Per-test verdict buffer and its HTML table fragment

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

const HEADERS: [&str; 6] = [
    "Timestamp",
    "Question",
    "Expected",
    "Actual",
    "Similarity",
    "Status",
];

const PASS_BACKGROUND: &str = "#d4edda";
const FAIL_BACKGROUND: &str = "#f8d7da";

/// Outcome of comparing one actual answer against its expectation.
///
/// `question`, `expected` and `actual` are stored HTML-escaped, and they stay
/// escaped when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub timestamp: DateTime<Local>,
    pub question: String,
    pub expected: String,
    pub actual: String,
    pub similarity: Option<f64>,
    pub passed: bool,
}

impl Verdict {
    pub fn status(&self) -> &'static str {
        if self.passed {
            "PASS"
        } else {
            "FAIL"
        }
    }

    /// Two decimals, or empty for checks that produce no score
    pub fn similarity_text(&self) -> String {
        self.similarity
            .map(|s| format!("{:.2}", s))
            .unwrap_or_default()
    }

    fn cells(&self) -> [String; 6] {
        [
            self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.question.clone(),
            self.expected.clone(),
            self.actual.clone(),
            self.similarity_text(),
            self.status().to_string(),
        ]
    }
}

/// Escape `& < > " '` for embedding in HTML
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Verdict rows for one test case
#[derive(Debug, Clone, Default)]
pub struct VerdictRecorder {
    rows: Vec<Verdict>,
}

impl VerdictRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a verdict, escaping the free-text fields
    pub fn record(
        &mut self,
        question: &str,
        expected: &str,
        actual: &str,
        similarity: Option<f64>,
        passed: bool,
    ) -> &Verdict {
        self.rows.push(Verdict {
            timestamp: Local::now(),
            question: escape_html(question),
            expected: escape_html(expected),
            actual: escape_html(actual),
            similarity,
            passed,
        });
        &self.rows[self.rows.len() - 1]
    }

    pub fn verdicts(&self) -> &[Verdict] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render the rows as an HTML table fragment.
    ///
    /// Header row then one row per verdict in insertion order; passed rows get
    /// a green background, failed rows red. Newlines inside cells become
    /// `<br>`. Empty string when nothing was recorded.
    pub fn render_table(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        let mut html = String::from(
            "<table border='1' cellspacing='0' cellpadding='5' \
             style='width:100%; border-collapse:collapse; font-size:12px;'>",
        );

        html.push_str("<tr style='background-color:#f2f2f2;'>");
        for header in HEADERS {
            html.push_str("<th>");
            html.push_str(header);
            html.push_str("</th>");
        }
        html.push_str("</tr>");

        for row in &self.rows {
            let background = if row.passed {
                PASS_BACKGROUND
            } else {
                FAIL_BACKGROUND
            };
            html.push_str(&format!("<tr style='background-color:{};'>", background));
            for cell in row.cells() {
                html.push_str(
                    "<td style='border:1px solid #ccc; padding:5px; vertical-align:top;'>",
                );
                html.push_str(&cell.replace('\n', "<br>"));
                html.push_str("</td>");
            }
            html.push_str("</tr>");
        }

        html.push_str("</table>");
        html
    }

    /// Clear the buffer for the next test
    pub fn reset(&mut self) {
        self.rows.clear();
    }

    /// Hand over the rows, leaving the buffer empty
    pub fn take(&mut self) -> Vec<Verdict> {
        std::mem::take(&mut self.rows)
    }
}

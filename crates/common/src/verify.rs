//! Turning an answer into a recorded verdict

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::context::ExecutionContext;
use crate::question_bank::{ExpectedField, Expectation};
use crate::similarity::{lexical_match, lexical_score, ScoringMode, SemanticScorer};

/// Result of one check, mirrored by the verdict it recorded
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub similarity: Option<f64>,
    /// Why the check could not be scored, if it could not
    pub error: Option<String>,
}

impl CheckOutcome {
    fn scored(passed: bool, similarity: f64) -> Self {
        Self {
            passed,
            similarity: Some(similarity),
            error: None,
        }
    }

    fn unscored(reason: String) -> Self {
        Self {
            passed: false,
            similarity: None,
            error: Some(reason),
        }
    }
}

/// Scores answers against question bank expectations and records the verdict
#[derive(Clone)]
pub struct ResponseVerifier {
    semantic: SemanticScorer,
}

impl ResponseVerifier {
    pub fn new(semantic: SemanticScorer) -> Self {
        Self { semantic }
    }

    /// Score `actual` against the expectation and record exactly one verdict.
    ///
    /// A missing answer or a scoring failure records a failed verdict with no
    /// similarity; neither is raised.
    pub fn verify(
        &self,
        ctx: &mut ExecutionContext,
        expectation: &Expectation,
        field: ExpectedField,
        actual: Option<&str>,
        mode: ScoringMode,
    ) -> CheckOutcome {
        let question = expectation.input.as_str();
        let expected = expectation.expected_text(field);

        let Some(actual) = actual else {
            ctx.record(question, expected, "", None, false);
            return CheckOutcome::unscored("no answer received".to_string());
        };

        let outcome = match mode {
            ScoringMode::Lexical => {
                let score = lexical_score(expected, actual);
                CheckOutcome::scored(
                    lexical_match(expected, actual, expectation.threshold),
                    score,
                )
            }
            ScoringMode::Semantic => match self.semantic.score(expected, actual) {
                Ok(score) => CheckOutcome::scored(score >= expectation.threshold, score),
                Err(e) => {
                    error!(id = %expectation.id, error = %e, "semantic scoring failed");
                    let reason = e.to_string();
                    ctx.record_failure(question, expected, &reason);
                    return CheckOutcome::unscored(reason);
                }
            },
        };

        info!(
            id = %expectation.id,
            ?mode,
            similarity = outcome.similarity,
            threshold = expectation.threshold,
            passed = outcome.passed,
            "answer scored"
        );
        ctx.record(question, expected, actual, outcome.similarity, outcome.passed);
        outcome
    }
}

/// Structural expectations on a rendered answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormattingRules {
    /// Markers that must all appear
    pub required: Vec<String>,

    /// Answer must be strictly longer than this many characters
    pub min_length: usize,

    /// Markers of broken markup that must not appear
    pub forbidden: Vec<String>,

    /// Reject answers cut off with a trailing ellipsis
    pub forbid_trailing_ellipsis: bool,
}

impl Default for FormattingRules {
    fn default() -> Self {
        Self {
            required: vec!["Step-by-Step".to_string(), "##".to_string()],
            min_length: 50,
            forbidden: vec!["</p><p>".to_string(), "<br><br><br>".to_string()],
            forbid_trailing_ellipsis: true,
        }
    }
}

impl FormattingRules {
    /// First rule `answer` breaks, if any
    pub fn violation(&self, answer: &str) -> Option<String> {
        if let Some(marker) = self.required.iter().find(|m| !answer.contains(m.as_str())) {
            return Some(format!("missing {:?}", marker));
        }
        let length = answer.chars().count();
        if length <= self.min_length {
            return Some(format!("{} characters, need more than {}", length, self.min_length));
        }
        if let Some(marker) = self.forbidden.iter().find(|m| answer.contains(m.as_str())) {
            return Some(format!("contains {:?}", marker));
        }
        if self.forbid_trailing_ellipsis && answer.ends_with("...") {
            return Some("ends with a trailing ellipsis".to_string());
        }
        None
    }

    /// Human-readable summary for the Expected column
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.required.is_empty() {
            parts.push(format!("contains {}", self.required.join(", ")));
        }
        parts.push(format!("longer than {} characters", self.min_length));
        if !self.forbidden.is_empty() {
            parts.push(format!("no {}", self.forbidden.join(", ")));
        }
        if self.forbid_trailing_ellipsis {
            parts.push("not truncated".to_string());
        }
        parts.join("; ")
    }

    /// Check `answer` and record a non-numeric verdict
    pub fn verify(
        &self,
        ctx: &mut ExecutionContext,
        question: &str,
        answer: Option<&str>,
    ) -> CheckOutcome {
        let expected = self.describe();
        let Some(answer) = answer else {
            ctx.record(question, &expected, "", None, false);
            return CheckOutcome::unscored("no answer received".to_string());
        };

        let violation = self.violation(answer);
        if let Some(reason) = &violation {
            info!(%reason, "answer formatting rejected");
        }
        ctx.record(question, &expected, answer, None, violation.is_none());
        CheckOutcome {
            passed: violation.is_none(),
            similarity: None,
            error: violation,
        }
    }
}

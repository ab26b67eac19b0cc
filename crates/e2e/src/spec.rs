//! Declarative YAML scenario specification

use serde::{Deserialize, Serialize};
use std::path::Path;

use chatoracle_common::{Category, ExpectedField, FormattingRules, ScoringMode};

use crate::error::{E2eError, E2eResult};

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Whether answers come from the rendered UI or the chat API
    #[serde(default)]
    pub mode: RunMode,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

/// Where a scenario gets its answers from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Drive a chat session through a [`ChatSurface`](chatoracle_common::ChatSurface)
    #[default]
    Ui,
    /// Query a [`ChatClient`](chatoracle_common::ChatClient) directly
    Api,
}

impl RunMode {
    /// Question bank collection used when a step names none
    pub fn default_category(&self) -> Category {
        match self {
            RunMode::Ui => Category::Ui,
            RunMode::Api => Category::Api,
        }
    }
}

/// A single step in a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Ask a question bank entry and score the answer
    Ask {
        /// Question bank id
        question: String,
        #[serde(default)]
        category: Option<Category>,
        #[serde(default)]
        scoring: ScoringMode,
        #[serde(default)]
        compare_with: ExpectedField,
        /// Also check the answer renders in the entry language's direction
        #[serde(default)]
        expect_direction: bool,
    },

    /// Check the input box emptied after the last question
    AssertInputCleared,

    /// Check the latest response container scrolls
    AssertScrollable,

    /// Ask a question bank entry and check the answer's structure
    AssertFormatting {
        question: String,
        #[serde(default)]
        category: Option<Category>,
        #[serde(default)]
        rules: FormattingRules,
    },

    /// Log a message (for debugging)
    Log { message: String },
}

impl TestStep {
    /// Short label used in step results
    pub fn label(&self) -> String {
        match self {
            TestStep::Ask { question, .. } => format!("ask {}", question),
            TestStep::AssertInputCleared => "assert_input_cleared".to_string(),
            TestStep::AssertScrollable => "assert_scrollable".to_string(),
            TestStep::AssertFormatting { question, .. } => format!("assert_formatting {}", question),
            TestStep::Log { .. } => "log".to_string(),
        }
    }
}

impl TestSpec {
    /// Parse a test spec from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a test spec from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all test specs from a directory, ordered by file name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let spec = Self::from_file(entry.path())?;
            specs.push(spec);
        }

        Ok(specs)
    }

    /// Filter specs by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("- action: assert_input_cleared", "assert_input_cleared" ; "input cleared")]
    #[test_case("- action: assert_scrollable", "assert_scrollable" ; "scrollable")]
    #[test_case("- action: ask\n    question: UI_EN_01", "ask UI_EN_01" ; "ask")]
    #[test_case("- action: assert_formatting\n    question: UI_EN_03", "assert_formatting UI_EN_03" ; "formatting")]
    #[test_case("- action: log\n    message: hi", "log" ; "log")]
    fn test_step_labels(step: &str, label: &str) {
        let yaml = format!("name: labels\nsteps:\n  {}\n", step);
        let spec = TestSpec::from_yaml(&yaml).unwrap();
        assert_eq!(spec.steps[0].label(), label);
    }

    #[test_case(RunMode::Ui, Category::Ui ; "ui")]
    #[test_case(RunMode::Api, Category::Api ; "api")]
    fn test_default_category(mode: RunMode, category: Category) {
        assert_eq!(mode.default_category(), category);
    }

    #[test]
    fn test_parse_ui_spec() {
        let yaml = r#"
name: multilingual-answers
description: English and Arabic answers render correctly
tags:
  - ui
  - smoke
steps:
  - action: ask
    question: UI_EN_02
    expect_direction: true
  - action: ask
    question: UI_AR_01
    scoring: lexical
    expect_direction: true
  - action: assert_input_cleared
  - action: assert_scrollable
"#;
        let spec = TestSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.name, "multilingual-answers");
        assert_eq!(spec.mode, RunMode::Ui);
        assert_eq!(spec.steps.len(), 4);
        match &spec.steps[1] {
            TestStep::Ask {
                question,
                scoring,
                compare_with,
                expect_direction,
                category,
            } => {
                assert_eq!(question, "UI_AR_01");
                assert_eq!(*scoring, ScoringMode::Lexical);
                assert_eq!(*compare_with, ExpectedField::Expected);
                assert!(*expect_direction);
                assert!(category.is_none());
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert!(matches!(spec.steps[2], TestStep::AssertInputCleared));
    }

    #[test]
    fn test_parse_security_spec() {
        let yaml = r#"
name: prompt-injection
mode: api
tags: [security]
steps:
  - action: ask
    question: SEC_01
    category: security
    compare_with: fallback
    scoring: lexical
"#;
        let spec = TestSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.mode, RunMode::Api);
        match &spec.steps[0] {
            TestStep::Ask {
                category,
                compare_with,
                ..
            } => {
                assert_eq!(*category, Some(Category::Security));
                assert_eq!(*compare_with, ExpectedField::Fallback);
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_parse_formatting_rules() {
        let yaml = r#"
name: formatting
steps:
  - action: assert_formatting
    question: UI_EN_03
    rules:
      required: ["Step-by-Step"]
      min_length: 20
"#;
        let spec = TestSpec::from_yaml(yaml).unwrap();
        match &spec.steps[0] {
            TestStep::AssertFormatting { rules, .. } => {
                assert_eq!(rules.required, vec!["Step-by-Step".to_string()]);
                assert_eq!(rules.min_length, 20);
                // unspecified fields keep their defaults
                assert!(rules.forbid_trailing_ellipsis);
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        let yaml = r#"
name: bad
steps:
  - action: screenshot
    name: nope
"#;
        assert!(TestSpec::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_all_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b", "a"] {
            std::fs::write(
                dir.path().join(format!("{}.yaml", name)),
                format!("name: {}\nsteps: []\n", name),
            )
            .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let specs = TestSpec::load_all(dir.path()).unwrap();
        let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(TestSpec::filter_by_tag(&specs, "ui").len(), 0);
    }
}

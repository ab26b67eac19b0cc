//! Executes scenario steps against one chat session

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use chatoracle_common::{
    ask, wait_until_ready, Category, ChatClient, ChatSurface, CheckOutcome, ExecutionContext,
    Expectation, Ignorable, Poller, QuestionBank, ResponseVerifier, StabilityDetector,
    TextDirection,
};

use crate::spec::{RunMode, TestSpec, TestStep};

/// Result of executing one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub skipped: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Where answers come from for the scenario being executed
pub enum Session {
    Ui(Box<dyn ChatSurface>),
    Api(Arc<dyn ChatClient>),
}

/// Shared, read-only machinery for executing scenarios
pub struct ScenarioExecutor {
    bank: Arc<QuestionBank>,
    verifier: ResponseVerifier,
    detector: StabilityDetector,
    page_poller: Poller,
}

enum Outcome {
    Checked(CheckOutcome),
    Passed,
    Skipped(String),
    Failed(String),
}

impl ScenarioExecutor {
    pub fn new(
        bank: Arc<QuestionBank>,
        verifier: ResponseVerifier,
        detector: StabilityDetector,
        page_poller: Poller,
    ) -> Self {
        Self {
            bank,
            verifier,
            detector,
            page_poller,
        }
    }

    /// Wait for the chat widget and record whether it loaded
    pub fn open(&self, surface: &dyn ChatSurface, ctx: &mut ExecutionContext) -> bool {
        let ready = wait_until_ready(surface, &self.page_poller);
        let actual = if ready {
            "chat widget displayed"
        } else {
            "chat widget not displayed"
        };
        ctx.record("(page load)", "chat widget displayed", actual, None, ready);
        ready
    }

    /// Run every step of `spec`, recording verdicts into `ctx`.
    ///
    /// Steps never abort the scenario; a failed check is recorded and the next
    /// step runs.
    pub fn run(
        &self,
        spec: &TestSpec,
        session: &mut Session,
        ctx: &mut ExecutionContext,
    ) -> Vec<StepResult> {
        let mut state = ScenarioState::default();
        let mut results = Vec::with_capacity(spec.steps.len());

        for step in &spec.steps {
            let start = Instant::now();
            debug!(step = %step.label(), "executing step");

            let outcome = self.execute(spec.mode, step, session, ctx, &mut state);
            let duration_ms = start.elapsed().as_millis() as u64;
            let step_name = step.label();

            let result = match outcome {
                Outcome::Checked(check) => StepResult {
                    success: check.passed,
                    skipped: false,
                    step_name,
                    duration_ms,
                    error: if check.passed {
                        None
                    } else {
                        Some(check.error.unwrap_or_else(|| match check.similarity {
                            Some(score) => format!("similarity {:.2} below threshold", score),
                            None => "check failed".to_string(),
                        }))
                    },
                },
                Outcome::Passed => StepResult {
                    success: true,
                    skipped: false,
                    step_name,
                    duration_ms,
                    error: None,
                },
                Outcome::Skipped(reason) => {
                    warn!(step = %step_name, %reason, "step skipped");
                    StepResult {
                        success: true,
                        skipped: true,
                        step_name,
                        duration_ms,
                        error: Some(reason),
                    }
                }
                Outcome::Failed(reason) => StepResult {
                    success: false,
                    skipped: false,
                    step_name,
                    duration_ms,
                    error: Some(reason),
                },
            };
            results.push(result);
        }

        results
    }

    fn execute(
        &self,
        mode: RunMode,
        step: &TestStep,
        session: &mut Session,
        ctx: &mut ExecutionContext,
        state: &mut ScenarioState,
    ) -> Outcome {
        match step {
            TestStep::Ask {
                question,
                category,
                scoring,
                compare_with,
                expect_direction,
            } => {
                let category = category.unwrap_or_else(|| mode.default_category());
                let Some(expectation) = self.bank.find(category, question) else {
                    return Outcome::Skipped(missing_entry(question, category));
                };

                let answer = self.answer(session, expectation, state);
                let check = self.verifier.verify(
                    ctx,
                    expectation,
                    *compare_with,
                    answer.as_deref(),
                    *scoring,
                );

                if *expect_direction {
                    let direction = self.check_direction(session, expectation, ctx);
                    if let Outcome::Failed(reason) = direction {
                        return Outcome::Failed(reason);
                    }
                }
                Outcome::Checked(check)
            }

            TestStep::AssertFormatting {
                question,
                category,
                rules,
            } => {
                let category = category.unwrap_or_else(|| mode.default_category());
                let Some(expectation) = self.bank.find(category, question) else {
                    return Outcome::Skipped(missing_entry(question, category));
                };

                let answer = self.answer(session, expectation, state);
                Outcome::Checked(rules.verify(ctx, &expectation.input, answer.as_deref()))
            }

            TestStep::AssertInputCleared => {
                let Session::Ui(surface) = session else {
                    return Outcome::Skipped("input box exists only in UI mode".to_string());
                };
                let question = state.last_question.clone().unwrap_or_default();
                let cleared = self
                    .page_poller
                    .clone()
                    .ignoring(Ignorable::transient_lookup())
                    .poll(|| surface.input_cleared())
                    .map(|r| r.satisfied);
                match cleared {
                    Ok(cleared) => {
                        let actual = if cleared { "input cleared" } else { "input not cleared" };
                        ctx.record(&question, "input cleared", actual, None, cleared);
                        self.flag(cleared, "input box not cleared after send")
                    }
                    Err(e) => {
                        ctx.record_failure(&question, "input cleared", &e.to_string());
                        Outcome::Failed(e.to_string())
                    }
                }
            }

            TestStep::AssertScrollable => {
                let Session::Ui(surface) = session else {
                    return Outcome::Skipped("scrolling exists only in UI mode".to_string());
                };
                let question = state.last_question.clone().unwrap_or_default();
                match surface.response_overflows() {
                    Ok(scrolls) => {
                        let actual = if scrolls { "scrollbar displayed" } else { "no scrollbar" };
                        ctx.record(&question, "scrollbar displayed", actual, None, scrolls);
                        self.flag(scrolls, "response container does not scroll")
                    }
                    Err(e) => {
                        ctx.record_failure(&question, "scrollbar displayed", &e.to_string());
                        Outcome::Failed(e.to_string())
                    }
                }
            }

            TestStep::Log { message } => {
                info!(%message, "scenario log");
                Outcome::Passed
            }
        }
    }

    fn flag(&self, ok: bool, reason: &str) -> Outcome {
        if ok {
            Outcome::Passed
        } else {
            Outcome::Failed(reason.to_string())
        }
    }

    fn answer(
        &self,
        session: &mut Session,
        expectation: &Expectation,
        state: &mut ScenarioState,
    ) -> Option<String> {
        state.last_question = Some(expectation.input.clone());
        match session {
            Session::Ui(surface) => ask(&mut **surface, &expectation.input, &self.detector),
            Session::Api(client) => match client.complete(expectation) {
                Ok(answer) => Some(answer),
                Err(e) => {
                    warn!(id = %expectation.id, error = %e, "chat API returned no answer");
                    None
                }
            },
        }
    }

    fn check_direction(
        &self,
        session: &Session,
        expectation: &Expectation,
        ctx: &mut ExecutionContext,
    ) -> Outcome {
        let Session::Ui(surface) = session else {
            return Outcome::Skipped("text direction exists only in UI mode".to_string());
        };

        let expected = TextDirection::for_lang(&expectation.lang);
        let expected_text = format!("{} text", expected);
        match surface.answer_direction() {
            Ok(actual) => {
                let ok = actual == expected;
                let actual_text = format!("{} text", actual);
                ctx.record(&expectation.input, &expected_text, &actual_text, None, ok);
                self.flag(ok, &format!("answer rendered {} instead of {}", actual, expected))
            }
            Err(e) => {
                ctx.record_failure(&expectation.input, &expected_text, &e.to_string());
                Outcome::Failed(e.to_string())
            }
        }
    }
}

fn missing_entry(question: &str, category: Category) -> String {
    format!("{} not in {} question bank", question, category)
}

#[derive(Debug, Default)]
struct ScenarioState {
    last_question: Option<String>,
}

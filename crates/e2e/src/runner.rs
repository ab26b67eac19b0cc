//! Suite runner: one chat session and one execution context per scenario

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, info_span, warn};

use chatoracle_common::config::PollingConfig;
use chatoracle_common::{
    escape_html, ChatClient, ChatSurface, CollectingSink, Embedder, ExecutionContext,
    OracleConfig, Poller, QuestionBank, ResponseVerifier, SemanticScorer, StabilityDetector,
    TestKey, Verdict,
};

use crate::error::{E2eError, E2eResult};
use crate::executor::{ScenarioExecutor, Session, StepResult};
use crate::spec::{RunMode, TestSpec};

/// Opens a fresh chat session for each UI scenario
pub trait SurfaceFactory: Send + Sync {
    fn open(&self, key: &TestKey) -> E2eResult<Box<dyn ChatSurface>>;
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub key: String,
    pub success: bool,
    pub skipped: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    /// Recorded rows; question, expected and actual are HTML-escaped
    pub verdicts: Vec<Verdict>,
    pub report_table: String,
    pub error: Option<String>,
}

impl TestResult {
    fn not_run(name: &str, key: &TestKey, skipped: bool, reason: String, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            key: key.to_string(),
            success: false,
            skipped,
            duration_ms: start.elapsed().as_millis() as u64,
            steps: vec![],
            verdicts: vec![],
            report_table: String::new(),
            error: Some(reason),
        }
    }
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn from_results(results: Vec<TestResult>, duration_ms: u64) -> Self {
        let skipped = results.iter().filter(|r| r.skipped).count();
        let passed = results.iter().filter(|r| !r.skipped && r.success).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed - skipped,
            skipped,
            duration_ms,
            results,
        }
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub polling: PollingConfig,
    pub specs_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_parallel: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from(&OracleConfig::default())
    }
}

impl From<&OracleConfig> for RunnerConfig {
    fn from(config: &OracleConfig) -> Self {
        Self {
            polling: config.polling.clone(),
            specs_dir: config.run.specs_dir.clone(),
            output_dir: config.run.output_dir.clone(),
            max_parallel: config.run.max_parallel,
        }
    }
}

/// Everything a worker thread needs to run one scenario
#[derive(Clone)]
struct Worker {
    executor: Arc<ScenarioExecutor>,
    surfaces: Option<Arc<dyn SurfaceFactory>>,
    client: Option<Arc<dyn ChatClient>>,
    sink: Arc<CollectingSink>,
}

impl Worker {
    fn open_session(&self, mode: RunMode, key: &TestKey) -> E2eResult<Session> {
        match mode {
            RunMode::Ui => {
                let factory = self.surfaces.as_ref().ok_or_else(|| {
                    E2eError::SurfaceUnavailable("no UI driver configured".to_string())
                })?;
                factory.open(key).map(Session::Ui)
            }
            RunMode::Api => self.client.clone().map(Session::Api).ok_or_else(|| {
                E2eError::SurfaceUnavailable("no chat API client configured".to_string())
            }),
        }
    }

    /// Blocking: runs on a dedicated worker thread
    fn run(&self, spec: &TestSpec) -> TestResult {
        let start = Instant::now();
        let key = TestKey::unique(&spec.name);
        let span = info_span!("test", key = %key);
        let _entered = span.enter();
        debug!(name = %spec.name, steps = spec.steps.len(), "starting scenario");

        let mut session = match self.open_session(spec.mode, &key) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "scenario not run");
                let skipped = matches!(e, E2eError::SurfaceUnavailable(_));
                return TestResult::not_run(&spec.name, &key, skipped, e.to_string(), start);
            }
        };

        let mut ctx = ExecutionContext::new(key.clone(), self.sink.clone());
        let _binding = ctx.enter();

        let ready = match &session {
            Session::Ui(surface) => self.executor.open(&**surface, &mut ctx),
            Session::Api(_) => true,
        };
        let steps = if ready {
            self.executor.run(spec, &mut session, &mut ctx)
        } else {
            vec![]
        };
        drop(session);

        let report = ctx.finish();
        let report_table = self.sink.take_for(&key).unwrap_or_default();

        let skipped = ready && !steps.is_empty() && steps.iter().all(|s| s.skipped);
        let error = if !ready {
            Some("chat widget not ready".to_string())
        } else if skipped {
            steps.first().and_then(|s| s.error.clone())
        } else {
            steps
                .iter()
                .find(|s| !s.success)
                .and_then(|s| s.error.clone())
                .or_else(|| {
                    report
                        .verdicts
                        .iter()
                        .any(|v| !v.passed)
                        .then(|| "a recorded check failed".to_string())
                })
        };

        TestResult {
            name: spec.name.clone(),
            key: key.to_string(),
            success: !skipped && error.is_none(),
            skipped,
            duration_ms: start.elapsed().as_millis() as u64,
            steps,
            verdicts: report.verdicts,
            report_table,
            error,
        }
    }
}

/// Main scenario runner
pub struct TestRunner {
    worker: Worker,

    /// Test specs directory
    specs_dir: PathBuf,

    /// Output directory for results
    output_dir: PathBuf,

    /// Maximum number of scenarios in flight
    max_parallel: usize,
}

impl TestRunner {
    /// Create a runner scoring with `embedder` against `bank`.
    ///
    /// No session source is attached yet; scenarios whose mode has none are
    /// reported as skipped.
    pub fn new(config: RunnerConfig, bank: QuestionBank, embedder: Arc<dyn Embedder>) -> Self {
        let executor = ScenarioExecutor::new(
            Arc::new(bank),
            ResponseVerifier::new(SemanticScorer::new(embedder)),
            StabilityDetector::from_config(&config.polling),
            Poller::new(config.polling.page_load_timeout(), config.polling.interval()),
        );

        Self {
            worker: Worker {
                executor: Arc::new(executor),
                surfaces: None,
                client: None,
                sink: Arc::new(CollectingSink::new()),
            },
            specs_dir: config.specs_dir,
            output_dir: config.output_dir,
            max_parallel: config.max_parallel.max(1),
        }
    }

    /// Attach the driver binding that opens UI sessions
    pub fn with_surfaces(mut self, factory: Arc<dyn SurfaceFactory>) -> Self {
        self.worker.surfaces = Some(factory);
        self
    }

    /// Attach the client used by API scenarios
    pub fn with_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.worker.client = Some(client);
        self
    }

    /// Run all tests in the specs directory
    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.specs_dir)?;
        self.run_specs(&specs).await
    }

    /// Run tests matching a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.specs_dir)?;
        let filtered: Vec<TestSpec> = TestSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_specs(&filtered).await
    }

    /// Run a specific test by name
    pub async fn run_test(&self, name: &str) -> E2eResult<TestResult> {
        let specs = TestSpec::load_all(&self.specs_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::TestNotFound(name.to_string()))?;

        let worker = self.worker.clone();
        tokio::task::spawn_blocking(move || worker.run(&spec))
            .await
            .map_err(|e| E2eError::Worker(e.to_string()))
    }

    /// Run a list of test specs, at most `max_parallel` at a time
    pub async fn run_specs(&self, specs: &[TestSpec]) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));

        info!(
            "Running {} test(s), up to {} in parallel...",
            specs.len(),
            self.max_parallel
        );

        let mut handles = Vec::with_capacity(specs.len());
        for spec in specs {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| E2eError::Worker(e.to_string()))?;
            let worker = self.worker.clone();
            let spec = spec.clone();
            let name = spec.name.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                worker.run(&spec)
            });
            handles.push((name, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let key = TestKey::new(name.as_str());
                    let reason = format!("worker panicked: {}", e);
                    TestResult::not_run(&name, &key, false, reason, start)
                }
            };

            let reason = result.error.as_deref().unwrap_or("unknown error");
            if result.skipped {
                warn!("○ {} skipped - {}", result.name, reason);
            } else if result.success {
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                error!("✗ {} - {}", result.name, reason);
            }
            results.push(result);
        }

        let suite = TestSuiteResult::from_results(results, start.elapsed().as_millis() as u64);

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            suite.passed, suite.failed, suite.skipped, suite.duration_ms
        );

        Ok(suite)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write test results to JSON file.
    ///
    /// Verdict text is written as recorded, i.e. HTML-escaped.
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }

    /// Write every test's verdict table into one HTML page
    pub fn write_report(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let mut html = String::from(
            "<!DOCTYPE html><html><head><meta charset='utf-8'>\
             <title>Chat verdicts</title></head><body>",
        );
        html.push_str(&format!(
            "<p>{} passed, {} failed, {} skipped</p>",
            results.passed, results.failed, results.skipped
        ));
        for result in results.results.iter().filter(|r| !r.report_table.is_empty()) {
            html.push_str(&format!("<h3>{}</h3>", escape_html(&result.name)));
            html.push_str(&result.report_table);
        }
        html.push_str("</body></html>");

        let path = self.output_dir.join("chat-report.html");
        std::fs::write(&path, html)?;

        info!("Report written to: {}", path.display());
        Ok(path)
    }
}

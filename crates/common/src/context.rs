//! Per-test execution context
//!
//! Every test unit owns exactly one [`ExecutionContext`] and passes it by
//! `&mut` to whatever records verdicts. The context is `Send` but not `Sync`:
//! it moves onto a worker thread and stays there.
//!
//! A thread-scoped binding of the current [`TestKey`] is kept alongside for
//! log attribution only; nothing reads verdict state through it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::recorder::{Verdict, VerdictRecorder};

/// Identity of one test unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestKey(String);

impl TestKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// `name` suffixed with a short random id, for repeated runs of one scenario
    pub fn unique(name: &str) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", name, &id[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

thread_local! {
    static CURRENT: RefCell<Option<TestKey>> = const { RefCell::new(None) };
}

/// Bind `key` to the calling thread, returning the previous binding
pub fn bind(key: TestKey) -> Option<TestKey> {
    CURRENT.with(|current| current.borrow_mut().replace(key))
}

/// The key bound to the calling thread, if any
pub fn current() -> Option<TestKey> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Remove the calling thread's binding
pub fn clear() {
    CURRENT.with(|current| current.borrow_mut().take());
}

/// Restores the previous thread binding when dropped
#[must_use = "the binding is undone as soon as the guard is dropped"]
pub struct BindingGuard {
    previous: Option<TestKey>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(key) => {
                bind(key);
            }
            None => clear(),
        }
    }
}

/// Receives each test's rendered verdict table at its boundary
pub trait ReportSink: Send + Sync {
    fn attach(&self, key: &TestKey, table: &str);
}

/// In-memory sink; the runner pulls tables out of it per test
#[derive(Debug, Default)]
pub struct CollectingSink {
    tables: Mutex<Vec<(TestKey, String)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every attached table, in attach order
    pub fn tables(&self) -> Vec<(TestKey, String)> {
        self.tables.lock().clone()
    }

    /// Remove and return the table attached for `key`
    pub fn take_for(&self, key: &TestKey) -> Option<String> {
        let mut tables = self.tables.lock();
        let index = tables.iter().position(|(k, _)| k == key)?;
        Some(tables.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.tables.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.lock().is_empty()
    }
}

impl ReportSink for CollectingSink {
    fn attach(&self, key: &TestKey, table: &str) {
        self.tables.lock().push((key.clone(), table.to_string()));
    }
}

/// Emits each table as a log event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn attach(&self, key: &TestKey, table: &str) {
        info!(test = %key, table, "verdict table");
    }
}

/// What a finished context hands back to the runner
#[derive(Debug, Clone)]
pub struct ContextReport {
    pub key: TestKey,
    pub verdicts: Vec<Verdict>,
    pub table: String,
}

/// Verdict buffer and identity of one running test unit
pub struct ExecutionContext {
    key: TestKey,
    recorder: VerdictRecorder,
    sink: Arc<dyn ReportSink>,
    _not_sync: PhantomData<Cell<()>>,
}

impl ExecutionContext {
    pub fn new(key: TestKey, sink: Arc<dyn ReportSink>) -> Self {
        debug!(test = %key, "execution context created");
        Self {
            key,
            recorder: VerdictRecorder::new(),
            sink,
            _not_sync: PhantomData,
        }
    }

    pub fn key(&self) -> &TestKey {
        &self.key
    }

    /// Bind this context's key to the calling thread until the guard drops
    pub fn enter(&self) -> BindingGuard {
        BindingGuard {
            previous: bind(self.key.clone()),
            _not_send: PhantomData,
        }
    }

    /// Record one verdict for this test
    pub fn record(
        &mut self,
        question: &str,
        expected: &str,
        actual: &str,
        similarity: Option<f64>,
        passed: bool,
    ) -> &Verdict {
        debug_assert!(
            current().map_or(true, |bound| bound == self.key),
            "recording into a context bound to another test"
        );

        let verdict = self
            .recorder
            .record(question, expected, actual, similarity, passed);
        info!(
            test = %self.key,
            status = verdict.status(),
            similarity = verdict.similarity,
            "verdict recorded"
        );
        verdict
    }

    /// Record a failed verdict for a check that could not be scored
    pub fn record_failure(&mut self, question: &str, expected: &str, reason: &str) -> &Verdict {
        warn!(test = %self.key, %reason, "check could not be scored");
        let actual = format!("scoring failed: {}", reason);
        self.record(question, expected, &actual, None, false)
    }

    pub fn verdicts(&self) -> &[Verdict] {
        self.recorder.verdicts()
    }

    /// Whether every recorded verdict passed; vacuously true when empty
    pub fn all_passed(&self) -> bool {
        self.recorder.verdicts().iter().all(|v| v.passed)
    }

    pub fn render_table(&self) -> String {
        self.recorder.render_table()
    }

    /// Close the test boundary. A non-empty table goes to the sink and the
    /// buffer is drained.
    pub fn finish(mut self) -> ContextReport {
        let table = self.recorder.render_table();
        if !table.is_empty() {
            self.sink.attach(&self.key, &table);
        }
        let verdicts = self.recorder.take();
        debug!(test = %self.key, verdicts = verdicts.len(), "execution context finished");

        ContextReport {
            key: self.key,
            verdicts,
            table,
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("key", &self.key)
            .field("verdicts", &self.recorder.len())
            .finish()
    }
}

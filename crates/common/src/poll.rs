//! Condition polling
//!
//! [`Poller`] re-evaluates a predicate at a fixed cadence until it holds or a
//! deadline passes. Predicate failures are classified by [`FailureKind`]; the
//! caller declares which kinds mean "not ready yet" and those are swallowed,
//! everything else aborts the poll immediately.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

/// Classification of a probe failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The element or resource is not addressable yet
    NotPresent,
    /// A previously located element was re-rendered underneath us
    Stale,
    /// The probe could not be evaluated (bad selector, script error)
    Script,
    /// The browser session or transport is gone
    Session,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::NotPresent => "not present",
            FailureKind::Stale => "stale",
            FailureKind::Script => "script",
            FailureKind::Session => "session",
        };
        f.write_str(s)
    }
}

/// A failure raised while evaluating a probe
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} probe failure: {message}")]
pub struct ProbeError {
    pub kind: FailureKind,
    pub message: String,
}

impl ProbeError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_present(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotPresent, message)
    }

    pub fn stale(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Stale, message)
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Session, message)
    }
}

/// Set of failure kinds a poll treats as "not ready yet"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ignorable(HashSet<FailureKind>);

impl Ignorable {
    /// Nothing is ignorable; every failure aborts the poll
    pub fn none() -> Self {
        Self::default()
    }

    /// Element lookups that may succeed on a later attempt
    pub fn transient_lookup() -> Self {
        [FailureKind::NotPresent, FailureKind::Stale].into_iter().collect()
    }

    pub fn with(mut self, kind: FailureKind) -> Self {
        self.0.insert(kind);
        self
    }

    pub fn contains(&self, kind: FailureKind) -> bool {
        self.0.contains(&kind)
    }
}

impl FromIterator<FailureKind> for Ignorable {
    fn from_iter<I: IntoIterator<Item = FailureKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of a single poll call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollResult {
    /// Whether the predicate held before the deadline
    pub satisfied: bool,

    /// Time spent polling
    pub elapsed: Duration,

    /// Number of predicate evaluations, saturating at `u32::MAX`
    pub attempts: u32,
}

/// Deadline, cadence and ignorable failure kinds for polling
#[derive(Debug, Clone)]
pub struct Poller {
    timeout: Duration,
    interval: Duration,
    ignoring: Ignorable,
}

impl Poller {
    /// Create a poller that ignores nothing
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            ignoring: Ignorable::none(),
        }
    }

    /// Declare which failure kinds are swallowed while polling
    pub fn ignoring(mut self, kinds: Ignorable) -> Self {
        self.ignoring = kinds;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block the calling thread until `predicate` returns `Ok(true)` or the
    /// timeout elapses.
    ///
    /// The predicate always runs at least once, and once more after the final
    /// sleep that reaches the deadline. Running out of time is reported through
    /// [`PollResult::satisfied`], never as an error; only non-ignorable probe
    /// failures are returned as `Err`.
    pub fn poll<F>(&self, mut predicate: F) -> Result<PollResult, ProbeError>
    where
        F: FnMut() -> Result<bool, ProbeError>,
    {
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts = attempts.saturating_add(1);

            match predicate() {
                Ok(true) => {
                    return Ok(PollResult {
                        satisfied: true,
                        elapsed: start.elapsed(),
                        attempts,
                    });
                }
                Ok(false) => trace!(attempts, "condition not met yet"),
                Err(e) if self.ignoring.contains(e.kind) => {
                    debug!(attempts, error = %e, "ignoring transient probe failure");
                }
                Err(e) => return Err(e),
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                debug!(attempts, ?elapsed, "poll timed out");
                return Ok(PollResult {
                    satisfied: false,
                    elapsed,
                    attempts,
                });
            }

            std::thread::sleep(self.interval.min(self.timeout - elapsed));
        }
    }
}

/// Poll `predicate` every `interval` until it holds or `timeout` elapses.
///
/// Convenience wrapper over [`Poller::poll`] returning only whether the
/// condition was satisfied.
pub fn poll<F>(
    predicate: F,
    timeout: Duration,
    interval: Duration,
    ignoring: &Ignorable,
) -> Result<bool, ProbeError>
where
    F: FnMut() -> Result<bool, ProbeError>,
{
    Poller::new(timeout, interval)
        .ignoring(ignoring.clone())
        .poll(predicate)
        .map(|r| r.satisfied)
}

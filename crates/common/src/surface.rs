//! Chat collaborators: the rendered chat UI and the chat API
//!
//! The oracle never drives a browser itself. A driver binding implements
//! [`ChatSurface`] over whatever automation it uses, reporting lookups that may
//! succeed later as [`FailureKind::NotPresent`](crate::poll::FailureKind) or
//! `Stale` so the pollers can absorb them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::poll::{Ignorable, Poller, ProbeError};
use crate::question_bank::Expectation;
use crate::stability::StabilityDetector;

/// CSS text direction of a rendered answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDirection {
    Ltr,
    Rtl,
}

impl TextDirection {
    /// Direction an answer in `lang` should render with
    pub fn for_lang(lang: &str) -> Self {
        let primary = lang
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "ar" | "fa" | "he" | "ur" => TextDirection::Rtl,
            _ => TextDirection::Ltr,
        }
    }
}

impl fmt::Display for TextDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextDirection::Ltr => f.write_str("ltr"),
            TextDirection::Rtl => f.write_str("rtl"),
        }
    }
}

/// One chat session in a rendered UI.
///
/// Probes are cheap, side-effect free and repeatable. They take `&self` so a
/// loading probe and a count probe can be polled from two closures at once.
pub trait ChatSurface: Send {
    /// Chat widget is displayed and usable
    fn is_ready(&self) -> Result<bool, ProbeError>;

    /// Type `input` into the chat box and send it
    fn submit(&mut self, input: &str) -> Result<(), ProbeError>;

    /// Transient "working" indicator is displayed. An indicator that is not
    /// in the page at all reports `Ok(false)`.
    fn loading_visible(&self) -> Result<bool, ProbeError>;

    /// Number of rendered answer blocks
    fn answer_count(&self) -> Result<usize, ProbeError>;

    /// Text of the most recent answer block, if any
    fn last_answer(&self) -> Result<Option<String>, ProbeError>;

    /// Input box is empty again after sending
    fn input_cleared(&self) -> Result<bool, ProbeError>;

    /// Latest response container has a vertical scrollbar
    fn response_overflows(&self) -> Result<bool, ProbeError>;

    /// Text direction of the latest answer
    fn answer_direction(&self) -> Result<TextDirection, ProbeError>;
}

/// Poll until the chat widget is usable.
///
/// Not-present and stale lookups count as "not yet". Returns `false` on
/// timeout or any other probe failure.
pub fn wait_until_ready<S: ChatSurface + ?Sized>(surface: &S, poller: &Poller) -> bool {
    let poller = poller.clone().ignoring(Ignorable::transient_lookup());
    match poller.poll(|| surface.is_ready()) {
        Ok(result) if result.satisfied => {
            debug!(elapsed = ?result.elapsed, "chat widget ready");
            true
        }
        Ok(result) => {
            warn!(elapsed = ?result.elapsed, "chat widget not ready before timeout");
            false
        }
        Err(e) => {
            warn!(error = %e, "chat widget readiness probe failed");
            false
        }
    }
}

/// Wait for a new answer to finish rendering and return its trimmed text.
///
/// `None` when no new answer appeared in time or a probe failed; the failure
/// is logged, never raised.
pub fn read_latest_answer<S: ChatSurface + ?Sized>(
    surface: &S,
    detector: &StabilityDetector,
) -> Option<String> {
    let grew = detector.wait_for_new_content(
        || Ok(!surface.loading_visible()?),
        || surface.answer_count(),
    );
    read_if_grew(surface, detector, grew)
}

fn read_if_grew<S: ChatSurface + ?Sized>(
    surface: &S,
    detector: &StabilityDetector,
    grew: Result<bool, ProbeError>,
) -> Option<String> {
    match grew {
        Ok(true) => {}
        Ok(false) => {
            info!(timeout = ?detector.growth_timeout(), "no new answer rendered");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "failed to fetch answer");
            return None;
        }
    }

    match surface.last_answer() {
        Ok(Some(text)) => {
            let text = text.trim().to_string();
            info!(answer = %text, "latest answer");
            Some(text)
        }
        Ok(None) => {
            warn!("answer count grew but no answer block could be read");
            None
        }
        Err(e) => {
            warn!(error = %e, "failed to read answer text");
            None
        }
    }
}

/// Submit `input` and read the answer it produces.
///
/// The answer count is snapshotted before sending, so an answer that renders
/// faster than the loading indicator can be observed is still picked up.
pub fn ask<S: ChatSurface + ?Sized>(
    surface: &mut S,
    input: &str,
    detector: &StabilityDetector,
) -> Option<String> {
    let baseline = match detector.snapshot(|| surface.answer_count()) {
        Ok(Some(count)) => count,
        Ok(None) => {
            warn!("answer list never became readable");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "failed to read answer count");
            return None;
        }
    };

    info!(%input, baseline, "sending question");
    if let Err(e) = surface.submit(input) {
        warn!(error = %e, "failed to send question");
        return None;
    }

    let surface = &*surface;
    let grew = detector.wait_for_new_content_since(
        baseline,
        || Ok(!surface.loading_visible()?),
        || surface.answer_count(),
    );
    read_if_grew(surface, detector, grew)
}

/// Chat API failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("No recorded answer for {0}")]
    NoSample(String),

    #[error("Chat request failed: {0}")]
    Request(String),
}

/// Chat backend queried directly, without a UI
pub trait ChatClient: Send + Sync {
    fn complete(&self, expectation: &Expectation) -> Result<String, ClientError>;
}

/// Answers with the precomputed `actual` sample stored in the question bank
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleReplayClient;

impl ChatClient for SampleReplayClient {
    fn complete(&self, expectation: &Expectation) -> Result<String, ClientError> {
        expectation
            .actual
            .clone()
            .ok_or_else(|| ClientError::NoSample(expectation.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::FailureKind;
    use std::cell::Cell;
    use std::time::Duration;
    use test_case::test_case;

    /// Renders a canned answer a few probes after each submit
    struct ScriptedSurface {
        answers: Vec<String>,
        rendered: Cell<usize>,
        pending_probes: Cell<usize>,
        lag: usize,
        fail_count_with: Option<FailureKind>,
    }

    impl ScriptedSurface {
        fn new(lag: usize) -> Self {
            Self {
                answers: Vec::new(),
                rendered: Cell::new(0),
                pending_probes: Cell::new(0),
                lag,
                fail_count_with: None,
            }
        }

        fn tick(&self) {
            let pending = self.pending_probes.get();
            if pending == 1 {
                self.rendered.set(self.answers.len());
            }
            self.pending_probes.set(pending.saturating_sub(1));
        }
    }

    impl ChatSurface for ScriptedSurface {
        fn is_ready(&self) -> Result<bool, ProbeError> {
            Ok(true)
        }

        fn submit(&mut self, input: &str) -> Result<(), ProbeError> {
            self.answers.push(format!("  echo: {}\n", input));
            self.pending_probes.set(self.lag + 1);
            Ok(())
        }

        fn loading_visible(&self) -> Result<bool, ProbeError> {
            Ok(false)
        }

        fn answer_count(&self) -> Result<usize, ProbeError> {
            if let Some(kind) = self.fail_count_with {
                return Err(ProbeError::new(kind, "answer list"));
            }
            self.tick();
            Ok(self.rendered.get())
        }

        fn last_answer(&self) -> Result<Option<String>, ProbeError> {
            Ok(self
                .rendered
                .get()
                .checked_sub(1)
                .map(|i| self.answers[i].clone()))
        }

        fn input_cleared(&self) -> Result<bool, ProbeError> {
            Ok(true)
        }

        fn response_overflows(&self) -> Result<bool, ProbeError> {
            Ok(false)
        }

        fn answer_direction(&self) -> Result<TextDirection, ProbeError> {
            Ok(TextDirection::Ltr)
        }
    }

    fn detector() -> StabilityDetector {
        StabilityDetector::new(Duration::from_millis(50), Duration::from_millis(200))
            .with_interval(Duration::from_millis(2))
    }

    #[test_case("ar", TextDirection::Rtl ; "arabic")]
    #[test_case("ar-AE", TextDirection::Rtl ; "arabic with region")]
    #[test_case("HE", TextDirection::Rtl ; "hebrew uppercase")]
    #[test_case("en", TextDirection::Ltr ; "english")]
    #[test_case("", TextDirection::Ltr ; "unknown")]
    fn test_direction_for_lang(lang: &str, expected: TextDirection) {
        assert_eq!(TextDirection::for_lang(lang), expected);
    }

    #[test]
    fn test_ask_returns_trimmed_answer() {
        let mut surface = ScriptedSurface::new(3);
        let answer = ask(&mut surface, "What is the capital of the UAE?", &detector());
        assert_eq!(answer.as_deref(), Some("echo: What is the capital of the UAE?"));
    }

    #[test]
    fn test_ask_sees_instant_answer() {
        let mut surface = ScriptedSurface::new(0);
        assert_eq!(ask(&mut surface, "hi", &detector()).as_deref(), Some("echo: hi"));
    }

    #[test]
    fn test_second_question_reads_second_answer() {
        let mut surface = ScriptedSurface::new(2);
        ask(&mut surface, "first", &detector());
        let answer = ask(&mut surface, "second", &detector());
        assert_eq!(answer.as_deref(), Some("echo: second"));
    }

    #[test]
    fn test_no_growth_yields_none() {
        let surface = ScriptedSurface::new(0);
        assert_eq!(read_latest_answer(&surface, &detector()), None);
    }

    #[test]
    fn test_fatal_probe_yields_none() {
        let mut surface = ScriptedSurface::new(1);
        surface.fail_count_with = Some(FailureKind::Session);
        assert_eq!(ask(&mut surface, "hello", &detector()), None);
    }

    #[test]
    fn test_wait_until_ready() {
        let surface = ScriptedSurface::new(0);
        let poller = Poller::new(Duration::from_millis(20), Duration::from_millis(2));
        assert!(wait_until_ready(&surface, &poller));
    }

    #[test]
    fn test_sample_replay_client() {
        let mut expectation = Expectation {
            id: "API_EN_01".to_string(),
            lang: "en".to_string(),
            input: "How do I renew my Emirates ID?".to_string(),
            expected: "Renew through the ICP portal".to_string(),
            expected_fallback: None,
            actual: None,
            threshold: 0.7,
        };
        assert_eq!(
            SampleReplayClient.complete(&expectation),
            Err(ClientError::NoSample("API_EN_01".to_string()))
        );

        expectation.actual = Some("Use the ICP portal.".to_string());
        assert_eq!(
            SampleReplayClient.complete(&expectation).as_deref(),
            Ok("Use the ICP portal.")
        );
    }
}

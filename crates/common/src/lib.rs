//! ChatOracle Common Library
//!
//! Response-verification core for chat assistant test suites: polling a
//! rendered UI until an answer settles, scoring answers against a question
//! bank, and recording per-test verdict tables.

pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod poll;
pub mod question_bank;
pub mod recorder;
pub mod similarity;
pub mod stability;
pub mod surface;
pub mod verify;

// Re-export commonly used types
pub use config::OracleConfig;
pub use context::{
    CollectingSink, ContextReport, ExecutionContext, ReportSink, TestKey, TracingSink,
};
pub use embedding::{EmbedError, Embedder, HashingEmbedder, HttpEmbedder};
pub use error::{Error, Result};
pub use poll::{poll, FailureKind, Ignorable, PollResult, Poller, ProbeError};
pub use question_bank::{Category, ExpectedField, Expectation, QuestionBank};
pub use recorder::{escape_html, Verdict, VerdictRecorder};
pub use similarity::{
    cosine_similarity, lexical_match, lexical_score, normalize, semantic_score, ScoreError,
    ScoringMode, SemanticScorer,
};
pub use stability::StabilityDetector;
pub use surface::{
    ask, read_latest_answer, wait_until_ready, ChatClient, ChatSurface, ClientError,
    SampleReplayClient, TextDirection,
};
pub use verify::{CheckOutcome, FormattingRules, ResponseVerifier};

/// ChatOracle version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

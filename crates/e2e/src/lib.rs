//! ChatOracle Scenario Runner
//!
//! Runs declarative YAML scenarios against a chat assistant and records a
//! verdict table per scenario:
//! - Parses scenario specs (ask, formatting, input and scroll checks)
//! - Opens one chat session and one execution context per scenario
//! - Runs scenarios concurrently on blocking workers, bounded by `max_parallel`
//! - Writes `test-results.json` and an HTML page of verdict tables
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Scenario Runner                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── run_specs(specs) -> TestSuiteResult                  │
//! │    │     └── spawn_blocking per spec                        │
//! │    │           ├── SurfaceFactory::open | ChatClient        │
//! │    │           ├── ExecutionContext (verdict buffer)        │
//! │    │           └── ScenarioExecutor::run -> [StepResult]    │
//! │    └── write_results / write_report                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestSpec (YAML)                                            │
//! │    ├── name, description, tags, mode (ui | api)             │
//! │    └── steps: [Step]                                        │
//! │          ├── ask { question, scoring?, compare_with? }      │
//! │          ├── assert_formatting { question, rules? }         │
//! │          ├── assert_input_cleared                           │
//! │          ├── assert_scrollable                              │
//! │          └── log { message }                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod executor;
pub mod runner;
pub mod spec;

pub use error::{E2eError, E2eResult};
pub use executor::{ScenarioExecutor, Session, StepResult};
pub use runner::{RunnerConfig, SurfaceFactory, TestResult, TestRunner, TestSuiteResult};
pub use spec::{RunMode, TestSpec, TestStep};

//! Validation Runner
//!
//! A job runs an ordered list of external steps (lint, test, build, ...) one
//! after another in a working directory. Output lines are streamed as events,
//! the first non-zero exit fails the job, and a stop request kills the active
//! process.
//!
//! ```text
//! Pending ─start─▶ Running ─all steps exit 0──▶ Passed
//!                     │ ───step exits non-zero─▶ Failed
//!                     └────────stop───────────▶ Cancelled
//! ```

/// Job, step and status types
pub mod job;
pub use job::{JobSnapshot, JobStatus, Step, ValidationJob};

/// Event types, sinks and the per-job event bus
pub mod events;
pub use events::{EventBus, EventSink, FnSink, OutputStream, ValidationEvent};

/// Live job lookup and stop
pub mod registry;
pub use registry::{JobRegistry, StopOutcome};

/// Step execution and job state machine
pub mod runner;
pub use runner::{RunnerOptions, ValidationRunner};

/// Step presets detected from project files
pub mod steps;
pub use steps::{detect_steps, parse_step_spec};

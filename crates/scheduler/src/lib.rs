//! `scheduler` crate — schedule timers, retrying execution, run history and
//! the `WorkflowService` that wires them to the task queue.

pub mod expression;
pub mod history;
pub mod runner;
pub mod scheduler;
pub mod service;
pub mod source;

pub use expression::{
    interval_period, next_runs, next_runs_after, normalize, validate_schedule, ScheduleError,
    DEFAULT_TIMEZONE,
};
pub use history::{ExecutionHistory, ExecutionRecord, LastRun, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_RECORDS};
pub use runner::RetryRunner;
pub use scheduler::{ScheduleStatus, Scheduler};
pub use service::{ServiceError, ServiceSettings, WorkflowService};
pub use source::{SourceError, StaticSource, WorkflowSource};

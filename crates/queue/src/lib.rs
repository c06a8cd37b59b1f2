//! `queue` crate — the single-slot task queue that serializes every
//! workflow run, plus the bounded history ring it reports from.

pub mod error;
pub mod queue;
pub mod ring;
pub mod runner;
pub mod task;

pub use error::QueueError;
pub use queue::{QueueStatus, TaskQueue, DEFAULT_MAX_RECENT_TASKS};
pub use ring::RingBuffer;
pub use runner::{ExecutorRunner, TaskRunner};
pub use task::{QueuedTask, TaskStatus};

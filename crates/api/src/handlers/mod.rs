pub mod executions;
pub mod system;
pub mod workflows;

use super::AppState;

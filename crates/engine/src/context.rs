//! Per-run variable namespaces and builtin variable generation.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::BuiltinVariables;

/// The three-namespace variable bag used for one run's template resolution.
///
/// Lookup precedence is builtin values, then user inputs, then step outputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    pub builtin_values: BTreeMap<String, String>,
    pub user_inputs: Map<String, Value>,
    /// Keyed by step id and by `outputVariable`, filled as steps complete.
    pub step_outputs: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(builtins: &BuiltinVariables, user_inputs: Map<String, Value>) -> Self {
        Self {
            builtin_values: generate_builtin_values(builtins, Local::now()),
            user_inputs,
            step_outputs: Map::new(),
        }
    }

    /// Record a completed step's output under its id and optional alias.
    pub fn store_output(&mut self, step_id: &str, output_variable: Option<&str>, output: Value) {
        if let Some(var) = output_variable {
            self.step_outputs.insert(var.to_owned(), output.clone());
        }
        self.step_outputs.insert(step_id.to_owned(), output);
    }
}

// ---------------------------------------------------------------------------
// Builtin variables
// ---------------------------------------------------------------------------

/// Description of a builtin variable, for editors and the API.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltinVariableInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub example: String,
}

pub fn format_date(now: &DateTime<Local>) -> String {
    now.format("%Y-%m-%d").to_string()
}

pub fn format_time(now: &DateTime<Local>) -> String {
    now.format("%H:%M:%S").to_string()
}

pub fn format_datetime(now: &DateTime<Local>) -> String {
    now.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Eight lowercase alphanumeric characters.
pub fn random_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_owned()
}

/// Values for the builtin variables a workflow switched on.
pub fn generate_builtin_values(
    toggles: &BuiltinVariables,
    now: DateTime<Local>,
) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    if toggles.current_date {
        values.insert("currentDate".into(), format_date(&now));
    }
    if toggles.current_time {
        values.insert("currentTime".into(), format_time(&now));
    }
    if toggles.current_datetime {
        values.insert("currentDatetime".into(), format_datetime(&now));
    }
    if toggles.random_id {
        values.insert("randomId".into(), random_id());
    }
    values
}

/// Every builtin variable with a live example value.
pub fn builtin_variable_catalog() -> Vec<BuiltinVariableInfo> {
    let now = Local::now();
    vec![
        BuiltinVariableInfo {
            name: "currentDate",
            description: "current local date (YYYY-MM-DD)",
            example: format_date(&now),
        },
        BuiltinVariableInfo {
            name: "currentTime",
            description: "current local time (HH:MM:SS)",
            example: format_time(&now),
        },
        BuiltinVariableInfo {
            name: "currentDatetime",
            description: "current local date and time",
            example: format_datetime(&now),
        },
        BuiltinVariableInfo {
            name: "randomId",
            description: "8-character random id",
            example: random_id(),
        },
    ]
}

//! Cron expression handling.
//!
//! Workflows use conventional cron syntax: five fields
//! (`min hour dom month dow`) or six with a leading seconds field, with
//! day-of-week `0-7` where both `0` and `7` are Sunday. The `cron` crate
//! wants a seconds field and numbers Sunday as `1`, so expressions are
//! normalized before parsing.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use thiserror::Error;

use engine::validate::MIN_INTERVAL_MS;
use engine::WorkflowDefinition;

/// Zone used when a schedule does not name one.
pub const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expr}': {message}")]
    InvalidCron { expr: String, message: String },

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("interval {0}ms is below the 1000ms minimum")]
    IntervalTooShort(u64),

    #[error("interval {0}ms is too long to schedule")]
    IntervalTooLong(u64),
}

/// Rewrite a conventional cron expression into the form the `cron` crate
/// parses. Expressions with an unexpected field count pass through untouched
/// and are left for the parser to reject.
pub fn normalize(expr: &str) -> String {
    let mut fields: Vec<String> = expr.split_whitespace().map(str::to_owned).collect();
    let dow_index = match fields.len() {
        5 => 4,
        6 | 7 => 5,
        _ => return expr.trim().to_owned(),
    };
    fields[dow_index] = translate_day_of_week(&fields[dow_index]);
    if fields.len() == 5 {
        fields.insert(0, "0".to_owned());
    }
    fields.join(" ")
}

fn translate_day_of_week(field: &str) -> String {
    let dow = |n: u8| n % 7 + 1;

    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let bounds = range
                .split_once('-')
                .and_then(|(from, to)| Some((from.parse::<u8>().ok()?, to.parse::<u8>().ok()?)));

            // A stepped range is expanded so Sunday keeps its place whichever
            // end of the week it falls on.
            if let (Some((from, to)), Some(step)) = (bounds, step.and_then(|s| s.parse::<usize>().ok())) {
                if step > 0 && from <= to {
                    let mut days: Vec<u8> = (from..=to).step_by(step).map(dow).collect();
                    days.sort_unstable();
                    days.dedup();
                    return days.iter().map(u8::to_string).collect::<Vec<_>>().join(",");
                }
            }

            let translated = match bounds {
                Some((0, 7)) => "1-7".to_owned(),
                Some((from, 7)) => format!("{}-7,1", dow(from)),
                Some((from, to)) => format!("{}-{}", dow(from), dow(to)),
                None => range
                    .parse::<u8>()
                    .map(|n| dow(n).to_string())
                    .unwrap_or_else(|_| range.to_owned()),
            };
            match step {
                Some(step) => format!("{translated}/{step}"),
                None => translated,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

pub fn parse_cron(expr: &str) -> Result<CronSchedule, ScheduleError> {
    CronSchedule::from_str(&normalize(expr)).map_err(|e| ScheduleError::InvalidCron {
        expr: expr.to_owned(),
        message: e.to_string(),
    })
}

/// Resolve an IANA zone name, falling back to [`DEFAULT_TIMEZONE`].
pub fn parse_timezone(name: Option<&str>) -> Result<Tz, ScheduleError> {
    let name = name.filter(|n| !n.trim().is_empty()).unwrap_or(DEFAULT_TIMEZONE);
    name.parse::<Tz>()
        .map_err(|_| ScheduleError::UnknownTimezone(name.to_owned()))
}

/// The next `count` firing times of `expr` in `timezone`, after `from`.
pub fn next_runs_after(
    expr: &str,
    timezone: Option<&str>,
    from: DateTime<Utc>,
    count: usize,
) -> Result<Vec<DateTime<Tz>>, ScheduleError> {
    let schedule = parse_cron(expr)?;
    let tz = parse_timezone(timezone)?;
    Ok(schedule.after(&from.with_timezone(&tz)).take(count).collect())
}

/// The next `count` firing times of `expr` in `timezone`, from now.
pub fn next_runs(
    expr: &str,
    timezone: Option<&str>,
    count: usize,
) -> Result<Vec<DateTime<Tz>>, ScheduleError> {
    next_runs_after(expr, timezone, Utc::now(), count)
}

/// The timer period for an `interval` schedule of `ms` milliseconds.
///
/// Fails when the period is below the minimum, or so long that the first
/// firing time cannot be represented.
pub fn interval_period(ms: u64) -> Result<Duration, ScheduleError> {
    if ms < MIN_INTERVAL_MS {
        return Err(ScheduleError::IntervalTooShort(ms));
    }
    let period = Duration::from_millis(ms);
    let representable = tokio::time::Instant::now().checked_add(period).is_some()
        && chrono::Duration::from_std(period)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .is_some();
    if !representable {
        return Err(ScheduleError::IntervalTooLong(ms));
    }
    Ok(period)
}

/// Check the parts of an enabled schedule the scheduler will rely on.
pub fn validate_schedule(workflow: &WorkflowDefinition) -> Result<(), ScheduleError> {
    let Some(schedule) = workflow.schedule.as_ref().filter(|s| s.enabled) else {
        return Ok(());
    };
    if let Some(expr) = &schedule.cron {
        parse_cron(expr)?;
        parse_timezone(schedule.timezone.as_deref())?;
    } else if let Some(ms) = schedule.interval {
        interval_period(ms)?;
    }
    Ok(())
}

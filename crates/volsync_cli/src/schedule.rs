//! Backup schedule expressions.
//!
//! Accepts standard five-field cron (`min hour dom month dow`), the
//! `@hourly`/`@daily`/`@midnight`/`@weekly`/`@monthly`/`@yearly`/`@annually`
//! descriptors, and `@every <duration>`. Cron expressions and descriptors
//! fire on wall-clock boundaries; `@every` fires a fixed time after the
//! previous run.

use crate::config::parse_duration;
use chrono::{DateTime, TimeZone};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Errors from parsing a schedule expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// A cron expression that does not parse.
    #[error("invalid cron expression {expression:?}: {reason}")]
    InvalidCron {
        /// The whole expression.
        expression: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An `@` descriptor that is not recognised.
    #[error("unknown schedule descriptor {0:?}")]
    UnknownDescriptor(String),

    /// `@every` with an unusable duration.
    #[error("invalid interval in {expression:?}: {reason}")]
    InvalidInterval {
        /// The whole expression.
        expression: String,
        /// What is wrong with it.
        reason: String,
    },
}

#[derive(Debug, Clone)]
enum Trigger {
    Every(Duration),
    Calendar(Box<cron::Schedule>),
}

/// When scheduled backups run.
#[derive(Debug, Clone)]
pub struct Schedule {
    expression: String,
    trigger: Trigger,
}

impl Schedule {
    /// Parses a schedule expression.
    ///
    /// `@every` intervals under one second are rounded up to one second.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let trimmed = expression.trim();

        let trigger = if let Some(every) = trimmed.strip_prefix("@every ") {
            Trigger::Every(parse_every(trimmed, every)?)
        } else {
            let fields = match trimmed {
                "@hourly" => "0 0 * * * *".to_string(),
                "@daily" | "@midnight" => "0 0 0 * * *".to_string(),
                "@weekly" => "0 0 0 * * Sun".to_string(),
                "@monthly" => "0 0 0 1 * *".to_string(),
                "@yearly" | "@annually" => "0 0 0 1 1 *".to_string(),
                other if other.starts_with('@') => {
                    return Err(ScheduleError::UnknownDescriptor(other.to_string()))
                }
                other => with_seconds(other)?,
            };
            let calendar = cron::Schedule::from_str(&fields).map_err(|e| {
                ScheduleError::InvalidCron {
                    expression: trimmed.to_string(),
                    reason: e.to_string(),
                }
            })?;
            Trigger::Calendar(Box::new(calendar))
        };

        Ok(Self {
            expression: trimmed.to_string(),
            trigger,
        })
    }

    /// The first run strictly after `now`, or `None` if there is none.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        match &self.trigger {
            Trigger::Every(interval) => {
                let step = chrono::Duration::from_std(*interval).ok()?;
                now.clone().checked_add_signed(step)
            }
            Trigger::Calendar(calendar) => calendar.after(now).next(),
        }
    }

    /// Time to wait from `now` until the next run.
    pub fn delay_from<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<Duration> {
        let next = self.next_after(now)?;
        next.signed_duration_since(now.clone()).to_std().ok()
    }
}

impl PartialEq for Schedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for Schedule {}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn parse_every(expression: &str, every: &str) -> Result<Duration, ScheduleError> {
    let interval = parse_duration(every).map_err(|reason| ScheduleError::InvalidInterval {
        expression: expression.to_string(),
        reason,
    })?;
    if interval.is_zero() {
        return Err(ScheduleError::InvalidInterval {
            expression: expression.to_string(),
            reason: "interval must be positive".into(),
        });
    }
    Ok(interval.max(MIN_INTERVAL))
}

/// Turns a five-field expression into the six-field form `cron` parses.
///
/// Prepends a zero seconds field and rewrites numeric weekdays, which
/// count from Sunday = 0 in standard cron but from Sunday = 1 in `cron`.
fn with_seconds(expression: &str) -> Result<String, ScheduleError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(ScheduleError::InvalidCron {
            expression: expression.to_string(),
            reason: format!("expected 5 fields, found {}", fields.len()),
        });
    }
    let weekday = weekday_names(fields[4]).map_err(|reason| ScheduleError::InvalidCron {
        expression: expression.to_string(),
        reason,
    })?;
    Ok(format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], weekday
    ))
}

const WEEKDAYS: [&str; 8] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Replaces weekday numbers (0-7) with names; step values stay numeric.
fn weekday_names(field: &str) -> Result<String, String> {
    let mut out = String::with_capacity(field.len());
    let mut digits = String::new();
    let mut after_slash = false;

    for c in field.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        push_weekday(&mut out, &mut digits, after_slash)?;
        match c {
            '/' => after_slash = true,
            ',' | '-' => after_slash = false,
            _ => {}
        }
        out.push(c);
    }
    push_weekday(&mut out, &mut digits, after_slash)?;
    Ok(out)
}

fn push_weekday(out: &mut String, digits: &mut String, step: bool) -> Result<(), String> {
    if digits.is_empty() {
        return Ok(());
    }
    if step {
        out.push_str(digits);
    } else {
        let day: usize = digits
            .parse()
            .map_err(|_| format!("invalid weekday {digits:?}"))?;
        let name = WEEKDAYS
            .get(day)
            .ok_or_else(|| format!("weekday {day} out of range 0-7"))?;
        out.push_str(name);
    }
    digits.clear();
    Ok(())
}

//! Shared data model for sweepbot.
//!
//! The persisted wire format is a JSON array of task records; field names and
//! string encodings here match that format exactly, so the store can serialize
//! a `DeletionTask` slice directly.

use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use chrono_tz::Tz;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

// ──────────────────── Errors ────────────────────

/// Errors surfaced synchronously by task creation and control operations.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("invalid start time {0:?}: expected HH:MM")]
    InvalidStartTime(String),
    #[error("unknown timezone {0:?}: expected an IANA zone name")]
    UnknownTimezone(String),
    #[error("unknown recurrence {0:?}: expected \"Daily\" or a weekday name")]
    UnknownRecurrence(String),
    #[error("no task with id {0}")]
    NotFound(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl TaskError {
    /// Whether this error is a rejection of caller-supplied input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TaskError::InvalidStartTime(_)
                | TaskError::UnknownTimezone(_)
                | TaskError::UnknownRecurrence(_)
        )
    }
}

// ──────────────────── Channel reference ────────────────────

/// Target channel for a deletion task.
///
/// `id` is canonical; `name` is a cached label for display only and may go
/// stale if the channel is renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    #[serde(rename = "channel_id")]
    pub id: String,
    #[serde(rename = "channel_name")]
    pub name: String,
}

// ──────────────────── Start time ────────────────────

/// Wall-clock time of day, interpreted in the task's timezone.
///
/// Serialized as a strict `"HH:MM"` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartTime {
    pub hour: u8,
    pub minute: u8,
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for StartTime {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TaskError::InvalidStartTime(s.to_string());

        let bytes = s.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(invalid());
        }
        if !bytes[..2].iter().chain(&bytes[3..]).all(u8::is_ascii_digit) {
            return Err(invalid());
        }

        let hour: u8 = s[..2].parse().map_err(|_| invalid())?;
        let minute: u8 = s[3..].parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }

        Ok(StartTime { hour, minute })
    }
}

impl Serialize for StartTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StartTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// ──────────────────── Recurrence ────────────────────

/// How often a task fires.
///
/// On the wire this is the single `day_of_week` field carrying either a full
/// weekday name or the sentinel `"Daily"`; internally the two cases are kept
/// as distinct variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Daily,
    Weekly(Weekday),
}

const WEEKDAY_NAMES: [(&str, Weekday); 7] = [
    ("Monday", Weekday::Mon),
    ("Tuesday", Weekday::Tue),
    ("Wednesday", Weekday::Wed),
    ("Thursday", Weekday::Thu),
    ("Friday", Weekday::Fri),
    ("Saturday", Weekday::Sat),
    ("Sunday", Weekday::Sun),
];

impl Recurrence {
    /// Full weekday name, or `"Daily"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::Daily => "Daily",
            Recurrence::Weekly(day) => {
                WEEKDAY_NAMES
                    .iter()
                    .find(|(_, d)| d == day)
                    .map(|(name, _)| *name)
                    .unwrap_or("Daily")
            }
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "Daily" {
            return Ok(Recurrence::Daily);
        }
        WEEKDAY_NAMES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, day)| Recurrence::Weekly(*day))
            .ok_or_else(|| TaskError::UnknownRecurrence(s.to_string()))
    }
}

impl Serialize for Recurrence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Recurrence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// ──────────────────── Status ────────────────────

/// Whether a task is eligible to fire.
///
/// Inactive tasks stay in the store for later reactivation but never run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Inactive,
}

// ──────────────────── Task descriptor ────────────────────

/// A persisted recurring deletion job for one channel.
///
/// This is the durable descriptor only; the live worker handle is runtime
/// state owned by the registry and is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionTask {
    /// Unique task id, assigned at creation, immutable.
    pub id: String,
    #[serde(flatten)]
    pub channel: ChannelRef,
    pub start_time: StartTime,
    #[serde(rename = "day_of_week")]
    pub recurrence: Recurrence,
    /// IANA zone name; resolved with [`DeletionTask::resolve_timezone`] at
    /// schedule-computation time, never stored resolved.
    pub timezone: String,
    pub status: TaskStatus,
}

impl DeletionTask {
    pub fn resolve_timezone(&self) -> Result<Tz, TaskError> {
        resolve_timezone(&self.timezone)
    }
}

/// Resolve an IANA zone name.
pub fn resolve_timezone(name: &str) -> Result<Tz, TaskError> {
    name.parse::<Tz>()
        .map_err(|_| TaskError::UnknownTimezone(name.to_string()))
}

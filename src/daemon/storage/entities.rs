use std::{fmt::Display, path::PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a registered program. Ids are handed out by the registry and
/// never reused; all "same program" checks compare ids, nothing else.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProgramId(pub u32);

impl Display for ProgramId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A program the user asked to have timed. Created through `timekeep add`,
/// only ever removed through `timekeep remove`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedProgram {
    pub id: ProgramId,
    /// Display name chosen by the user.
    pub name: String,
    /// Name matched against the foreground executable, e.g. "firefox".
    pub process_name: String,
    /// Where the executable lived when the program was registered.
    #[serde(default)]
    pub location: Option<PathBuf>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub added_at: DateTime<Utc>,
}

/// One contiguous span of foreground activity for a program. `end` is None
/// while the span is still being timed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub program: ProgramId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub end: Option<DateTime<Utc>>,
}

impl TimeEntry {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Elapsed time as of `now`. Closed entries ignore `now`; an open entry
    /// is counted up to it. Never negative, even on clock oddities.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let until = self.end.unwrap_or(now);
        (until - self.start).max(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{ProgramId, TimeEntry};

    #[test]
    fn entry_serde_keeps_open_end() {
        let entry = TimeEntry {
            program: ProgramId(3),
            start: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            end: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: TimeEntry = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_open());
        assert_eq!(parsed, entry);
    }

    #[test]
    fn elapsed_clamps_negative_spans() {
        let start = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let entry = TimeEntry {
            program: ProgramId(1),
            start,
            end: None,
        };
        assert_eq!(
            entry.elapsed(start - Duration::seconds(5)),
            Duration::zero()
        );
        assert_eq!(
            entry.elapsed(start + Duration::seconds(5)),
            Duration::seconds(5)
        );
    }
}

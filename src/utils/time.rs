use chrono::{Duration, NaiveDate};

/// Record files are named after the UTC day they hold, in this format.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Inverse of [date_to_record_name]. Returns None for files that are not
/// record files (stray editor backups and the like).
pub fn record_name_to_date(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, "%Y-%m-%d").ok()
}

/// Formats a duration the way the totals view shows it: `1:07:42`.
/// Negative durations render as zero.
pub fn format_clock(v: Duration) -> String {
    let seconds = v.num_seconds().max(0);
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60
    )
}

/// Share of `value` in `whole` as integer percent. A zero `whole` yields 0
/// instead of dividing by zero.
pub fn duration_percent(value: Duration, whole: Duration) -> i64 {
    if whole.num_seconds() <= 0 {
        return 0;
    }
    value.num_seconds() * 100 / whole.num_seconds()
}

//! Reduces stored time entries to what the totals view shows: how much
//! tracked time a day holds, which programs it went to, and whether
//! something is being timed right now.
//!
//! "Today" is bounded by local midnight. The UTC offset is an explicit
//! parameter so the math is testable; callers pass their current offset.

use std::{collections::HashMap, future, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use futures::{Stream, StreamExt, TryStreamExt, stream};
use tracing::error;

use crate::daemon::storage::{
    entities::{ProgramId, TimeEntry},
    entry_store::EntryReader,
};

/// One row of the per-program ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramTotal {
    pub program: ProgramId,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySummary {
    /// Sum over every entry in the window, the open one counted up to `now`.
    pub total: Duration,
    /// Programs with an entry still being timed. The tracker produces at
    /// most one, but more are tolerated and all of them are counted.
    pub open: Vec<ProgramId>,
    /// Programs by descending tracked time, ties broken by id.
    pub ranked: Vec<ProgramTotal>,
}

/// UTC moments bounding a local day: its midnight and the next one.
pub fn day_bounds(day: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = |d: NaiveDate| {
        offset
            .from_local_datetime(&d.and_time(NaiveTime::MIN))
            .unwrap()
            .with_timezone(&Utc)
    };
    let next = day.succ_opt().expect("End of time should never happen");
    (midnight(day), midnight(next))
}

/// Entries whose span began inside `[from, to)`, streamed in day-file order.
/// A day file that fails to read surfaces as one Err item.
pub fn entries_between<R>(
    reader: R,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> impl Stream<Item = Result<TimeEntry>>
where
    R: EntryReader + Send + Sync + 'static,
{
    let reader = Arc::new(reader);

    let days = date_range(from.date_naive(), to.date_naive());

    stream::iter(days)
        .map(move |day| {
            let reader = reader.clone();
            async move { (day, reader.entries_for(day).await) }
        })
        .buffered(4)
        .flat_map(|(day, data)| match data {
            Ok(data) => stream::iter(data).map(Ok).boxed(),
            Err(e) => {
                error!("Failed to read entries for {day} {e}");
                stream::once(future::ready(Err(e))).boxed()
            }
        })
        .filter_map(move |v| {
            future::ready(match v {
                Ok(entry) if entry.start >= from && entry.start < to => Some(Ok(entry)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        })
}

/// Dates from start to end, inclusive on both sides.
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    std::iter::successors(Some(start), |current| {
        Some(current.succ_opt().expect("End of time should never happen"))
    })
    .take_while(move |current| *current <= end)
}

/// Folds a set of entries into a [DaySummary]. `filter` keeps a single
/// program's entries; None keeps everything.
pub fn summarize(
    entries: impl IntoIterator<Item = TimeEntry>,
    filter: Option<ProgramId>,
    now: DateTime<Utc>,
) -> DaySummary {
    let mut totals = HashMap::<ProgramId, Duration>::new();
    let mut open = vec![];
    let mut total = Duration::zero();

    for entry in entries {
        if filter.is_some_and(|wanted| entry.program != wanted) {
            continue;
        }
        let elapsed = entry.elapsed(now);
        total += elapsed;
        *totals.entry(entry.program).or_insert_with(Duration::zero) += elapsed;
        if entry.is_open() {
            open.push(entry.program);
        }
    }

    let mut ranked = totals
        .into_iter()
        .map(|(program, duration)| ProgramTotal { program, duration })
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.duration.cmp(&a.duration).then(a.program.cmp(&b.program)));

    DaySummary {
        total,
        open,
        ranked,
    }
}

/// Loads and summarizes one local day as of `now`.
pub async fn summarize_day<R>(
    reader: R,
    day: NaiveDate,
    offset: FixedOffset,
    filter: Option<ProgramId>,
    now: DateTime<Utc>,
) -> Result<DaySummary>
where
    R: EntryReader + Send + Sync + 'static,
{
    let (from, to) = day_bounds(day, offset);
    let entries: Vec<TimeEntry> = entries_between(reader, from, to).try_collect().await?;
    Ok(summarize(entries, filter, now))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use anyhow::Result;
    use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
    use futures::TryStreamExt;

    use crate::daemon::storage::{
        entities::{ProgramId, TimeEntry},
        entry_store::EntryReader,
    };

    use super::{day_bounds, entries_between, summarize, summarize_day};

    const A: ProgramId = ProgramId(1);
    const B: ProgramId = ProgramId(2);

    /// In-memory day files.
    #[derive(Default, Clone)]
    struct FakeReader {
        days: HashMap<NaiveDate, Vec<TimeEntry>>,
    }

    impl EntryReader for FakeReader {
        async fn entries_for(&self, date: NaiveDate) -> Result<Vec<TimeEntry>> {
            Ok(self.days.get(&date).cloned().unwrap_or_default())
        }
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn closed(program: ProgramId, start: &str, seconds: i64) -> TimeEntry {
        let start = at(start);
        TimeEntry {
            program,
            start,
            end: Some(start + Duration::seconds(seconds)),
        }
    }

    fn open(program: ProgramId, start: &str) -> TimeEntry {
        TimeEntry {
            program,
            start: at(start),
            end: None,
        }
    }

    #[test]
    fn empty_day_is_all_zeroes() {
        let summary = summarize(vec![], None, at("2024-04-05T12:00:00Z"));
        assert_eq!(summary.total, Duration::zero());
        assert!(summary.open.is_empty());
        assert!(summary.ranked.is_empty());
    }

    #[test]
    fn closed_entries_sum_and_rank_descending() {
        let now = at("2024-04-05T12:00:00Z");
        let summary = summarize(
            vec![
                closed(A, "2024-04-05T09:00:00Z", 60),
                closed(B, "2024-04-05T10:00:00Z", 300),
                closed(A, "2024-04-05T11:00:00Z", 120),
            ],
            None,
            now,
        );
        assert_eq!(summary.total, Duration::seconds(480));
        assert!(summary.open.is_empty());
        assert_eq!(summary.ranked.len(), 2);
        assert_eq!(summary.ranked[0].program, B);
        assert_eq!(summary.ranked[0].duration, Duration::seconds(300));
        assert_eq!(summary.ranked[1].program, A);
        assert_eq!(summary.ranked[1].duration, Duration::seconds(180));
    }

    #[test]
    fn open_entry_counts_up_to_now() {
        let now = at("2024-04-05T12:00:30Z");
        let summary = summarize(vec![open(A, "2024-04-05T12:00:00Z")], None, now);
        assert_eq!(summary.total, Duration::seconds(30));
        assert_eq!(summary.open, vec![A]);
    }

    #[test]
    fn multiple_open_entries_are_all_counted() {
        // The tracker never produces this, the view still has to cope.
        let now = at("2024-04-05T12:01:00Z");
        let summary = summarize(
            vec![
                open(A, "2024-04-05T12:00:00Z"),
                open(B, "2024-04-05T12:00:30Z"),
            ],
            None,
            now,
        );
        assert_eq!(summary.total, Duration::seconds(90));
        assert_eq!(summary.open, vec![A, B]);
    }

    #[test]
    fn filter_keeps_one_program() {
        let now = at("2024-04-05T12:00:00Z");
        let summary = summarize(
            vec![
                closed(A, "2024-04-05T09:00:00Z", 60),
                closed(B, "2024-04-05T10:00:00Z", 300),
            ],
            Some(A),
            now,
        );
        assert_eq!(summary.total, Duration::seconds(60));
        assert_eq!(summary.ranked.len(), 1);
        assert_eq!(summary.ranked[0].program, A);
    }

    #[test]
    fn day_bounds_apply_the_offset() {
        let day = NaiveDate::from_ymd_opt(2024, 4, 5).unwrap();
        let (from, to) = day_bounds(day, FixedOffset::east_opt(2 * 3600).unwrap());
        assert_eq!(from, at("2024-04-04T22:00:00Z"));
        assert_eq!(to, at("2024-04-05T22:00:00Z"));
    }

    #[tokio::test]
    async fn entries_between_spans_day_files_and_filters_by_start() -> Result<()> {
        let mut reader = FakeReader::default();
        // Started before local midnight, lives in the previous UTC day file.
        reader.days.insert(
            NaiveDate::from_ymd_opt(2024, 4, 4).unwrap(),
            vec![
                closed(A, "2024-04-04T21:00:00Z", 60),
                closed(A, "2024-04-04T23:00:00Z", 60),
            ],
        );
        reader.days.insert(
            NaiveDate::from_ymd_opt(2024, 4, 5).unwrap(),
            vec![closed(B, "2024-04-05T10:00:00Z", 60)],
        );

        let from = at("2024-04-04T22:00:00Z");
        let to = at("2024-04-05T22:00:00Z");
        let entries: Vec<TimeEntry> = entries_between(reader, from, to).try_collect().await?;

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].start, at("2024-04-04T23:00:00Z"));
        assert_eq!(entries[1].start, at("2024-04-05T10:00:00Z"));
        Ok(())
    }

    #[tokio::test]
    async fn summarize_day_combines_loading_and_folding() -> Result<()> {
        let mut reader = FakeReader::default();
        reader.days.insert(
            NaiveDate::from_ymd_opt(2024, 4, 5).unwrap(),
            vec![
                closed(A, "2024-04-05T09:00:00Z", 600),
                open(B, "2024-04-05T11:59:00Z"),
            ],
        );

        let summary = summarize_day(
            reader,
            NaiveDate::from_ymd_opt(2024, 4, 5).unwrap(),
            FixedOffset::east_opt(0).unwrap(),
            None,
            at("2024-04-05T12:00:00Z"),
        )
        .await?;

        assert_eq!(summary.total, Duration::seconds(660));
        assert_eq!(summary.open, vec![B]);
        assert_eq!(summary.ranked[0].program, A);
        Ok(())
    }
}

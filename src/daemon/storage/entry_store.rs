use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::utils::time::{date_to_record_name, record_name_to_date};

use super::entities::{ProgramId, TimeEntry};

/// Mutation side of entry persistence, driven by the session module. Exactly
/// one open entry can exist at a time; it is created by [EntryStore::open_entry]
/// and terminated by [EntryStore::close_entry].
pub trait EntryStore {
    fn open_entry(
        &mut self,
        program: ProgramId,
        start: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>>;

    fn close_entry(
        &mut self,
        program: ProgramId,
        end: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>>;

    /// Startup pass: entries a previous run never terminated are dropped,
    /// not closed, because their true end time is unknowable. Returns how
    /// many were dropped.
    fn discard_open_entries(&mut self) -> impl Future<Output = Result<usize>>;

    fn flush(&mut self) -> impl Future<Output = Result<()>>;
}

/// Read side of entry persistence, driven by the aggregator.
pub trait EntryReader {
    fn entries_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<TimeEntry>>> + Send;
}

impl<T: Deref + Sync> EntryReader for T
where
    T::Target: EntryReader + Sync,
{
    fn entries_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<TimeEntry>>> + Send {
        self.deref().entries_for(date)
    }
}

/// Remembers where the currently open entry lives so closing it can rewrite
/// that exact line.
struct OpenHandle {
    program: ProgramId,
    date: NaiveDate,
    /// Byte offset of the start of the open entry's line in its day file.
    offset: u64,
    start: DateTime<Utc>,
}

/// Day-file entry storage. One file per UTC day under `record_dir`, one json
/// entry per line. The open entry is always the last line of the file it was
/// appended to, which makes closing a truncate-and-rewrite of that line.
pub struct LocalEntryStore {
    record_dir: PathBuf,
    open: Option<OpenHandle>,
}

impl LocalEntryStore {
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self {
            record_dir,
            open: None,
        })
    }

    fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.record_dir.join(date_to_record_name(date))
    }

    async fn open_day_file(&self, date: NaiveDate) -> Result<File> {
        let file = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(self.path_for(date))
            .await?;
        Ok(file)
    }

    async fn append_entry(file: &mut File, entry: &TimeEntry) -> Result<u64> {
        file.seek(std::io::SeekFrom::End(0)).await?;
        let mut offset = file.stream_position().await?;

        // A previous run may have died mid-write and left the file without a
        // trailing newline. Complete that line so the torn tail stays
        // isolated (the reader skips it as corrupt).
        if offset > 0 {
            file.seek(std::io::SeekFrom::End(-1)).await?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                file.write_all(b"\n").await?;
            }
            offset = file.stream_position().await?;
        }

        let mut buffer = Vec::<u8>::new();
        serde_json::to_writer(&mut buffer, entry)?;
        buffer.push(b'\n');
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(offset)
    }

    async fn rewrite_last_line(file: &mut File, offset: u64, entry: &TimeEntry) -> Result<()> {
        file.set_len(offset).await?;
        file.seek(std::io::SeekFrom::End(0)).await?;

        let mut buffer = Vec::<u8>::new();
        serde_json::to_writer(&mut buffer, entry)?;
        buffer.push(b'\n');
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_entries(path: &Path) -> Result<Vec<TimeEntry>> {
        async fn extract(path: &Path) -> std::result::Result<Vec<TimeEntry>, std::io::Error> {
            debug!("Extracting {path:?}");
            let file = File::open(path).await?;
            file.lock_shared()?;
            let buffer = BufReader::new(file);
            let mut lines = buffer.lines();
            let mut entries = vec![];
            while let Ok(Some(v)) = lines.next_line().await {
                match serde_json::from_str::<TimeEntry>(&v) {
                    Ok(v) => entries.push(v),
                    Err(e) => {
                        // ignore illegal values. Might happen after shutdowns
                        warn!(
                            "During parsing in path {:?} found illegal json string {}:  {e}",
                            path, &v
                        )
                    }
                }
            }

            lines.into_inner().into_inner().unlock_async().await?;

            Ok(entries)
        }

        match extract(path).await {
            Ok(s) => Ok(s),
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    Ok(vec![])
                } else {
                    Err(e)?
                }
            }
        }
    }

    /// Rewrites a single day file without its open entries. Returns how many
    /// were dropped.
    async fn discard_in_file(&self, date: NaiveDate) -> Result<usize> {
        let path = self.path_for(date);
        let entries = Self::read_entries(&path).await?;
        let open_count = entries.iter().filter(|e| e.is_open()).count();
        if open_count == 0 {
            return Ok(0);
        }

        let mut file = self.open_day_file(date).await?;
        file.lock_exclusive()?;
        let result = async {
            file.set_len(0).await?;
            file.seek(std::io::SeekFrom::Start(0)).await?;
            let mut buffer = Vec::<u8>::new();
            for entry in entries.iter().filter(|e| !e.is_open()) {
                serde_json::to_writer(&mut buffer, entry)?;
                buffer.push(b'\n');
            }
            file.write_all(&buffer).await?;
            file.flush().await?;
            Ok::<_, anyhow::Error>(())
        }
        .await;
        file.unlock_async().await?;
        result?;

        warn!(
            "Dropped {open_count} unterminated entries from {:?}",
            self.path_for(date)
        );
        Ok(open_count)
    }
}

impl EntryStore for LocalEntryStore {
    async fn open_entry(&mut self, program: ProgramId, start: DateTime<Utc>) -> Result<()> {
        if let Some(stale) = self.open.take() {
            // The tracker never opens twice in a row; a stale handle means a
            // bug upstream. The file side stays consistent either way.
            warn!(
                "Opening an entry for {program} while {} is still marked open",
                stale.program
            );
        }

        let date = start.date_naive();
        let mut file = self.open_day_file(date).await?;
        file.lock_exclusive()?;
        let result = Self::append_entry(
            &mut file,
            &TimeEntry {
                program,
                start,
                end: None,
            },
        )
        .await;
        file.unlock_async().await?;
        let offset = result?;

        self.open = Some(OpenHandle {
            program,
            date,
            offset,
            start,
        });
        Ok(())
    }

    async fn close_entry(&mut self, program: ProgramId, end: DateTime<Utc>) -> Result<()> {
        let Some(handle) = self.open.take() else {
            warn!("Asked to close an entry for {program} but none is open");
            return Ok(());
        };
        if handle.program != program {
            warn!(
                "Asked to close an entry for {program} but {} is the open one",
                handle.program
            );
        }

        let mut file = self.open_day_file(handle.date).await?;
        file.lock_exclusive()?;
        let result = Self::rewrite_last_line(
            &mut file,
            handle.offset,
            &TimeEntry {
                program: handle.program,
                start: handle.start,
                end: Some(end),
            },
        )
        .await;
        file.unlock_async().await?;
        result
    }

    async fn discard_open_entries(&mut self) -> Result<usize> {
        self.open = None;

        let mut discarded = 0;
        let mut dir = tokio::fs::read_dir(&self.record_dir).await?;
        while let Some(dir_entry) = dir.next_entry().await? {
            let name = dir_entry.file_name();
            let Some(date) = record_name_to_date(&name.to_string_lossy()) else {
                continue;
            };
            discarded += self.discard_in_file(date).await?;
        }
        Ok(discarded)
    }

    async fn flush(&mut self) -> Result<()> {
        // Every mutation is flushed as it happens; an entry still open at
        // shutdown is left for the next startup's discard pass.
        Ok(())
    }
}

impl EntryReader for LocalEntryStore {
    async fn entries_for(&self, date: NaiveDate) -> Result<Vec<TimeEntry>> {
        Self::read_entries(&self.path_for(date)).await
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    use crate::daemon::storage::{
        entities::{ProgramId, TimeEntry},
        entry_store::{EntryReader, EntryStore, LocalEntryStore},
    };

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn start_time() -> chrono::DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE)
    }

    #[tokio::test]
    async fn open_then_close_leaves_one_closed_entry() -> Result<()> {
        let dir = tempdir()?;
        let mut store = LocalEntryStore::new(dir.path().to_path_buf())?;

        store.open_entry(ProgramId(1), start_time()).await?;
        store
            .close_entry(ProgramId(1), start_time() + Duration::seconds(30))
            .await?;

        let entries = store.entries_for(TEST_START_DATE.date()).await?;
        assert_eq!(
            entries,
            vec![TimeEntry {
                program: ProgramId(1),
                start: start_time(),
                end: Some(start_time() + Duration::seconds(30)),
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn sequential_sessions_append() -> Result<()> {
        let dir = tempdir()?;
        let mut store = LocalEntryStore::new(dir.path().to_path_buf())?;

        store.open_entry(ProgramId(1), start_time()).await?;
        store
            .close_entry(ProgramId(1), start_time() + Duration::seconds(10))
            .await?;
        store
            .open_entry(ProgramId(2), start_time() + Duration::seconds(10))
            .await?;
        store
            .close_entry(ProgramId(2), start_time() + Duration::seconds(25))
            .await?;

        let entries = store.entries_for(TEST_START_DATE.date()).await?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].program, ProgramId(1));
        assert_eq!(entries[1].program, ProgramId(2));
        assert!(entries.iter().all(|e| !e.is_open()));
        Ok(())
    }

    #[tokio::test]
    async fn close_without_open_is_a_noop() -> Result<()> {
        let dir = tempdir()?;
        let mut store = LocalEntryStore::new(dir.path().to_path_buf())?;

        store.close_entry(ProgramId(7), start_time()).await?;

        let entries = store.entries_for(TEST_START_DATE.date()).await?;
        assert!(entries.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn open_entry_is_visible_to_readers() -> Result<()> {
        let dir = tempdir()?;
        let mut store = LocalEntryStore::new(dir.path().to_path_buf())?;

        store.open_entry(ProgramId(1), start_time()).await?;

        let entries = store.entries_for(TEST_START_DATE.date()).await?;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_open());
        Ok(())
    }

    #[tokio::test]
    async fn discard_drops_only_open_entries() -> Result<()> {
        let dir = tempdir()?;
        let mut store = LocalEntryStore::new(dir.path().to_path_buf())?;

        store.open_entry(ProgramId(1), start_time()).await?;
        store
            .close_entry(ProgramId(1), start_time() + Duration::seconds(10))
            .await?;
        store
            .open_entry(ProgramId(2), start_time() + Duration::seconds(20))
            .await?;

        // Simulates the next startup: the second entry was never closed.
        let mut restarted = LocalEntryStore::new(dir.path().to_path_buf())?;
        let discarded = restarted.discard_open_entries().await?;
        assert_eq!(discarded, 1);

        let entries = restarted.entries_for(TEST_START_DATE.date()).await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].program, ProgramId(1));
        assert!(!entries[0].is_open());

        // A second pass finds nothing left to drop.
        assert_eq!(restarted.discard_open_entries().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn discard_spans_multiple_day_files() -> Result<()> {
        let dir = tempdir()?;
        let mut store = LocalEntryStore::new(dir.path().to_path_buf())?;

        store.open_entry(ProgramId(1), start_time()).await?;
        // Dropping the handle mid-session, like a crash would.
        store.open = None;
        store
            .open_entry(ProgramId(2), start_time() + Duration::days(1))
            .await?;

        let mut restarted = LocalEntryStore::new(dir.path().to_path_buf())?;
        assert_eq!(restarted.discard_open_entries().await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_lines_are_skipped_on_read() -> Result<()> {
        let dir = tempdir()?;
        let mut store = LocalEntryStore::new(dir.path().to_path_buf())?;

        store.open_entry(ProgramId(1), start_time()).await?;
        store
            .close_entry(ProgramId(1), start_time() + Duration::seconds(5))
            .await?;

        let path = store.path_for(TEST_START_DATE.date());
        let mut file = tokio::fs::File::options().append(true).open(&path).await?;
        file.write_all(b"{\"program\":2,\"sta").await?;
        file.flush().await?;

        let entries = store.entries_for(TEST_START_DATE.date()).await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].program, ProgramId(1));
        Ok(())
    }

    #[tokio::test]
    async fn append_completes_a_torn_tail() -> Result<()> {
        let dir = tempdir()?;
        let mut store = LocalEntryStore::new(dir.path().to_path_buf())?;

        let path = store.path_for(TEST_START_DATE.date());
        tokio::fs::write(&path, b"{\"program\":9,\"sta").await?;

        store.open_entry(ProgramId(1), start_time()).await?;
        store
            .close_entry(ProgramId(1), start_time() + Duration::seconds(5))
            .await?;

        let entries = store.entries_for(TEST_START_DATE.date()).await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].program, ProgramId(1));
        Ok(())
    }
}

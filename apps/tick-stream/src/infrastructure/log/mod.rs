//! File-backed Message Log
//!
//! A single-topic, append-only JSONL log with independent consumer groups.
//!
//! # Layout
//!
//! ```text
//! <dir>/<topic>.<base>.jsonl          one segment, one tick per line
//! <dir>/<topic>.<group>.offset        committed offset of a group
//! ```
//!
//! Offsets are logical byte positions: a segment named with base `b` holds
//! the bytes from `b` up to the next segment's base. The writer rolls to a
//! fresh segment once the active one reaches `segment_bytes`. A closed
//! segment is deleted once every known group has committed past it.
//!
//! Appends are flushed and synced before `publish` returns. A consumer only
//! sees newline-terminated lines, so a torn write is never delivered. Each
//! group resumes from its own committed offset; records read but not yet
//! committed are delivered again after a restart (at-least-once).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, Notify};

use crate::application::ports::{LogError, LogRecord, TickPublisher, TickSubscription};
use crate::domain::market::Tick;

/// Default interval between checks for appends made by other processes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default size at which the active segment is closed.
pub const DEFAULT_SEGMENT_BYTES: u64 = 64 * 1024 * 1024;

/// Where a group without a committed offset starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    /// From the first retained record.
    Earliest,
    /// From the end of the log at subscribe time.
    Latest,
}

#[derive(Debug)]
struct ActiveSegment {
    file: File,
    base: u64,
}

#[derive(Debug)]
struct LogInner {
    dir: PathBuf,
    topic: String,
    segment_bytes: u64,
    writer: Mutex<ActiveSegment>,
    appended: Notify,
    poll_interval: Duration,
}

impl LogInner {
    fn segment_path(&self, base: u64) -> PathBuf {
        segment_file(&self.dir, &self.topic, base)
    }

    fn offset_path(&self, group: &str) -> PathBuf {
        self.dir.join(format!("{}.{group}.offset", self.topic))
    }

    async fn segments(&self) -> Result<Vec<u64>, LogError> {
        list_segments(&self.dir, &self.topic).await
    }

    /// Close the active segment if it is full. Returns whether it rolled.
    async fn roll_if_full(&self, active: &mut ActiveSegment) -> Result<bool, LogError> {
        let size = active.file.metadata().await?.len();
        if size < self.segment_bytes {
            return Ok(false);
        }

        let base = active.base + size;
        let file = open_append(&self.segment_path(base)).await?;
        *active = ActiveSegment { file, base };
        tracing::info!(topic = %self.topic, base, "Log segment rolled");
        Ok(true)
    }
}

/// Durable append-only log; cheap to clone.
///
/// Clones share the writer and the append notification, so a process should
/// open the log once and hand out clones.
#[derive(Debug, Clone)]
pub struct FileMessageLog {
    inner: Arc<LogInner>,
}

impl FileMessageLog {
    /// Open (creating if needed) the log for `topic` under `dir` with the
    /// default segment size.
    ///
    /// # Errors
    ///
    /// Returns `LogError::Io` if the directory or file cannot be created.
    pub async fn open(
        dir: impl AsRef<Path>,
        topic: &str,
        poll_interval: Duration,
    ) -> Result<Self, LogError> {
        Self::open_with(dir, topic, poll_interval, DEFAULT_SEGMENT_BYTES).await
    }

    /// Open the log, closing segments once they reach `segment_bytes`.
    ///
    /// Appends continue in the newest existing segment. Segments every group
    /// has consumed are removed before this returns.
    ///
    /// # Errors
    ///
    /// Returns `LogError::Io` if the directory or file cannot be created.
    pub async fn open_with(
        dir: impl AsRef<Path>,
        topic: &str,
        poll_interval: Duration,
        segment_bytes: u64,
    ) -> Result<Self, LogError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;

        let bases = list_segments(&dir, topic).await?;
        let base = bases.last().copied().unwrap_or(0);
        let path = segment_file(&dir, topic, base);
        let file = open_append(&path).await?;

        tracing::info!(
            path = %path.display(),
            segments = bases.len().max(1),
            segment_bytes,
            "Message log opened"
        );

        let log = Self {
            inner: Arc::new(LogInner {
                dir,
                topic: topic.to_string(),
                segment_bytes,
                writer: Mutex::new(ActiveSegment { file, base }),
                appended: Notify::new(),
                poll_interval,
            }),
        };
        log.enforce_retention().await?;
        Ok(log)
    }

    /// Topic name.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// Path of the segment currently receiving appends.
    pub async fn active_segment(&self) -> PathBuf {
        let base = self.inner.writer.lock().await.base;
        self.inner.segment_path(base)
    }

    /// Base offsets of the retained segments, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `LogError::Io` if the directory cannot be listed.
    pub async fn segments(&self) -> Result<Vec<u64>, LogError> {
        self.inner.segments().await
    }

    /// Offset one past the last byte written.
    ///
    /// # Errors
    ///
    /// Returns `LogError::Io` if the active segment cannot be inspected.
    pub async fn end_offset(&self) -> Result<u64, LogError> {
        let active = self.inner.writer.lock().await;
        Ok(active.base + active.file.metadata().await?.len())
    }

    /// Delete closed segments that every group has committed past.
    ///
    /// Groups are known by their offset files; an unreadable offset file
    /// holds back everything. With no groups at all nothing is removed.
    /// Returns the number of segments deleted.
    ///
    /// # Errors
    ///
    /// Returns `LogError::Io` if the directory cannot be listed or a segment
    /// cannot be removed.
    pub async fn enforce_retention(&self) -> Result<usize, LogError> {
        let Some(floor) = self.committed_offsets().await?.into_iter().min() else {
            return Ok(0);
        };

        let bases = self.segments().await?;
        let mut removed = 0;
        for (base, next) in bases.iter().zip(bases.iter().skip(1)) {
            if *next > floor {
                break;
            }
            match fs::remove_file(self.inner.segment_path(*base)).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if removed > 0 {
            tracing::info!(topic = %self.inner.topic, removed, floor, "Log segments removed");
        }
        Ok(removed)
    }

    async fn committed_offsets(&self) -> Result<Vec<u64>, LogError> {
        let prefix = format!("{}.", self.inner.topic);
        let mut entries = fs::read_dir(&self.inner.dir).await?;
        let mut offsets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !(name.starts_with(&prefix) && name.ends_with(".offset")) {
                continue;
            }
            match fs::read_to_string(entry.path()).await {
                Ok(raw) => offsets.push(raw.trim().parse().unwrap_or(0)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(offsets)
    }

    /// Open a cursor for consumer group `group`.
    ///
    /// A group subscribing for the first time has its start position
    /// committed immediately, so retention keeps its records. A committed
    /// offset that retention has already passed is moved up to the first
    /// retained record.
    ///
    /// # Errors
    ///
    /// Returns `LogError::CorruptOffset` if the stored offset is unreadable or
    /// lies beyond the end of the log, `LogError::Io` on file errors.
    pub async fn subscribe(
        &self,
        group: &str,
        reset: OffsetReset,
    ) -> Result<FileSubscription, LogError> {
        let offset_path = self.inner.offset_path(group);
        let committed = read_offset(&offset_path, group).await?;

        loop {
            let end = self.end_offset().await?;
            let bases = self.segments().await?;
            let first = bases.first().copied().unwrap_or(0);

            let position = match committed {
                Some(offset) if offset > end => {
                    return Err(LogError::CorruptOffset {
                        group: group.to_string(),
                        reason: format!("offset {offset} beyond end of log {end}"),
                    });
                }
                Some(offset) if offset < first => {
                    tracing::warn!(
                        group,
                        committed = offset,
                        first,
                        "Committed offset already removed; resuming at first retained record"
                    );
                    first
                }
                Some(offset) => offset,
                None => match reset {
                    OffsetReset::Earliest => first,
                    OffsetReset::Latest => end,
                },
            };

            let base = bases
                .iter()
                .rev()
                .find(|&&b| b <= position)
                .copied()
                .unwrap_or(first);
            let file = match File::open(self.inner.segment_path(base)).await {
                Ok(file) => file,
                // Removed by retention since the listing.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let mut reader = BufReader::new(file);
            reader
                .seek(std::io::SeekFrom::Start(position - base))
                .await?;

            if committed.is_none() {
                write_offset(&offset_path, position).await?;
            }

            tracing::info!(group, position, ?reset, "Consumer group subscribed");

            return Ok(FileSubscription {
                group: group.to_string(),
                log: Arc::clone(&self.inner),
                offset_path,
                reader,
                segment_base: base,
                position,
                in_sync: true,
            });
        }
    }
}

fn segment_file(dir: &Path, topic: &str, base: u64) -> PathBuf {
    dir.join(format!("{topic}.{base:020}.jsonl"))
}

async fn open_append(path: &Path) -> Result<File, LogError> {
    Ok(OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?)
}

async fn list_segments(dir: &Path, topic: &str) -> Result<Vec<u64>, LogError> {
    let prefix = format!("{topic}.");
    let mut entries = fs::read_dir(dir).await?;
    let mut bases = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let base = name
            .to_str()
            .and_then(|n| n.strip_prefix(&prefix))
            .and_then(|n| n.strip_suffix(".jsonl"))
            .filter(|digits| digits.len() == 20 && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u64>().ok());
        if let Some(base) = base {
            bases.push(base);
        }
    }
    bases.sort_unstable();
    Ok(bases)
}

async fn read_offset(path: &Path, group: &str) -> Result<Option<u64>, LogError> {
    match fs::read_to_string(path).await {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| LogError::CorruptOffset {
                group: group.to_string(),
                reason: e.to_string(),
            }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_offset(path: &Path, offset: u64) -> Result<(), LogError> {
    let tmp = path.with_extension("offset.tmp");
    fs::write(&tmp, offset.to_string()).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl TickPublisher for FileMessageLog {
    async fn publish(&self, tick: &Tick) -> Result<(), LogError> {
        let mut line = tick.to_json()?;
        line.push('\n');
        let rolled = {
            let mut active = self.inner.writer.lock().await;
            let rolled = self.inner.roll_if_full(&mut active).await?;
            active.file.write_all(line.as_bytes()).await?;
            active.file.flush().await?;
            active.file.sync_data().await?;
            rolled
        };
        self.inner.appended.notify_waiters();

        if rolled {
            if let Err(e) = self.enforce_retention().await {
                tracing::warn!(topic = %self.inner.topic, error = %e, "Log retention failed");
            }
        }
        Ok(())
    }
}

/// One consumer group's cursor over a `FileMessageLog`.
#[derive(Debug)]
pub struct FileSubscription {
    group: String,
    log: Arc<LogInner>,
    offset_path: PathBuf,
    reader: BufReader<File>,
    segment_base: u64,
    position: u64,
    in_sync: bool,
}

impl FileSubscription {
    /// Offset of the next record to read.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Read one complete line at the current position, if available.
    async fn try_read(&mut self) -> Result<Option<LogRecord>, LogError> {
        let mut sealed = false;
        loop {
            if !self.in_sync {
                self.reader
                    .seek(std::io::SeekFrom::Start(self.position - self.segment_base))
                    .await?;
                self.in_sync = true;
            }

            let mut buf = Vec::new();
            self.in_sync = false;
            let read = self.reader.read_until(b'\n', &mut buf).await?;

            if read == 0 || buf.last() != Some(&b'\n') {
                // Nothing new, or a partially written line.
                let Some(next) = self.successor().await? else {
                    return Ok(None);
                };
                if self.position < next && !sealed {
                    // The segment may have been closed after this read began.
                    sealed = true;
                    continue;
                }
                if self.position < next {
                    tracing::warn!(
                        group = %self.group,
                        skipped = next - self.position,
                        "Skipping torn tail of closed log segment"
                    );
                }
                self.enter_segment(next).await?;
                sealed = false;
                continue;
            }

            let offset = self.position;
            self.position += read as u64;
            self.in_sync = true;

            let payload = String::from_utf8_lossy(&buf).trim_end().to_string();
            if payload.is_empty() {
                continue;
            }
            return Ok(Some(LogRecord {
                offset,
                next_offset: self.position,
                payload,
            }));
        }
    }

    /// Base of the segment after the one being read, if it has been closed.
    async fn successor(&self) -> Result<Option<u64>, LogError> {
        let bases = self.log.segments().await?;
        Ok(bases.into_iter().find(|&b| b > self.segment_base))
    }

    async fn enter_segment(&mut self, base: u64) -> Result<(), LogError> {
        let file = File::open(self.log.segment_path(base)).await?;
        self.reader = BufReader::new(file);
        self.segment_base = base;
        self.position = base;
        self.in_sync = true;
        tracing::debug!(group = %self.group, base, "Consumer entered next log segment");
        Ok(())
    }
}

#[async_trait]
impl TickSubscription for FileSubscription {
    fn group(&self) -> &str {
        &self.group
    }

    async fn next(&mut self) -> Result<LogRecord, LogError> {
        let log = Arc::clone(&self.log);
        loop {
            let appended = log.appended.notified();
            if let Some(record) = self.try_read().await? {
                return Ok(record);
            }
            tokio::select! {
                () = appended => {}
                () = tokio::time::sleep(log.poll_interval) => {}
            }
        }
    }

    async fn commit(&mut self, next_offset: u64) -> Result<(), LogError> {
        write_offset(&self.offset_path, next_offset).await?;
        tracing::trace!(group = %self.group, next_offset, "Offset committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const WAIT: Duration = Duration::from_millis(300);

    fn tick(symbol: &str, price: f64) -> Tick {
        Tick::new(symbol, price, 1000, 1_700_000_000.25)
    }

    async fn open_log(dir: &tempfile::TempDir) -> FileMessageLog {
        FileMessageLog::open(dir.path(), "market_ticks", Duration::from_millis(10))
            .await
            .unwrap()
    }

    /// Every record after the first lands in a new segment.
    async fn open_tiny_segments(dir: &tempfile::TempDir) -> FileMessageLog {
        FileMessageLog::open_with(dir.path(), "market_ticks", Duration::from_millis(10), 1)
            .await
            .unwrap()
    }

    async fn drain(sub: &mut FileSubscription, count: usize) -> Vec<LogRecord> {
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(tokio::time::timeout(WAIT, sub.next()).await.unwrap().unwrap());
        }
        records
    }

    #[tokio::test]
    async fn groups_read_independently() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        log.publish(&tick("AAPL", 190.0)).await.unwrap();
        log.publish(&tick("MSFT", 420.0)).await.unwrap();

        let mut storage = log.subscribe("db-writer-group", OffsetReset::Earliest).await.unwrap();
        let mut cache = log.subscribe("backend-tick-group", OffsetReset::Earliest).await.unwrap();

        let first = storage.next().await.unwrap();
        storage.commit(first.next_offset).await.unwrap();
        let second = storage.next().await.unwrap();
        assert_eq!(first.decode().unwrap().symbol, "AAPL");
        assert_eq!(second.decode().unwrap().symbol, "MSFT");

        // The other group still starts at the beginning.
        let other = cache.next().await.unwrap();
        assert_eq!(other.offset, 0);
        assert_eq!(other.decode().unwrap().symbol, "AAPL");
    }

    #[tokio::test]
    async fn uncommitted_records_are_redelivered() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        for price in [190.0, 190.1, 190.2] {
            log.publish(&tick("AAPL", price)).await.unwrap();
        }

        let mut sub = log.subscribe("db-writer-group", OffsetReset::Earliest).await.unwrap();
        let first = sub.next().await.unwrap();
        sub.commit(first.next_offset).await.unwrap();
        let _unacked = sub.next().await.unwrap();
        drop(sub);

        let mut resumed = log.subscribe("db-writer-group", OffsetReset::Earliest).await.unwrap();
        assert_eq!(resumed.position(), first.next_offset);
        let again = resumed.next().await.unwrap();
        assert!((again.decode().unwrap().price - 190.1).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn latest_skips_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        log.publish(&tick("AAPL", 190.0)).await.unwrap();

        let mut sub = log.subscribe("backend-tick-group", OffsetReset::Latest).await.unwrap();
        log.publish(&tick("AAPL", 191.0)).await.unwrap();

        let record = tokio::time::timeout(WAIT, sub.next()).await.unwrap().unwrap();
        assert!((record.decode().unwrap().price - 191.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn first_subscribe_pins_start_position() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        log.publish(&tick("AAPL", 190.0)).await.unwrap();
        let end = log.end_offset().await.unwrap();

        let sub = log.subscribe("backend-tick-group", OffsetReset::Latest).await.unwrap();
        drop(sub);

        let stored =
            std::fs::read_to_string(dir.path().join("market_ticks.backend-tick-group.offset"))
                .unwrap();
        assert_eq!(stored, end.to_string());
    }

    #[tokio::test]
    async fn waiting_consumer_wakes_on_publish() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        let mut sub = log.subscribe("backend-tick-group", OffsetReset::Earliest).await.unwrap();

        let waiter = tokio::spawn(async move { sub.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        log.publish(&tick("GOOG", 175.0)).await.unwrap();

        let record = tokio::time::timeout(WAIT, waiter).await.unwrap().unwrap().unwrap();
        assert_eq!(record.decode().unwrap().symbol, "GOOG");
    }

    #[tokio::test]
    async fn clones_share_append_wakeups() {
        let dir = tempfile::tempdir().unwrap();
        // Polling alone would take far longer than the test waits.
        let log = FileMessageLog::open(dir.path(), "market_ticks", Duration::from_secs(30))
            .await
            .unwrap();
        let consumer_side = log.clone();
        let producer_side = log.clone();
        drop(log);

        let mut sub = consumer_side
            .subscribe("backend-tick-group", OffsetReset::Latest)
            .await
            .unwrap();
        let waiter = tokio::spawn(async move { sub.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer_side.publish(&tick("NVDA", 880.0)).await.unwrap();

        let record = tokio::time::timeout(WAIT, waiter).await.unwrap().unwrap().unwrap();
        assert_eq!(record.decode().unwrap().symbol, "NVDA");
    }

    #[tokio::test]
    async fn partial_line_is_not_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        let active = log.active_segment().await;
        let mut raw = std::fs::OpenOptions::new().append(true).open(active).unwrap();
        raw.write_all(br#"{"symbol":"AAPL","price":190.0,"#).unwrap();
        raw.flush().unwrap();

        let mut sub = log.subscribe("db-writer-group", OffsetReset::Earliest).await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(50), sub.next()).await.is_err());

        raw.write_all(b"\"volume\":5,\"timestamp\":1.0}\n").unwrap();
        raw.flush().unwrap();

        let record = tokio::time::timeout(WAIT, sub.next()).await.unwrap().unwrap();
        assert_eq!(record.offset, 0);
        assert_eq!(record.decode().unwrap().volume, 5);
    }

    #[tokio::test]
    async fn malformed_lines_surface_as_records() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        let active = log.active_segment().await;
        let mut raw = std::fs::OpenOptions::new().append(true).open(active).unwrap();
        raw.write_all(b"not json\n\n").unwrap();
        log.publish(&tick("AAPL", 190.0)).await.unwrap();

        let mut sub = log.subscribe("db-writer-group", OffsetReset::Earliest).await.unwrap();
        let bad = sub.next().await.unwrap();
        assert_eq!(bad.payload, "not json");
        assert!(bad.decode().is_err());

        // The blank line is skipped.
        let good = sub.next().await.unwrap();
        assert_eq!(good.decode().unwrap().symbol, "AAPL");
    }

    #[tokio::test]
    async fn corrupt_offset_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        std::fs::write(dir.path().join("market_ticks.db-writer-group.offset"), "abc").unwrap();

        let err = log
            .subscribe("db-writer-group", OffsetReset::Earliest)
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::CorruptOffset { .. }));
    }

    #[tokio::test]
    async fn records_are_read_across_segments() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_tiny_segments(&dir).await;
        for symbol in ["AAPL", "MSFT", "GOOG"] {
            log.publish(&tick(symbol, 100.0)).await.unwrap();
        }
        assert_eq!(log.segments().await.unwrap().len(), 3);

        let mut sub = log.subscribe("db-writer-group", OffsetReset::Earliest).await.unwrap();
        let records = drain(&mut sub, 3).await;
        let symbols: Vec<_> = records.iter().map(|r| r.decode().unwrap().symbol).collect();
        assert_eq!(symbols, ["AAPL", "MSFT", "GOOG"]);
        assert_eq!(records[1].offset, records[0].next_offset);
        assert_eq!(records[2].offset, records[1].next_offset);
        assert_eq!(records[2].next_offset, log.end_offset().await.unwrap());

        // A consumer waiting at the end follows the writer into a new segment.
        let waiter = tokio::spawn(async move { sub.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        log.publish(&tick("AMZN", 180.0)).await.unwrap();
        let record = tokio::time::timeout(WAIT, waiter).await.unwrap().unwrap().unwrap();
        assert_eq!(record.decode().unwrap().symbol, "AMZN");
    }

    #[tokio::test]
    async fn resume_position_inside_later_segment() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_tiny_segments(&dir).await;
        for price in [190.0, 190.1, 190.2] {
            log.publish(&tick("AAPL", price)).await.unwrap();
        }

        let mut sub = log.subscribe("db-writer-group", OffsetReset::Earliest).await.unwrap();
        let records = drain(&mut sub, 2).await;
        sub.commit(records[1].next_offset).await.unwrap();
        drop(sub);

        let mut resumed = log.subscribe("db-writer-group", OffsetReset::Earliest).await.unwrap();
        let third = resumed.next().await.unwrap();
        assert_eq!(third.offset, records[1].next_offset);
        assert!((third.decode().unwrap().price - 190.2).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn retention_waits_for_every_group() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_tiny_segments(&dir).await;
        for symbol in ["AAPL", "MSFT", "GOOG"] {
            log.publish(&tick(symbol, 100.0)).await.unwrap();
        }

        let mut fast = log.subscribe("backend-tick-group", OffsetReset::Earliest).await.unwrap();
        let mut slow = log.subscribe("db-writer-group", OffsetReset::Earliest).await.unwrap();

        let fast_records = drain(&mut fast, 3).await;
        fast.commit(fast_records[2].next_offset).await.unwrap();
        assert_eq!(log.enforce_retention().await.unwrap(), 0);
        assert_eq!(log.segments().await.unwrap().len(), 3);

        let first = slow.next().await.unwrap();
        slow.commit(first.next_offset).await.unwrap();
        assert_eq!(log.enforce_retention().await.unwrap(), 1);
        assert_eq!(log.segments().await.unwrap(), [first.next_offset, fast_records[2].offset]);

        // The slow group keeps reading where it left off.
        let second = slow.next().await.unwrap();
        assert_eq!(second.decode().unwrap().symbol, "MSFT");

        // A new group starts at the first retained record.
        let mut late = log.subscribe("audit-group", OffsetReset::Earliest).await.unwrap();
        assert_eq!(late.next().await.unwrap().decode().unwrap().symbol, "MSFT");
    }

    #[tokio::test]
    async fn retention_keeps_active_segment() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_log(&dir).await;
        log.publish(&tick("AAPL", 190.0)).await.unwrap();

        let mut sub = log.subscribe("db-writer-group", OffsetReset::Earliest).await.unwrap();
        let record = sub.next().await.unwrap();
        sub.commit(record.next_offset).await.unwrap();

        assert_eq!(log.enforce_retention().await.unwrap(), 0);
        assert_eq!(log.segments().await.unwrap(), [0]);
    }

    #[tokio::test]
    async fn retention_runs_when_writer_rolls() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_tiny_segments(&dir).await;
        log.publish(&tick("AAPL", 190.0)).await.unwrap();

        let mut sub = log.subscribe("db-writer-group", OffsetReset::Earliest).await.unwrap();
        let record = sub.next().await.unwrap();
        sub.commit(record.next_offset).await.unwrap();

        // Rolling closes the consumed segment, which is then removed.
        log.publish(&tick("MSFT", 420.0)).await.unwrap();
        assert_eq!(log.segments().await.unwrap(), [record.next_offset]);
    }

    #[tokio::test]
    async fn offset_behind_retention_resumes_at_first_segment() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_tiny_segments(&dir).await;
        for symbol in ["AAPL", "MSFT"] {
            log.publish(&tick(symbol, 100.0)).await.unwrap();
        }
        let mut sub = log.subscribe("db-writer-group", OffsetReset::Earliest).await.unwrap();
        let first = sub.next().await.unwrap();
        sub.commit(first.next_offset).await.unwrap();
        assert_eq!(log.enforce_retention().await.unwrap(), 1);

        std::fs::write(dir.path().join("market_ticks.backend-tick-group.offset"), "0").unwrap();
        let mut behind = log.subscribe("backend-tick-group", OffsetReset::Earliest).await.unwrap();
        assert_eq!(behind.position(), first.next_offset);
        assert_eq!(behind.next().await.unwrap().decode().unwrap().symbol, "MSFT");
    }

    #[tokio::test]
    async fn reopen_appends_to_newest_segment() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = open_tiny_segments(&dir).await;
            for symbol in ["AAPL", "MSFT"] {
                log.publish(&tick(symbol, 100.0)).await.unwrap();
            }
        }

        let log = FileMessageLog::open(dir.path(), "market_ticks", Duration::from_millis(10))
            .await
            .unwrap();
        let before = log.end_offset().await.unwrap();
        log.publish(&tick("GOOG", 175.0)).await.unwrap();
        assert_eq!(log.segments().await.unwrap().len(), 2);

        let mut sub = log.subscribe("db-writer-group", OffsetReset::Earliest).await.unwrap();
        let records = drain(&mut sub, 3).await;
        assert_eq!(records[2].offset, before);
        assert_eq!(records[2].decode().unwrap().symbol, "GOOG");
    }

    #[tokio::test]
    async fn torn_tail_of_closed_segment_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = open_tiny_segments(&dir).await;
        let torn = br#"{"symbol":"AAPL","pri"#;
        let mut raw = std::fs::OpenOptions::new()
            .append(true)
            .open(log.active_segment().await)
            .unwrap();
        raw.write_all(torn).unwrap();
        raw.flush().unwrap();

        // The non-empty segment is closed before this append.
        log.publish(&tick("MSFT", 420.0)).await.unwrap();

        let mut sub = log.subscribe("db-writer-group", OffsetReset::Earliest).await.unwrap();
        let record = tokio::time::timeout(WAIT, sub.next()).await.unwrap().unwrap();
        assert_eq!(record.offset, torn.len() as u64);
        assert_eq!(record.decode().unwrap().symbol, "MSFT");
    }
}

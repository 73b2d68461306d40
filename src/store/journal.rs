//! Append-only JSON-lines journal backing a durable store.
//!
//! Each line is one committed write:
//!
//! ```text
//! {"op":"set","key":"counter","value":0}
//! {"op":"set","key":"counter","value":1}
//! {"op":"delete","key":"scratch"}
//! ```
//!
//! Replay applies lines in order. An undecodable final line without a
//! trailing newline is a torn write from a crash and is cut off; an
//! undecodable line anywhere else is corruption.
//!
//! Records are encoded into an in-memory buffer and written to the file in
//! whole lines when the durability mode asks for a sync. If a write or fsync
//! fails, the file is truncated back to the last synced length so it never
//! holds a partial line or a record the caller was told had failed. If even
//! the truncation fails, the journal refuses further writes.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::durability::DurabilityMode;
use super::error::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub(crate) enum JournalRecord {
    Set { key: String, value: Value },
    Delete { key: String },
}

/// Byte sink a journal appends to.
pub(crate) trait JournalSink: Write {
    fn sync_data(&mut self) -> io::Result<()>;

    /// Cut the sink back to `len` bytes and make that durable.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl JournalSink for File {
    fn sync_data(&mut self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        File::sync_data(self)
    }
}

pub(crate) struct Journal<S: JournalSink = File> {
    path: PathBuf,
    sink: S,
    mode: DurabilityMode,
    /// Encoded records not yet written to the sink
    buffer: Vec<u8>,
    /// Number of records in `buffer`
    buffered: usize,
    /// Sink length after the last successful sync
    synced_len: u64,
    last_sync: Instant,
    /// Set when a failed write could not be rolled back
    poisoned: bool,
}

struct Replay {
    records: Vec<JournalRecord>,
    valid_len: u64,
    needs_newline: bool,
}

fn replay(bytes: &[u8]) -> Result<Replay, StoreError> {
    let mut records = Vec::new();
    let mut offset = 0usize;
    let mut line_no = 0usize;
    let mut needs_newline = false;

    while offset < bytes.len() {
        line_no += 1;
        let rest = &bytes[offset..];
        let (line, consumed, terminated) = match rest.iter().position(|&b| b == b'\n') {
            Some(i) => (&rest[..i], i + 1, true),
            None => (rest, rest.len(), false),
        };

        if line.iter().all(u8::is_ascii_whitespace) {
            offset += consumed;
            continue;
        }

        match (serde_json::from_slice::<JournalRecord>(line), terminated) {
            (Ok(record), _) => {
                records.push(record);
                offset += consumed;
                needs_newline = !terminated;
            }
            (Err(err), false) => {
                warn!(
                    line = line_no,
                    dropped_bytes = line.len(),
                    error = %err,
                    "Torn journal tail - discarding partial write"
                );
                break;
            }
            (Err(err), true) => {
                return Err(StoreError::CorruptJournal {
                    line: line_no,
                    reason: err.to_string(),
                });
            }
        }
    }

    Ok(Replay {
        records,
        valid_len: offset as u64,
        needs_newline,
    })
}

impl Journal<File> {
    /// Open (creating if needed) the journal at `path` and return the records
    /// to replay.
    pub(crate) fn open(
        path: &Path,
        mode: DurabilityMode,
    ) -> Result<(Self, Vec<JournalRecord>), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        let replay = replay(&contents)?;

        if replay.valid_len < contents.len() as u64 {
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }

        let mut synced_len = replay.valid_len;
        if replay.needs_newline {
            file.write_all(b"\n")?;
            file.sync_data()?;
            synced_len += 1;
        }

        info!(
            path = %path.display(),
            records = replay.records.len(),
            mode = mode.description(),
            "Journal opened"
        );

        Ok((
            Self {
                path: path.to_path_buf(),
                sink: file,
                mode,
                buffer: Vec::new(),
                buffered: 0,
                synced_len,
                last_sync: Instant::now(),
                poisoned: false,
            },
            replay.records,
        ))
    }

    /// Replace the journal with one `set` line per live entry.
    ///
    /// Writes a sibling file, fsyncs it and renames it over the journal, so a
    /// crash mid-compaction leaves the old journal intact.
    pub(crate) fn rewrite<'a, I>(&mut self, entries: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        self.sync()?;

        let tmp_path = compaction_path(&self.path);
        let written = match write_snapshot(&tmp_path, entries) {
            Ok(written) => written,
            Err(err) => {
                if let Err(e) = fs::remove_file(&tmp_path) {
                    debug!(path = %tmp_path.display(), error = %e, "No compaction file to remove");
                }
                return Err(err);
            }
        };
        fs::rename(&tmp_path, &self.path)?;
        sync_parent_dir(&self.path)?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.synced_len = file.metadata()?.len();
        self.sink = file;
        self.last_sync = Instant::now();

        info!(path = %self.path.display(), records = written, "Journal compacted");
        Ok(written)
    }
}

impl<S: JournalSink> Journal<S> {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, syncing if the durability mode calls for it.
    ///
    /// On `Err` the record is not in the journal.
    pub(crate) fn append(&mut self, record: &JournalRecord) -> Result<(), StoreError> {
        if self.poisoned {
            return Err(StoreError::Closed);
        }

        let mark = self.buffer.len();
        if let Err(err) = serde_json::to_writer(&mut self.buffer, record) {
            self.buffer.truncate(mark);
            return Err(err.into());
        }
        self.buffer.push(b'\n');
        self.buffered += 1;

        if self.mode.should_sync(self.buffered, self.last_sync.elapsed()) {
            if let Err(err) = self.write_buffer() {
                // Records buffered earlier were already acknowledged and stay
                // queued for the next sync; this one was not.
                self.buffer.truncate(mark);
                self.buffered -= 1;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Write buffered records and fsync.
    pub(crate) fn sync(&mut self) -> Result<(), StoreError> {
        if self.poisoned {
            return Err(StoreError::Closed);
        }
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.write_buffer()
    }

    fn write_buffer(&mut self) -> Result<(), StoreError> {
        match write_synced(&mut self.sink, &self.buffer) {
            Ok(()) => {
                self.synced_len += self.buffer.len() as u64;
                debug!(path = %self.path.display(), records = self.buffered, "Journal synced");
                self.buffer.clear();
                self.buffered = 0;
                self.last_sync = Instant::now();
                Ok(())
            }
            Err(err) => {
                self.roll_back(&err);
                Err(err.into())
            }
        }
    }

    fn roll_back(&mut self, cause: &io::Error) {
        match self.sink.truncate(self.synced_len) {
            Ok(()) => warn!(
                path = %self.path.display(),
                synced_len = self.synced_len,
                error = %cause,
                "Journal write failed - rolled back to last synced length"
            ),
            Err(err) => {
                self.poisoned = true;
                error!(
                    path = %self.path.display(),
                    error = %cause,
                    truncate_error = %err,
                    "Journal write failed and could not be rolled back - refusing further writes"
                );
            }
        }
    }
}

fn write_synced<S: JournalSink>(sink: &mut S, bytes: &[u8]) -> io::Result<()> {
    sink.write_all(bytes)?;
    sink.flush()?;
    sink.sync_data()
}

fn write_snapshot<'a, I>(path: &Path, entries: I) -> Result<usize, StoreError>
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut written = 0usize;
    let mut tmp = BufWriter::new(File::create(path)?);
    for (key, value) in entries {
        serde_json::to_writer(
            &mut tmp,
            &JournalRecord::Set {
                key: key.to_string(),
                value: value.clone(),
            },
        )?;
        tmp.write_all(b"\n")?;
        written += 1;
    }
    tmp.flush()?;
    tmp.get_ref().sync_all()?;
    Ok(written)
}

/// Sibling path the compacted journal is written to before the rename.
fn compaction_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".compact.tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

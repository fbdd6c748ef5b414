// src/ingest/sink.rs
//! Append-only persistence for ingested records.
//!
//! [`CsvStore`] writes one CSV file with a fixed header. Each batch is appended
//! with a single write followed by fsync. Before the write, the committed file
//! length is recorded in a `<file>.pending` marker; the marker is removed once
//! the batch is durable. A marker found on open means the previous process died
//! mid-append, and the file is truncated back to the recorded length.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{error, warn};

use crate::ingest::types::IngestedRecord;

pub const COLUMNS: [&str; 7] = [
    "id",
    "timestamp",
    "content",
    "likes",
    "shares",
    "comments",
    "comments_text",
];

/// Durable destination for ingested records.
pub trait RecordSink: Send {
    /// Every identifier that is durably stored. Empty if nothing was written yet.
    fn load_existing_ids(&self) -> Result<HashSet<String>>;

    /// Append the whole batch or nothing. On `Err` none of the batch's
    /// identifiers may be visible to a later `load_existing_ids`.
    fn append(&mut self, records: &[IngestedRecord]) -> Result<()>;
}

/// On-disk row. `comments_text` is a JSON array kept in one field.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    id: String,
    timestamp: f64,
    content: String,
    likes: i64,
    shares: i64,
    comments: i64,
    comments_text: String,
}

impl CsvRow {
    fn from_record(r: &IngestedRecord) -> Result<Self> {
        Ok(Self {
            id: r.id.clone(),
            timestamp: r.timestamp,
            content: r.content.clone(),
            likes: r.likes,
            shares: r.shares,
            comments: r.comments,
            comments_text: serde_json::to_string(&r.comments_text)
                .context("encoding comments_text")?,
        })
    }

    fn into_record(self) -> Result<IngestedRecord> {
        let comments_text = serde_json::from_str(&self.comments_text)
            .with_context(|| format!("decoding comments_text of {}", self.id))?;
        Ok(IngestedRecord {
            id: self.id,
            timestamp: self.timestamp,
            content: self.content,
            likes: self.likes,
            shares: self.shares,
            comments: self.comments,
            comments_text,
        })
    }
}

#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
    marker: PathBuf,
}

impl CsvStore {
    /// Open (or prepare to create) the store at `path`, repairing an
    /// interrupted append and checking the header of an existing file.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let store = Self {
            marker: pending_marker_path(&path),
            path,
        };
        store.recover()?;
        store.check_header()?;
        Ok(store)
    }

    /// Read back every stored record, in file order.
    pub fn read_all(&self) -> Result<Vec<IngestedRecord>> {
        if self.committed_len()? == 0 {
            return Ok(Vec::new());
        }
        let mut rdr = csv::Reader::from_path(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let mut out = Vec::new();
        for row in rdr.deserialize::<CsvRow>() {
            let row = row.with_context(|| format!("reading {}", self.path.display()))?;
            out.push(row.into_record()?);
        }
        Ok(out)
    }

    fn recover(&self) -> Result<()> {
        let raw = match fs::read_to_string(&self.marker) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.marker.display()))
            }
        };
        let committed: u64 = raw
            .trim()
            .parse()
            .with_context(|| format!("parsing {}", self.marker.display()))?;

        let current = self.committed_len()?;
        if current > committed {
            truncate(&self.path, committed)
                .with_context(|| format!("truncating {}", self.path.display()))?;
            warn!(
                path = %self.path.display(),
                dropped_bytes = current - committed,
                "discarded partially written batch from interrupted run"
            );
        }
        fs::remove_file(&self.marker)
            .with_context(|| format!("removing {}", self.marker.display()))?;
        Ok(())
    }

    fn check_header(&self) -> Result<()> {
        if self.committed_len()? == 0 {
            return Ok(());
        }
        let mut rdr = csv::Reader::from_path(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let headers = rdr.headers().context("reading csv header")?;
        if !headers.iter().eq(COLUMNS.iter().copied()) {
            bail!(
                "{} has columns {:?}, expected {:?}",
                self.path.display(),
                headers.iter().collect::<Vec<_>>(),
                COLUMNS
            );
        }
        Ok(())
    }

    fn committed_len(&self) -> Result<u64> {
        match fs::metadata(&self.path) {
            Ok(m) => Ok(m.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e).with_context(|| format!("stat {}", self.path.display())),
        }
    }

    fn ends_with_newline(&self) -> Result<bool> {
        let mut f = fs::File::open(&self.path)?;
        f.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        f.read_exact(&mut last)?;
        Ok(last[0] == b'\n')
    }

    fn write_marker(&self, committed: u64) -> Result<()> {
        let dir = self.marker.parent().unwrap_or(Path::new("."));
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(committed.to_string().as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.marker).map_err(|e| e.error)?;
        Ok(())
    }

    fn write_batch(&self, bytes: &[u8]) -> io::Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        f.write_all(bytes)?;
        f.sync_data()
    }

    /// Body of `append`; `write` puts the encoded batch on disk.
    fn append_with<W>(&self, records: &[IngestedRecord], write: W) -> Result<()>
    where
        W: FnOnce(&Self, &[u8]) -> io::Result<()>,
    {
        if records.is_empty() {
            return Ok(());
        }
        let committed = self.committed_len()?;

        let mut buf = Vec::new();
        if committed > 0 && !self.ends_with_newline()? {
            buf.push(b'\n');
        }
        buf.extend(encode_rows(records, committed == 0)?);

        self.write_marker(committed)
            .with_context(|| format!("writing {}", self.marker.display()))?;

        if let Err(e) = write(self, &buf) {
            self.rollback(committed);
            return Err(e).with_context(|| format!("appending to {}", self.path.display()));
        }
        if let Err(e) = fs::remove_file(&self.marker) {
            self.rollback(committed);
            return Err(e).with_context(|| format!("removing {}", self.marker.display()));
        }
        Ok(())
    }

    /// Undo a failed append. If truncation fails the marker stays, so the next
    /// open repairs the file instead.
    fn rollback(&self, committed: u64) {
        match truncate(&self.path, committed) {
            Ok(()) => {
                if let Err(e) = fs::remove_file(&self.marker) {
                    warn!(error = ?e, marker = %self.marker.display(), "could not remove pending marker");
                }
            }
            Err(e) => {
                error!(error = ?e, path = %self.path.display(), "rollback truncate failed; will repair on next start");
            }
        }
    }
}

impl RecordSink for CsvStore {
    fn load_existing_ids(&self) -> Result<HashSet<String>> {
        let mut ids = HashSet::new();
        if self.committed_len()? == 0 {
            return Ok(ids);
        }
        let mut rdr = csv::Reader::from_path(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let id_col = rdr
            .headers()
            .context("reading csv header")?
            .iter()
            .position(|h| h == "id")
            .ok_or_else(|| anyhow!("{} has no id column", self.path.display()))?;
        for rec in rdr.records() {
            let rec = rec.with_context(|| format!("reading {}", self.path.display()))?;
            if let Some(id) = rec.get(id_col) {
                ids.insert(id.to_string());
            }
        }
        Ok(ids)
    }

    fn append(&mut self, records: &[IngestedRecord]) -> Result<()> {
        self.append_with(records, Self::write_batch)
    }
}

fn encode_rows(records: &[IngestedRecord], with_header: bool) -> Result<Vec<u8>> {
    let mut w = csv::WriterBuilder::new()
        .has_headers(with_header)
        .from_writer(Vec::new());
    for r in records {
        w.serialize(CsvRow::from_record(r)?)
            .with_context(|| format!("encoding record {}", r.id))?;
    }
    w.into_inner()
        .map_err(|e| anyhow!("flushing csv buffer: {}", e.error()))
}

fn truncate(path: &Path, len: u64) -> io::Result<()> {
    let f = OpenOptions::new().write(true).open(path)?;
    f.set_len(len)?;
    f.sync_all()
}

fn pending_marker_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".pending");
    path.with_file_name(name)
}

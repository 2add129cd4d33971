//! Append-only archive files.
//!
//! One delimited file per `(symbol, source kind)`, laid out as
//! `<root>/<fs-safe symbol>/<file name>`. The file is the only record of
//! progress: the resume cursor is recomputed from its rows at the start of
//! every job, and rows are only ever appended.
//!
//! # Crash safety
//!
//! Each page is written with a single `write_all` followed by a flush. A
//! crash can still leave a partially written final row; such a row has no
//! trailing newline, is ignored when resuming, and is cut off the next time
//! the file is opened for append.

use chrono::NaiveDateTime;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ArchiveError;
use crate::models::{Cursor, Post, SourceKind};

/// How much of the file end to read when resuming from the last row.
pub const DEFAULT_TAIL_BYTES: u64 = 4096 * 64;

/// Encode a symbol into a filesystem-safe directory name.
pub fn fs_encode(symbol: &str) -> String {
    symbol.replace('.', "_").replace('/', "-")
}

/// Where the time-like cursor of a row lives.
#[derive(Debug, Clone)]
pub enum CursorColumn {
    /// Integer (or float) UTC epoch seconds in one field.
    Epoch { field: &'static str },
    /// Local `%Y-%m-%d` and `%H:%M:%S` fields, shifted into UTC by
    /// `utc_offset_secs`.
    LocalDateTime {
        date: &'static str,
        time: &'static str,
        utc_offset_secs: i64,
    },
}

/// How the resume cursor is recovered from an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeScan {
    /// Cursor of the last complete row within the final `bytes` of the file.
    Tail { bytes: u64 },
    /// Maximum cursor over every row in the file.
    Full,
}

/// Fixed field order, delimiter, and cursor rules for one source kind.
#[derive(Debug, Clone)]
pub struct ArchiveSchema {
    pub kind: SourceKind,
    pub file_name: String,
    pub fieldnames: &'static [&'static str],
    pub delimiter: char,
    pub cursor: CursorColumn,
    pub resume: ResumeScan,
}

impl ArchiveSchema {
    /// Cursor of a raw post, if its time-like fields are present and valid.
    pub fn post_cursor(&self, post: &Post) -> Option<Cursor> {
        match &self.cursor {
            CursorColumn::Epoch { field } => post.get(field).and_then(epoch_from_value),
            CursorColumn::LocalDateTime {
                date,
                time,
                utc_offset_secs,
            } => {
                let date = post.text(date)?;
                let time = post.text(time)?;
                local_to_cursor(date, time, *utc_offset_secs)
            }
        }
    }

    /// Cursor of a stored row.
    fn row_cursor(&self, cells: &[&str]) -> Option<Cursor> {
        match &self.cursor {
            CursorColumn::Epoch { field } => self.cell(cells, field).and_then(epoch_from_str),
            CursorColumn::LocalDateTime {
                date,
                time,
                utc_offset_secs,
            } => local_to_cursor(
                self.cell(cells, date)?,
                self.cell(cells, time)?,
                *utc_offset_secs,
            ),
        }
    }

    fn cell<'c>(&self, cells: &[&'c str], name: &str) -> Option<&'c str> {
        let i = self.fieldnames.iter().position(|f| *f == name)?;
        cells.get(i).map(|c| c.trim_matches('"'))
    }

    fn header(&self) -> String {
        let mut line = self
            .fieldnames
            .iter()
            .map(|f| quote_cell(f, self.delimiter))
            .collect::<Vec<_>>()
            .join(&self.delimiter.to_string());
        line.push('\n');
        line
    }

    /// Render a post as one row in schema order. Keys outside the schema
    /// are dropped; missing keys become empty cells.
    pub fn render_row(&self, post: &Post) -> String {
        let mut line = self
            .fieldnames
            .iter()
            .map(|f| {
                let raw = post.get(f).map(cell_text).unwrap_or_default();
                quote_cell(&raw, self.delimiter)
            })
            .collect::<Vec<_>>()
            .join(&self.delimiter.to_string());
        line.push('\n');
        line
    }
}

fn epoch_from_value(value: &Value) -> Option<Cursor> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Cursor),
        Value::String(s) => epoch_from_str(s),
        _ => None,
    }
}

fn epoch_from_str(s: &str) -> Option<Cursor> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        .map(Cursor)
}

fn local_to_cursor(date: &str, time: &str, utc_offset_secs: i64) -> Option<Cursor> {
    let stamp = format!("{} {}", date.trim(), time.trim());
    let local = NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M:%S").ok()?;
    Some(Cursor(local.and_utc().timestamp() + utc_offset_secs))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}

fn quote_cell(raw: &str, delimiter: char) -> String {
    if raw.contains(delimiter) || raw.contains('"') || raw.contains('\n') || raw.contains('\r') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// The archive file for one symbol and source kind.
#[derive(Debug, Clone)]
pub struct Archive {
    path: PathBuf,
    schema: Arc<ArchiveSchema>,
}

impl Archive {
    pub fn new(root: &Path, symbol: &str, schema: Arc<ArchiveSchema>) -> Self {
        let path = root.join(fs_encode(symbol)).join(&schema.file_name);
        Self { path, schema }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &ArchiveSchema {
        &self.schema
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Recover the resume cursor from the file. `None` when the file is
    /// missing or holds no complete data row.
    pub fn resume_cursor(&self) -> Result<Option<Cursor>, ArchiveError> {
        if !self.exists() {
            return Ok(None);
        }
        match self.schema.resume {
            ResumeScan::Tail { bytes } => self.tail_cursor(bytes),
            ResumeScan::Full => self.max_cursor(),
        }
    }

    fn tail_cursor(&self, bytes: u64) -> Result<Option<Cursor>, ArchiveError> {
        let (offset, tail) = read_tail(&self.path, bytes)?;
        // Only the first line can start mid-character, and it is never parsed.
        let tail = String::from_utf8_lossy(&tail);
        let rows = complete_rows(&tail);
        match rows.last() {
            Some(row) => self.parse_row_cursor(row).map(Some),
            // The last row is longer than the window.
            None if offset > 0 => self.max_cursor(),
            None => Ok(None),
        }
    }

    fn max_cursor(&self) -> Result<Option<Cursor>, ArchiveError> {
        let content = fs::read(&self.path).map_err(|e| ArchiveError::io(&self.path, e))?;
        let content = String::from_utf8_lossy(&content);
        let mut max: Option<Cursor> = None;
        for row in complete_rows(&content) {
            let cursor = self.parse_row_cursor(row)?;
            max = Some(max.map_or(cursor, |m| m.max(cursor)));
        }
        Ok(max)
    }

    fn parse_row_cursor(&self, row: &str) -> Result<Cursor, ArchiveError> {
        let cells: Vec<&str> = row.split(self.schema.delimiter).collect();
        self.schema
            .row_cursor(&cells)
            .ok_or_else(|| ArchiveError::MalformedCursor {
                path: self.path.clone(),
                value: row.chars().take(80).collect(),
            })
    }

    /// Number of complete data rows. Reads the whole file.
    pub fn row_count(&self) -> Result<usize, ArchiveError> {
        if !self.exists() {
            return Ok(0);
        }
        let content = fs::read(&self.path).map_err(|e| ArchiveError::io(&self.path, e))?;
        Ok(complete_rows(&String::from_utf8_lossy(&content)).len())
    }

    fn repair_window(&self) -> u64 {
        match self.schema.resume {
            ResumeScan::Tail { bytes } => bytes,
            ResumeScan::Full => DEFAULT_TAIL_BYTES,
        }
    }

    /// Open for appending, creating parent directories as needed and
    /// cutting off any partially written final row.
    pub fn open_for_append(&self) -> Result<ArchiveWriter, ArchiveError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
        }

        let existed = self.exists() && repair_partial_row(&self.path, self.repair_window())? > 0;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ArchiveError::io(&self.path, e))?;

        Ok(ArchiveWriter {
            file,
            path: self.path.clone(),
            schema: self.schema.clone(),
            is_new: !existed,
        })
    }
}

/// Handle for appending rows to one archive file.
pub struct ArchiveWriter {
    file: File,
    path: PathBuf,
    schema: Arc<ArchiveSchema>,
    is_new: bool,
}

impl ArchiveWriter {
    /// Whether the file was absent (or empty) when it was opened.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Write the header row if the file did not exist at open time.
    pub fn write_header_if_new(&mut self) -> Result<bool, ArchiveError> {
        if !self.is_new {
            return Ok(false);
        }
        let header = self.schema.header();
        self.write(header.as_bytes())?;
        self.is_new = false;
        Ok(true)
    }

    /// Append posts as rows, in the order given.
    pub fn append(&mut self, posts: &[Post]) -> Result<usize, ArchiveError> {
        if posts.is_empty() {
            return Ok(0);
        }
        let mut batch = String::new();
        for post in posts {
            batch.push_str(&self.schema.render_row(post));
        }
        self.write(batch.as_bytes())?;
        Ok(posts.len())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ArchiveError> {
        self.file
            .write_all(bytes)
            .and_then(|_| self.file.flush())
            .map_err(|e| ArchiveError::io(&self.path, e))
    }
}

/// Read at most `bytes` from the end of the file. Returns the offset the
/// read started at and the raw bytes read.
fn read_tail(path: &Path, bytes: u64) -> Result<(u64, Vec<u8>), ArchiveError> {
    let mut file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
    let size = file
        .metadata()
        .map_err(|e| ArchiveError::io(path, e))?
        .len();
    let offset = size.saturating_sub(bytes);
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| ArchiveError::io(path, e))?;
    let mut buf = Vec::with_capacity((size - offset) as usize);
    file.read_to_end(&mut buf)
        .map_err(|e| ArchiveError::io(path, e))?;
    Ok((offset, buf))
}

/// Complete, non-empty data rows of `text`.
///
/// The last line is dropped when it lacks a terminating newline. The first
/// line is always dropped: it is either the header or, when reading from
/// the middle of the file, possibly a fragment of an earlier row.
fn complete_rows(text: &str) -> Vec<&str> {
    let terminated = match text.rfind('\n') {
        Some(i) => &text[..i],
        None => return Vec::new(),
    };
    terminated
        .split('\n')
        .skip(1)
        .map(|r| r.trim_end_matches('\r'))
        .filter(|r| !r.trim().is_empty())
        .collect()
}

/// Length of the file up to and including its last newline, or `None`
/// when it already ends with one (or is empty).
fn terminated_len(path: &Path, window: u64) -> Result<Option<u64>, ArchiveError> {
    let (offset, tail) = read_tail(path, window)?;
    if tail.last().map_or(true, |&b| b == b'\n') {
        return Ok(None);
    }
    if let Some(i) = tail.iter().rposition(|&b| b == b'\n') {
        return Ok(Some(offset + i as u64 + 1));
    }
    if offset == 0 {
        return Ok(Some(0));
    }
    // The partial row is longer than the tail window.
    let content = fs::read(path).map_err(|e| ArchiveError::io(path, e))?;
    Ok(Some(
        content
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i as u64 + 1),
    ))
}

/// Truncate a trailing unterminated row. Returns the resulting file length.
fn repair_partial_row(path: &Path, window: u64) -> Result<u64, ArchiveError> {
    let size = fs::metadata(path)
        .map_err(|e| ArchiveError::io(path, e))?
        .len();
    let Some(keep) = terminated_len(path, window)? else {
        return Ok(size);
    };
    tracing::warn!(
        path = %path.display(),
        dropped_bytes = size - keep,
        "truncating partially written row"
    );
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| ArchiveError::io(path, e))?;
    file.set_len(keep).map_err(|e| ArchiveError::io(path, e))?;
    Ok(keep)
}

/// Run blocking archive work off the async worker threads.
pub async fn run_blocking<T, F>(work: F) -> Result<T, ArchiveError>
where
    F: FnOnce() -> Result<T, ArchiveError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ArchiveError::Task(e.to_string()))?
}

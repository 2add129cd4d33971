//! Core data models used throughout the collector.
//!
//! These types represent the symbols, jobs, and raw posts that flow through
//! the fetch-and-archive pipeline.

use serde_json::{Map, Value};
use std::fmt;

/// A tradable symbol loaded from the symbol table.
///
/// Identity is [`symbol`](SymbolRecord::symbol), case-sensitive and trimmed.
/// Columns beyond the three required ones are kept in `extra` untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRecord {
    pub symbol: String,
    pub short_name: String,
    pub long_name: String,
    pub extra: Vec<(String, String)>,
}

impl SymbolRecord {
    pub fn new(symbol: &str, short_name: &str, long_name: &str) -> Self {
        Self {
            symbol: symbol.trim().to_string(),
            short_name: short_name.to_string(),
            long_name: long_name.to_string(),
            extra: Vec::new(),
        }
    }
}

/// Kind of post collected from a source. Determines the field schema and
/// the archive filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Submission,
    Comment,
    Tweet,
}

impl SourceKind {
    /// Label used in request paths, file names, and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Submission => "submission",
            SourceKind::Comment => "comment",
            SourceKind::Tweet => "tweet",
        }
    }

    /// Free-text fields inspected by the cashtag collision filter.
    pub fn text_fields(&self) -> &'static [&'static str] {
        match self {
            SourceKind::Submission | SourceKind::Comment => &["title", "selftext", "body"],
            SourceKind::Tweet => &["tweet"],
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Resume position: UTC epoch seconds of the newest archived post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cursor(pub i64);

impl Cursor {
    pub const EPOCH: Cursor = Cursor(0);

    pub fn seconds(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work: fetch one source kind for one symbol until drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Name of the [`Source`](crate::traits::Source) serving this job.
    pub source: String,
    pub symbol: SymbolRecord,
    pub kind: SourceKind,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.symbol.symbol, self.kind)
    }
}

/// Raw post returned by a search client, before projection onto a schema.
///
/// Upstream APIs return far more keys than are archived; the projection at
/// write time drops anything not in the schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Post {
    pub fields: Map<String, Value>,
}

impl Post {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String value of a field, if present and a string.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

impl From<Map<String, Value>> for Post {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

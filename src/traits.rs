//! Extension points for post sources.
//!
//! A [`Source`] bundles everything the incremental fetcher needs to keep
//! one platform's archives current: which post kinds it serves, where their
//! archives live, how a symbol becomes a query, and how one page of
//! results is requested.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │        SourceRegistry        │
//! │  ┌─────────┐  ┌───────────┐  │
//! │  │ Reddit  │  │  Twitter  │  │
//! │  └─────────┘  └───────────┘  │
//! └──────────────┬───────────────┘
//!                ▼
//!      run_update() → worker pool → fetcher
//! ```

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::archive::Archive;
use crate::config::Config;
use crate::dictionary::WordLookup;
use crate::error::TransportFailure;
use crate::identity::Session;
use crate::models::{Cursor, Post, SourceKind, SymbolRecord};
use crate::query::QueryPlan;

/// One page request against a source's search endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub kind: SourceKind,
    pub query: String,
    /// Only posts strictly newer than this cursor are wanted.
    pub after: Cursor,
    pub page_size: usize,
}

/// A platform whose posts are archived per symbol.
#[async_trait]
pub trait Source: Send + Sync {
    /// Short name used on the command line and in logs (`"reddit"`).
    fn name(&self) -> &str;

    /// Post kinds fetched for every symbol, in job order.
    fn kinds(&self) -> &[SourceKind];

    /// Directory holding one subdirectory of archives per symbol.
    fn root(&self) -> &Path;

    /// The archive file for a symbol and kind.
    fn archive(&self, symbol: &str, kind: SourceKind) -> Archive;

    /// Cursor used when no archive exists yet.
    fn start_cursor(&self) -> Cursor;

    fn page_size(&self) -> usize;

    /// Separator used to OR query terms together.
    fn query_separator(&self) -> &str {
        "|"
    }

    /// Query plan for a symbol. `None` skips the job.
    fn plan(&self, symbol: &SymbolRecord, kind: SourceKind) -> Option<QueryPlan>;

    /// Fetch one page, sorted by ascending time.
    async fn search(
        &self,
        session: &Session,
        request: &PageRequest,
    ) -> Result<Vec<Post>, TransportFailure>;
}

/// Registry of configured sources.
pub struct SourceRegistry {
    sources: Vec<Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Registry holding the built-in Twitter and Reddit sources.
    pub fn from_config(config: &Config, words: Arc<dyn WordLookup>) -> anyhow::Result<Self> {
        use crate::connector_reddit::RedditSource;
        use crate::connector_twitter::TwitterSource;

        let mut registry = Self::new();
        registry.register(Arc::new(TwitterSource::from_config(&config.twitter)?));
        registry.register(Arc::new(RedditSource::from_config(
            &config.reddit,
            &config.query,
            words,
        )?));
        Ok(registry)
    }

    pub fn register(&mut self, source: Arc<dyn Source>) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[Arc<dyn Source>] {
        &self.sources
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Source>> {
        self.sources.iter().find(|s| s.name() == name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Twitter connector.
//!
//! Searches a tweet-scraping endpoint for the symbol's cashtag. Tweets are
//! archived with the column layout the sentiment step already reads, and
//! their `date`/`time` columns are local wall-clock time at
//! `utc_offset_hours` behind UTC.
//!
//! # Configuration
//!
//! ```toml
//! [twitter]
//! root = "twitter_data"
//! base_url = "http://127.0.0.1:8085/search/tweets"
//! start_date = "2011-03-01"
//! utc_offset_hours = 8
//! lang = "en"
//! min_retweets = 1
//! ```
//!
//! # Request
//!
//! `GET {base_url}?q=$SYM&since=..&until=..&lang=..&min_retweets=..&limit=..&sort=asc`,
//! with `since`/`until` as `%Y-%m-%d %H:%M:%S` UTC, answered by
//! `{"data": [ {...}, ... ]}`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::{Archive, ArchiveSchema, CursorColumn, ResumeScan};
use crate::config::{delimiter_char, TwitterConfig};
use crate::connector_reddit::parse_page;
use crate::error::TransportFailure;
use crate::identity::Session;
use crate::models::{Cursor, Post, SourceKind, SymbolRecord};
use crate::query::QueryPlan;
use crate::traits::{PageRequest, Source};

/// Archived tweet columns.
pub const TWEET_FIELDS: &[&str] = &[
    "id", "conversation_id", "created_at", "date", "time", "timezone", "user_id", "username",
    "name", "place", "tweet", "language", "mentions", "urls", "photos", "replies_count",
    "retweets_count", "likes_count", "hashtags", "cashtags", "link", "retweet", "quote_url",
    "video", "thumbnail", "near", "geo", "source", "user_rt_id", "user_rt", "retweet_id",
    "reply_to", "retweet_date", "translate", "trans_src", "trans_dest",
];

const KINDS: [SourceKind; 1] = [SourceKind::Tweet];

const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct TwitterSource {
    root: PathBuf,
    base_url: String,
    page_size: usize,
    lang: String,
    min_retweets: u32,
    start: Cursor,
    schema: Arc<ArchiveSchema>,
}

impl TwitterSource {
    pub fn from_config(config: &TwitterConfig) -> Result<Self> {
        let delimiter = delimiter_char(&config.delimiter, "twitter.delimiter")?;
        let utc_offset_secs = config.utc_offset_hours * 3600;
        let start = config
            .start_date()?
            .and_hms_opt(0, 0, 0)
            .map(|local| Cursor(local.and_utc().timestamp() + utc_offset_secs))
            .unwrap_or(Cursor::EPOCH);

        Ok(Self {
            root: config.root.clone(),
            base_url: config.base_url.clone(),
            page_size: config.page_size,
            lang: config.lang.clone(),
            min_retweets: config.min_retweets,
            start,
            schema: Arc::new(ArchiveSchema {
                kind: SourceKind::Tweet,
                file_name: "tweets.csv".to_string(),
                fieldnames: TWEET_FIELDS,
                delimiter,
                cursor: CursorColumn::LocalDateTime {
                    date: "date",
                    time: "time",
                    utc_offset_secs,
                },
                resume: ResumeScan::Full,
            }),
        })
    }

    /// Query string parameters for one page.
    pub fn query_params(
        &self,
        request: &PageRequest,
        now: DateTime<Utc>,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("q", request.query.clone()),
            ("since", since_param(request.after)),
            ("until", now.format(STAMP_FORMAT).to_string()),
            ("lang", self.lang.clone()),
            ("min_retweets", self.min_retweets.to_string()),
            ("limit", request.page_size.to_string()),
            ("sort", "asc".to_string()),
        ]
    }
}

/// The search `since` bound is inclusive, so start one second past the
/// newest archived tweet.
pub fn since_param(after: Cursor) -> String {
    DateTime::<Utc>::from_timestamp(after.seconds() + 1, 0)
        .unwrap_or_default()
        .format(STAMP_FORMAT)
        .to_string()
}

#[async_trait]
impl Source for TwitterSource {
    fn name(&self) -> &str {
        "twitter"
    }

    fn kinds(&self) -> &[SourceKind] {
        &KINDS
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn archive(&self, symbol: &str, _kind: SourceKind) -> Archive {
        Archive::new(&self.root, symbol, self.schema.clone())
    }

    fn start_cursor(&self) -> Cursor {
        self.start
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn plan(&self, symbol: &SymbolRecord, _kind: SourceKind) -> Option<QueryPlan> {
        if symbol.symbol.is_empty() {
            return None;
        }
        Some(QueryPlan::cashtag_only(&symbol.symbol))
    }

    async fn search(
        &self,
        session: &Session,
        request: &PageRequest,
    ) -> Result<Vec<Post>, TransportFailure> {
        let resp = session
            .client
            .get(&self.base_url)
            .query(&self.query_params(request, Utc::now()))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportFailure::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let body = resp.text().await?;
        parse_page(&body)
    }
}

//! Reddit connector.
//!
//! Searches a Pushshift-compatible archive API for submissions and comments
//! in one subreddit that mention a symbol. Queries are built by
//! [`QueryBuilder`], and for tickers that double as English words the
//! results are passed through the cashtag collision filter by the fetcher.
//!
//! # Configuration
//!
//! ```toml
//! [reddit]
//! root = "reddit_data"
//! subreddit = "wallstreetbets"
//! base_url = "https://api.pushshift.io/reddit/search"
//! page_size = 500
//! delimiter = "|"
//! ```
//!
//! # Request
//!
//! `GET {base_url}/{submission|comment}?subreddit=..&size=..&sort=asc&sort_type=created_utc&after=..&q=..`
//! answered by `{"data": [ {...}, ... ]}`.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::{Archive, ArchiveSchema, CursorColumn, ResumeScan, DEFAULT_TAIL_BYTES};
use crate::config::{delimiter_char, QueryConfig, RedditConfig};
use crate::dictionary::WordLookup;
use crate::error::TransportFailure;
use crate::identity::Session;
use crate::models::{Cursor, Post, SourceKind, SymbolRecord};
use crate::query::{QueryBuilder, QueryPlan};
use crate::traits::{PageRequest, Source};

/// Archived submission columns. `created_utc` leads so the cursor is the
/// first cell of every row.
pub const SUBMISSION_FIELDS: &[&str] = &[
    "created_utc", "all_awardings", "allow_live_comments", "approved_at_utc", "archived", "author",
    "author_cakeday", "author_created_utc", "author_flair_background_color",
    "author_flair_css_class", "author_flair_richtext", "author_flair_template_id",
    "author_flair_text", "author_flair_text_color", "author_flair_type", "author_fullname",
    "author_id", "author_patreon_flair", "author_premium", "awarders", "banned_at_utc", "banned_by",
    "brand_safe", "can_gild", "can_mod_post", "category", "content_categories", "contest_mode",
    "crosspost_parent", "crosspost_parent_list", "distinguished", "domain", "edited", "full_link",
    "gallery_data", "gilded", "gildings", "hidden", "id", "is_crosspostable", "is_gallery",
    "is_meta", "is_original_content", "is_reddit_media_domain", "is_robot_indexable", "is_self",
    "is_video", "link_flair_background_color", "link_flair_css_class", "link_flair_richtext",
    "link_flair_template_id", "link_flair_text", "link_flair_text_color", "link_flair_type",
    "locked", "media", "media_embed", "media_metadata", "media_only", "mod_reports", "no_follow",
    "num_comments", "num_crossposts", "over_18", "parent_whitelist_status", "permalink", "pinned",
    "post_hint", "preview", "previous_visits", "pwls", "quarantine", "removal_reason",
    "removed_by_category", "retrieved_on", "rte_mode", "score", "secure_media",
    "secure_media_embed", "selftext", "send_replies", "spoiler", "stickied", "subreddit",
    "subreddit_id", "subreddit_name_prefixed", "suggested_sort", "subreddit_subscribers",
    "subreddit_type", "thumbnail", "thumbnail_height", "thumbnail_width", "treatment_tags", "title",
    "total_awards_received", "updated_utc", "upvote_ratio", "url", "url_overridden_by_dest",
    "user_reports", "view_count", "whitelist_status", "wls",
];

/// Archived comment columns.
pub const COMMENT_FIELDS: &[&str] = &[
    "created_utc", "all_awardings", "associated_award", "author", "author_cakeday",
    "author_created_utc", "author_flair_background_color", "author_flair_css_class",
    "author_flair_richtext", "author_flair_template_id", "author_flair_text",
    "author_flair_text_color", "author_flair_type", "author_fullname", "author_patreon_flair",
    "author_premium", "awarders", "body", "can_gild", "collapsed",
    "collapsed_because_crowd_control", "collapsed_reason", "comment_type", "controversiality",
    "distinguished", "edited", "gilded", "gildings", "id", "is_submitter", "link_id", "locked",
    "media_metadata", "mod_removed", "no_follow", "nest_level", "parent_id", "permalink",
    "permalink_url", "reply_delay", "retrieved_on", "score", "score_hidden", "send_replies",
    "stickied", "subreddit", "subreddit_id", "subreddit_type", "top_awarded_type",
    "total_awards_received", "treatment_tags", "updated_utc", "user_removed",
];

const KINDS: [SourceKind; 2] = [SourceKind::Submission, SourceKind::Comment];

/// Subreddit search source.
pub struct RedditSource {
    root: PathBuf,
    subreddit: String,
    base_url: String,
    page_size: usize,
    submissions: Arc<ArchiveSchema>,
    comments: Arc<ArchiveSchema>,
    queries: QueryBuilder,
}

impl RedditSource {
    pub fn from_config(
        config: &RedditConfig,
        query: &QueryConfig,
        words: Arc<dyn WordLookup>,
    ) -> Result<Self> {
        let delimiter = delimiter_char(&config.delimiter, "reddit.delimiter")?;
        let schema = |kind: SourceKind, fieldnames: &'static [&'static str]| {
            Arc::new(ArchiveSchema {
                kind,
                file_name: format!("{}_{}.csv", config.subreddit, kind.label()),
                fieldnames,
                delimiter,
                cursor: CursorColumn::Epoch {
                    field: "created_utc",
                },
                resume: ResumeScan::Tail {
                    bytes: DEFAULT_TAIL_BYTES,
                },
            })
        };

        Ok(Self {
            root: config.root.clone(),
            subreddit: config.subreddit.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
            submissions: schema(SourceKind::Submission, SUBMISSION_FIELDS),
            comments: schema(SourceKind::Comment, COMMENT_FIELDS),
            queries: QueryBuilder::new(words, query.common_symbols.iter().cloned()),
        })
    }

    fn schema(&self, kind: SourceKind) -> Arc<ArchiveSchema> {
        match kind {
            SourceKind::Comment => self.comments.clone(),
            _ => self.submissions.clone(),
        }
    }

    /// Query string parameters for one page.
    pub fn query_params(&self, request: &PageRequest) -> Vec<(&'static str, String)> {
        vec![
            ("subreddit", self.subreddit.clone()),
            ("size", request.page_size.to_string()),
            ("sort", "asc".to_string()),
            ("sort_type", "created_utc".to_string()),
            ("after", request.after.to_string()),
            ("q", request.query.clone()),
        ]
    }
}

#[async_trait]
impl Source for RedditSource {
    fn name(&self) -> &str {
        "reddit"
    }

    fn kinds(&self) -> &[SourceKind] {
        &KINDS
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn archive(&self, symbol: &str, kind: SourceKind) -> Archive {
        Archive::new(&self.root, symbol, self.schema(kind))
    }

    fn start_cursor(&self) -> Cursor {
        Cursor::EPOCH
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn plan(&self, symbol: &SymbolRecord, _kind: SourceKind) -> Option<QueryPlan> {
        self.queries.plan(symbol)
    }

    async fn search(
        &self,
        session: &Session,
        request: &PageRequest,
    ) -> Result<Vec<Post>, TransportFailure> {
        let url = format!("{}/{}", self.base_url, request.kind.label());
        let resp = session
            .client
            .get(&url)
            .query(&self.query_params(request))
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

#[derive(Deserialize)]
struct Envelope {
    data: Vec<Map<String, Value>>,
}

/// Decode a `{"data": [...]}` page body.
pub fn parse_page(body: &str) -> Result<Vec<Post>, TransportFailure> {
    let envelope: Envelope = serde_json::from_str(body)?;
    Ok(envelope.data.into_iter().map(Post::new).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::WordList;

    fn source() -> RedditSource {
        RedditSource::from_config(
            &RedditConfig::default(),
            &QueryConfig::default(),
            Arc::new(WordList::new(["apple"])),
        )
        .unwrap()
    }

    #[test]
    fn archive_paths_follow_subreddit_and_kind() {
        let source = source();
        let archive = source.archive("BRK.B", SourceKind::Comment);
        assert_eq!(
            archive.path(),
            std::path::Path::new("reddit_data/BRK_B/wallstreetbets_comment.csv")
        );
        assert_eq!(archive.schema().fieldnames[0], "created_utc");
        let archive = source.archive("GME", SourceKind::Submission);
        assert!(archive.path().ends_with("GME/wallstreetbets_submission.csv"));
        assert!(archive.schema().fieldnames.contains(&"selftext"));
    }

    #[test]
    fn request_parameters() {
        let source = source();
        let request = PageRequest {
            kind: SourceKind::Submission,
            query: "AAPL|apple".to_string(),
            after: Cursor(1_612_137_600),
            page_size: 500,
        };
        let params = source.query_params(&request);
        assert!(params.contains(&("after", "1612137600".to_string())));
        assert!(params.contains(&("sort", "asc".to_string())));
        assert!(params.contains(&("size", "500".to_string())));
        assert!(params.contains(&("q", "AAPL|apple".to_string())));
        assert!(params.contains(&("subreddit", "wallstreetbets".to_string())));
    }

    #[test]
    fn common_word_tickers_use_cashtags() {
        let source = source();
        let symbol = SymbolRecord::new("ALL", "Allstate Corporation (The)", "The Allstate Corporation");
        let plan = source.plan(&symbol, SourceKind::Comment).unwrap();
        assert_eq!(plan.terms[0], "$ALL");
        assert!(plan.detect_cashtag);
    }

    #[test]
    fn parses_pages() {
        let posts = parse_page(r#"{"data": [{"created_utc": 5, "body": "hi"}, {"created_utc": 6}]}"#)
            .unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].text("body"), Some("hi"));

        assert!(parse_page(r#"{"data": []}"#).unwrap().is_empty());
        assert!(matches!(
            parse_page("<html>rate limited</html>"),
            Err(TransportFailure::Decode(_))
        ));
    }
}

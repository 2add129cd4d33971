//! Incremental fetcher.
//!
//! Runs one job, a `(symbol, source kind)` pair, until the source has
//! nothing newer than the archive:
//!
//! ```text
//! init ──► Fetching ──► Fetching ... ──► Drained
//!            │  ▲
//!            ▼  │ (transport failure: retry, maybe rotate identity)
//!          retry
//! ```
//!
//! `init` recovers the resume cursor from the archive (or the source's start
//! cursor) and builds the query. Each `Fetching` step requests one page of
//! posts strictly after the cursor. An empty page drains the job. A
//! non-empty page is filtered, sanitized and appended, and the cursor moves
//! to the newest post of the unfiltered page.

use std::sync::Arc;
use std::time::Duration;

use crate::archive::{run_blocking, Archive, ArchiveWriter};
use crate::error::{FetchError, TransportFailure};
use crate::identity::{IdentityGate, Session};
use crate::models::{Cursor, Job, Post};
use crate::query::{FilterVerdict, QueryPlan};
use crate::sanitize::sanitize_fields;
use crate::traits::{PageRequest, Source};

/// How failed page requests are retried.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Failed attempts per page before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
    pub backoff: Duration,
    /// Consecutive failures after which the identity is rotated.
    pub rotate_after: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::default()
        }
    }

    fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }

    fn should_rotate(&self, consecutive: u32) -> bool {
        self.rotate_after.is_some_and(|n| n > 0 && consecutive >= n)
    }
}

/// Shared by every worker in a run.
pub struct FetchContext {
    pub gate: Arc<IdentityGate>,
    pub policy: RetryPolicy,
    /// Start every job on a fresh identity.
    pub rotate_per_job: bool,
}

/// Where a job stands after each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Fetching,
    Drained,
}

/// Counters for a drained job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchStats {
    pub requests: u32,
    pub failures: u32,
    pub pages: u32,
    pub rows: usize,
    pub dropped: usize,
    pub cursor: Cursor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Drained(FetchStats),
    /// No usable query could be built for the symbol.
    Skipped,
}

/// Run `job` against `source` until drained.
pub async fn fetch_job(
    ctx: &FetchContext,
    source: &dyn Source,
    job: &Job,
    worker: usize,
) -> Result<FetchOutcome, FetchError> {
    let Some(mut run) = JobRun::init(ctx, source, job, worker).await? else {
        return Ok(FetchOutcome::Skipped);
    };

    while run.state == FetchState::Fetching {
        run.state = run.fetch_page().await?;
    }

    run.stats.cursor = run.cursor;
    tracing::info!(
        worker,
        symbol = %job.symbol.symbol,
        source = %job.source,
        kind = %job.kind,
        rows = run.stats.rows,
        requests = run.stats.requests,
        cursor = %run.cursor,
        "done"
    );
    Ok(FetchOutcome::Drained(run.stats))
}

struct JobRun<'a> {
    ctx: &'a FetchContext,
    source: &'a dyn Source,
    job: &'a Job,
    worker: usize,
    archive: Archive,
    state: FetchState,
    cursor: Cursor,
    plan: QueryPlan,
    session: Session,
    writer: Option<ArchiveWriter>,
    stats: FetchStats,
}

impl<'a> JobRun<'a> {
    /// Build the query and recover the cursor. `None` skips the job.
    async fn init(
        ctx: &'a FetchContext,
        source: &'a dyn Source,
        job: &'a Job,
        worker: usize,
    ) -> Result<Option<JobRun<'a>>, FetchError> {
        let Some(plan) = source.plan(&job.symbol, job.kind) else {
            tracing::info!(
                worker,
                symbol = %job.symbol.symbol,
                source = %job.source,
                "no viable query, skipping"
            );
            return Ok(None);
        };

        let archive = source.archive(&job.symbol.symbol, job.kind);
        let resume = {
            let archive = archive.clone();
            run_blocking(move || archive.resume_cursor()).await?
        };
        let cursor = resume.unwrap_or_else(|| source.start_cursor());

        let session = if ctx.rotate_per_job {
            ctx.gate.renewed_session().await?
        } else {
            ctx.gate.session().await?
        };

        tracing::info!(
            worker,
            symbol = %job.symbol.symbol,
            source = %job.source,
            kind = %job.kind,
            cursor = %cursor,
            query = %plan.joined(source.query_separator()),
            "start"
        );

        Ok(Some(JobRun {
            ctx,
            source,
            job,
            worker,
            archive,
            state: FetchState::Fetching,
            cursor,
            plan,
            session,
            writer: None,
            stats: FetchStats::default(),
        }))
    }

    async fn fetch_page(&mut self) -> Result<FetchState, FetchError> {
        let request = PageRequest {
            kind: self.job.kind,
            query: self.plan.joined(self.source.query_separator()),
            after: self.cursor,
            page_size: self.source.page_size(),
        };

        let posts = self.request_with_retry(&request).await?;
        if posts.is_empty() {
            return Ok(FetchState::Drained);
        }
        self.stats.pages += 1;

        let schema = self.archive.schema();
        let Some(page_max) = posts.iter().filter_map(|p| schema.post_cursor(p)).max() else {
            tracing::warn!(
                worker = self.worker,
                symbol = %self.job.symbol.symbol,
                source = %self.job.source,
                "page carries no readable timestamps, stopping"
            );
            return Ok(FetchState::Drained);
        };

        let text_fields = self.job.kind.text_fields();
        let (kept, verdict) = self.plan.filter_collisions(posts, text_fields);
        match verdict {
            FilterVerdict::Applied { dropped } => self.stats.dropped += dropped,
            FilterVerdict::Bypassed => tracing::debug!(
                symbol = %self.job.symbol.symbol,
                "collision filter would drop the whole page, keeping it"
            ),
            FilterVerdict::Skipped => {}
        }

        let rows = self.append(kept).await?;
        self.stats.rows += rows;

        tracing::debug!(
            worker = self.worker,
            symbol = %self.job.symbol.symbol,
            source = %self.job.source,
            kind = %self.job.kind,
            rows,
            cursor = %page_max,
            "page"
        );

        if page_max <= self.cursor {
            tracing::warn!(
                symbol = %self.job.symbol.symbol,
                source = %self.job.source,
                cursor = %self.cursor,
                "page did not move the cursor, stopping"
            );
            return Ok(FetchState::Drained);
        }
        self.cursor = page_max;
        Ok(FetchState::Fetching)
    }

    async fn request_with_retry(&mut self, request: &PageRequest) -> Result<Vec<Post>, FetchError> {
        let policy = &self.ctx.policy;
        let mut failures = 0u32;
        let mut consecutive = 0u32;
        loop {
            self.stats.requests += 1;
            let last: TransportFailure = match self.source.search(&self.session, request).await {
                Ok(posts) => return Ok(posts),
                Err(err) => err,
            };

            failures += 1;
            consecutive += 1;
            self.stats.failures += 1;
            tracing::warn!(
                worker = self.worker,
                symbol = %self.job.symbol.symbol,
                source = %self.job.source,
                attempt = failures,
                error = %last,
                "page request failed"
            );

            if policy.exhausted(failures) {
                return Err(FetchError::RetriesExhausted {
                    attempts: failures,
                    last,
                });
            }
            if policy.should_rotate(consecutive) {
                self.session = self.ctx.gate.renewed_session().await?;
                consecutive = 0;
            }
            if !policy.backoff.is_zero() {
                tokio::time::sleep(policy.backoff).await;
            }
        }
    }

    /// Sanitize and append posts not older than the cursor, oldest first.
    async fn append(&mut self, posts: Vec<Post>) -> Result<usize, FetchError> {
        let schema = self.archive.schema();
        let mut rows: Vec<(Cursor, Post)> = posts
            .into_iter()
            .filter_map(|post| schema.post_cursor(&post).map(|c| (c, post)))
            .filter(|(c, _)| *c >= self.cursor)
            .collect();
        if rows.is_empty() {
            return Ok(0);
        }
        rows.sort_by_key(|(c, _)| *c);

        let delimiter = schema.delimiter;
        let posts: Vec<Post> = rows
            .into_iter()
            .map(|(_, mut post)| {
                sanitize_fields(&mut post.fields, delimiter);
                post
            })
            .collect();

        let archive = self.archive.clone();
        let writer = self.writer.take();
        let (writer, written) = run_blocking(move || {
            let mut writer = match writer {
                Some(writer) => writer,
                None => archive.open_for_append()?,
            };
            writer.write_header_if_new()?;
            let written = writer.append(&posts)?;
            Ok((writer, written))
        })
        .await?;
        self.writer = Some(writer);
        Ok(written)
    }
}

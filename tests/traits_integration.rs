//! Integration tests for the `Source` extension trait.
//!
//! A scripted in-memory source stands in for the search endpoint so the
//! fetcher, archive and worker pool can be exercised end to end.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use symbol_chatter::archive::{Archive, ArchiveSchema, CursorColumn, ResumeScan};
use symbol_chatter::error::TransportFailure;
use symbol_chatter::fetch::{fetch_job, FetchContext, FetchOutcome, RetryPolicy};
use symbol_chatter::identity::{IdentityGate, NoopControl, Session};
use symbol_chatter::models::{Cursor, Job, Post, SourceKind, SymbolRecord};
use symbol_chatter::pool::{run_pool, SourceRunner};
use symbol_chatter::progress::NoProgress;
use symbol_chatter::query::QueryPlan;
use symbol_chatter::traits::{PageRequest, Source, SourceRegistry};
use tempfile::TempDir;

const FIELDS: &[&str] = &["created_utc", "id", "author", "body"];

// ─── Test Source ────────────────────────────────────────────────────

/// Serves queued pages in order, then empty pages forever.
struct ScriptedSource {
    root: PathBuf,
    schema: Arc<ArchiveSchema>,
    pages: Mutex<VecDeque<Vec<Post>>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl ScriptedSource {
    fn new(root: &Path, pages: Vec<Vec<Post>>) -> Self {
        Self {
            root: root.to_path_buf(),
            schema: Arc::new(ArchiveSchema {
                kind: SourceKind::Comment,
                file_name: "comment.csv".to_string(),
                fieldnames: FIELDS,
                delimiter: '|',
                cursor: CursorColumn::Epoch {
                    field: "created_utc",
                },
                resume: ResumeScan::Tail { bytes: 4096 },
            }),
            pages: Mutex::new(pages.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Source for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn kinds(&self) -> &[SourceKind] {
        &[SourceKind::Comment]
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn archive(&self, symbol: &str, _kind: SourceKind) -> Archive {
        Archive::new(&self.root, symbol, self.schema.clone())
    }

    fn start_cursor(&self) -> Cursor {
        Cursor::EPOCH
    }

    fn page_size(&self) -> usize {
        3
    }

    fn plan(&self, symbol: &SymbolRecord, _kind: SourceKind) -> Option<QueryPlan> {
        Some(QueryPlan::cashtag_only(&symbol.symbol))
    }

    async fn search(
        &self,
        _session: &Session,
        request: &PageRequest,
    ) -> Result<Vec<Post>, TransportFailure> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }
}

fn comment(created: i64, body: &str) -> Post {
    Post::new(
        json!({
            "created_utc": created,
            "id": format!("c{created}"),
            "author": "someone",
            "body": body,
            "score": 12
        })
        .as_object()
        .cloned()
        .unwrap(),
    )
}

fn ctx() -> FetchContext {
    FetchContext {
        gate: Arc::new(IdentityGate::new(Box::new(NoopControl), None)),
        policy: RetryPolicy::unbounded(),
        rotate_per_job: false,
    }
}

fn job(symbol: &str) -> Job {
    Job {
        source: "scripted".to_string(),
        symbol: SymbolRecord::new(symbol, "", ""),
        kind: SourceKind::Comment,
    }
}

fn data_rows(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn two_pages_drain_after_two_requests() {
    let tmp = TempDir::new().unwrap();
    let source = ScriptedSource::new(
        tmp.path(),
        vec![vec![
            comment(40, "$GME first"),
            comment(70, "$GME second"),
            comment(100, "$GME third"),
        ]],
    );

    let outcome = fetch_job(&ctx(), &source, &job("GME"), 0).await.unwrap();
    let FetchOutcome::Drained(stats) = outcome else {
        panic!("expected the job to drain");
    };
    assert_eq!(stats.requests, 2);
    assert_eq!(stats.rows, 3);
    assert_eq!(stats.cursor, Cursor(100));

    let archive = source.archive("GME", SourceKind::Comment);
    let content = std::fs::read_to_string(archive.path()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "created_utc|id|author|body");
    assert_eq!(lines[3], "100|c100|someone|$GME third");

    let afters: Vec<Cursor> = source.requests().iter().map(|r| r.after).collect();
    assert_eq!(afters, vec![Cursor(0), Cursor(100)]);
}

#[tokio::test]
async fn resumes_from_last_archived_row() {
    let tmp = TempDir::new().unwrap();
    let first = ScriptedSource::new(
        tmp.path(),
        vec![vec![comment(10, "$GME a"), comment(250, "$GME b")]],
    );
    fetch_job(&ctx(), &first, &job("GME"), 0).await.unwrap();

    // The upstream ignores `after` and replays an older post with new ones.
    let second = ScriptedSource::new(
        tmp.path(),
        vec![vec![comment(200, "$GME stale"), comment(300, "$GME c")]],
    );
    let outcome = fetch_job(&ctx(), &second, &job("GME"), 1).await.unwrap();
    let FetchOutcome::Drained(stats) = outcome else {
        panic!("expected the job to drain");
    };

    assert_eq!(second.requests()[0].after, Cursor(250));
    assert_eq!(stats.rows, 1);

    let rows = data_rows(second.archive("GME", SourceKind::Comment).path());
    let cursors: Vec<&str> = rows.iter().map(|r| r.split('|').next().unwrap()).collect();
    assert_eq!(cursors, vec!["10", "250", "300"]);
}

#[tokio::test]
async fn second_run_over_drained_archive_appends_nothing() {
    let tmp = TempDir::new().unwrap();
    let first = ScriptedSource::new(tmp.path(), vec![vec![comment(5, "$GME x")]]);
    fetch_job(&ctx(), &first, &job("GME"), 0).await.unwrap();

    let second = ScriptedSource::new(tmp.path(), Vec::new());
    fetch_job(&ctx(), &second, &job("GME"), 0).await.unwrap();

    assert_eq!(second.requests().len(), 1);
    assert_eq!(second.requests()[0].after, Cursor(5));
    assert_eq!(
        data_rows(second.archive("GME", SourceKind::Comment).path()).len(),
        1
    );
}

#[tokio::test]
async fn pool_runs_registered_source_for_every_symbol() {
    let tmp = TempDir::new().unwrap();
    let source = Arc::new(ScriptedSource::new(
        tmp.path(),
        vec![
            vec![comment(1, "one")],
            vec![comment(2, "two")],
            vec![comment(3, "three")],
        ],
    ));

    let mut registry = SourceRegistry::new();
    registry.register(source.clone());
    let runner = Arc::new(SourceRunner::new(registry, ctx()));

    let jobs: Vec<Job> = ["AAA", "BBB", "CCC", "DDD", "EEE"]
        .iter()
        .map(|s| job(s))
        .collect();
    let report = run_pool(runner, jobs, 2, "scripted", Arc::new(NoProgress)).await;

    assert_eq!(report.completed, 5);
    assert!(report.is_success());

    let written: usize = ["AAA", "BBB", "CCC", "DDD", "EEE"]
        .iter()
        .map(|s| source.archive(s, SourceKind::Comment))
        .filter(|a| a.exists())
        .map(|a| a.row_count().unwrap())
        .sum();
    assert_eq!(written, 3);
}

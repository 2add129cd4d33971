//! Update progress reporting.
//!
//! Reports job completion during `chatter --reddit` / `--twitter` so users
//! see how far a long run has come. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for an update run.
#[derive(Clone, Debug)]
pub enum UpdateProgressEvent {
    /// Jobs have been queued for a source.
    Queued { source: String, total: u64 },
    /// `n` of `total` jobs have finished (completed, skipped or failed).
    Finished {
        source: String,
        n: u64,
        total: u64,
    },
}

/// Reports update progress. Implementations write to stderr (human or JSON).
pub trait UpdateProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the worker pool.
    fn report(&self, event: UpdateProgressEvent);
}

/// Human-friendly progress on stderr: "update reddit  1,234 / 8,420 jobs".
pub struct StderrProgress;

impl UpdateProgressReporter for StderrProgress {
    fn report(&self, event: UpdateProgressEvent) {
        let line = match &event {
            UpdateProgressEvent::Queued { source, total } => {
                format!("update {}  queued {} jobs\n", source, format_number(*total))
            }
            UpdateProgressEvent::Finished { source, n, total } => format!(
                "update {}  {} / {} jobs\n",
                source,
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl UpdateProgressReporter for JsonProgress {
    fn report(&self, event: UpdateProgressEvent) {
        let obj = match &event {
            UpdateProgressEvent::Queued { source, total } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "queued",
                "total": total
            }),
            UpdateProgressEvent::Finished { source, n, total } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "fetching",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl UpdateProgressReporter for NoProgress {
    fn report(&self, _event: UpdateProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn UpdateProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

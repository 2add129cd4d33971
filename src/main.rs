//! # Symbol Chatter CLI (`chatter`)
//!
//! Keeps per-symbol archives of Reddit and Twitter posts up to date.
//!
//! ## Usage
//!
//! ```bash
//! chatter --config ./config/chatter.toml <--twitter | --reddit | --all | --status>
//! ```
//!
//! ## Flags
//!
//! | Flag | Description |
//! |------|-------------|
//! | `-t`, `--twitter` | Update tweet archives |
//! | `-r`, `--reddit` | Update subreddit submission and comment archives |
//! | `-a`, `--all` | Update Twitter, then Reddit |
//! | `--status` | List archives, row counts and resume cursors |
//!
//! The log level is taken from `RUST_LOG` (default `symbol_chatter=info`).

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use symbol_chatter::config;
use symbol_chatter::progress::ProgressMode;
use symbol_chatter::status;
use symbol_chatter::update::{self, Target};

const NO_PLATFORM: &str = "Please specify a platform to download.
  -t, --twitter   update tweet archives
  -r, --reddit    update subreddit archives
  -a, --all       update both";

/// Symbol Chatter: incremental social-media collector for stock symbols.
///
/// Reads settings from a TOML file (built-in defaults when it is absent).
/// See `config/chatter.example.toml` for every option.
#[derive(Parser)]
#[command(name = "chatter", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, default_value = "./config/chatter.toml")]
    config: PathBuf,

    /// Update tweet archives.
    #[arg(short = 't', long, group = "platform")]
    twitter: bool,

    /// Update subreddit archives.
    #[arg(short = 'r', long, group = "platform")]
    reddit: bool,

    /// Update Twitter, then Reddit.
    #[arg(short = 'a', long, group = "platform")]
    all: bool,

    /// Show archive status instead of updating.
    #[arg(long, group = "platform")]
    status: bool,

    /// Progress on stderr: human, json, or off. Defaults to human on a TTY.
    #[arg(long, value_enum)]
    progress: Option<ProgressMode>,
}

impl Cli {
    fn target(&self) -> Option<Target> {
        if self.all {
            Some(Target::All)
        } else if self.twitter {
            Some(Target::Twitter)
        } else if self.reddit {
            Some(Target::Reddit)
        } else {
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("symbol_chatter=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;

    if cli.status {
        status::run_status(&cfg)?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(target) = cli.target() else {
        println!("{}", NO_PLATFORM);
        return Ok(ExitCode::from(2));
    };

    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);
    let report = update::run_update(&cfg, target, Arc::from(progress.reporter())).await?;

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

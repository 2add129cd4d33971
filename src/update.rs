//! Update orchestration.
//!
//! Loads the symbol catalog, narrows it to the symbols this run should
//! cover, builds one job per `(symbol, kind)` for each selected source, and
//! drains each source's jobs through the worker pool in turn.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::catalog::{self, SymbolFilter};
use crate::config::{delimiter_char, Config};
use crate::dictionary::{WordList, WordLookup};
use crate::fetch::FetchContext;
use crate::identity::IdentityGate;
use crate::models::{Job, SymbolRecord};
use crate::pool::{run_pool, PoolReport, SourceRunner};
use crate::progress::{format_number, UpdateProgressReporter};
use crate::traits::{Source, SourceRegistry};

/// Which platforms an update run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Twitter,
    Reddit,
    All,
}

impl Target {
    /// Source names to update, in run order.
    pub fn source_names(&self) -> &'static [&'static str] {
        match self {
            Target::Twitter => &["twitter"],
            Target::Reddit => &["reddit"],
            Target::All => &["twitter", "reddit"],
        }
    }
}

/// Jobs for every symbol and every kind the source serves, in catalog order.
pub fn build_jobs(source: &dyn Source, symbols: &[SymbolRecord]) -> Vec<Job> {
    symbols
        .iter()
        .flat_map(|symbol| {
            source.kinds().iter().map(move |&kind| Job {
                source: source.name().to_string(),
                symbol: symbol.clone(),
                kind,
            })
        })
        .collect()
}

/// Symbols selected by the catalog settings.
pub fn selected_symbols(config: &Config) -> Result<Vec<SymbolRecord>> {
    let delimiter = delimiter_char(&config.catalog.delimiter, "catalog.delimiter")?;
    let symbols = catalog::load(&config.catalog.path, delimiter)?;
    let filter = SymbolFilter::from_config(&config.catalog)?;
    Ok(filter.apply(symbols))
}

pub fn load_words(config: &Config) -> Result<Arc<dyn WordLookup>> {
    let words = match &config.dictionary.path {
        Some(path) => WordList::from_file(path)?,
        None => {
            tracing::warn!("no dictionary configured, company names are not word-split");
            WordList::default()
        }
    };
    Ok(Arc::new(words))
}

pub async fn run_update(
    config: &Config,
    target: Target,
    progress: Arc<dyn UpdateProgressReporter>,
) -> Result<PoolReport> {
    let symbols = selected_symbols(config)?;
    tracing::info!(symbols = symbols.len(), "catalog loaded");

    let registry = SourceRegistry::from_config(config, load_words(config)?)?;
    let sources: Vec<Arc<dyn Source>> = target
        .source_names()
        .iter()
        .map(|name| {
            registry
                .find(name)
                .with_context(|| format!("Unknown source: '{}'", name))
        })
        .collect::<Result<_>>()?;

    let ctx = FetchContext {
        gate: Arc::new(IdentityGate::from_config(&config.identity)),
        policy: config.retry.policy(),
        rotate_per_job: config.identity.rotate_per_job,
    };
    let runner = Arc::new(SourceRunner::new(registry, ctx));

    let mut total = PoolReport::default();
    for source in sources {
        let jobs = build_jobs(source.as_ref(), &symbols);
        let report = run_pool(
            runner.clone(),
            jobs,
            config.workers.count,
            source.name(),
            progress.clone(),
        )
        .await;

        println!(
            "update {}: {} completed, {} skipped, {} failed",
            source.name(),
            format_number(report.completed as u64),
            format_number(report.skipped as u64),
            format_number(report.failed as u64),
        );
        if report.unprocessed > 0 {
            println!(
                "  {} jobs not started (all workers stopped)",
                format_number(report.unprocessed as u64)
            );
        }

        total.completed += report.completed;
        total.skipped += report.skipped;
        total.failed += report.failed;
        total.unprocessed += report.unprocessed;
    }

    Ok(total)
}

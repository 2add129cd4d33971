//! `chatter --status`: what is on disk for each source.
//!
//! Lists every archive that exists for the selected symbols with its row
//! count and resume cursor, then reports archive directories that no longer
//! match any symbol in the catalog.

use anyhow::{Context, Result};
use chrono::DateTime;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use walkdir::WalkDir;

use crate::archive::fs_encode;
use crate::catalog;
use crate::config::{delimiter_char, Config};
use crate::models::Cursor;
use crate::progress::format_number;
use crate::traits::SourceRegistry;
use crate::update::{load_words, selected_symbols};

/// Status of one `(source, symbol, kind)` archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveStatus {
    pub source: String,
    pub symbol: String,
    pub kind: String,
    pub rows: usize,
    pub cursor: Option<Cursor>,
}

pub fn run_status(config: &Config) -> Result<()> {
    let delimiter = delimiter_char(&config.catalog.delimiter, "catalog.delimiter")?;
    let all_symbols = catalog::load(&config.catalog.path, delimiter)?;
    let symbols = selected_symbols(config)?;
    let registry = SourceRegistry::from_config(config, load_words(config)?)?;

    println!(
        "{:<10} {:<10} {:<12} {:>10}  CURSOR (UTC)",
        "SOURCE", "SYMBOL", "KIND", "ROWS"
    );

    let known: HashSet<String> = all_symbols.iter().map(|s| fs_encode(&s.symbol)).collect();
    let mut orphans = Vec::new();

    for source in registry.sources() {
        let mut missing = 0usize;
        for symbol in &symbols {
            for &kind in source.kinds() {
                let archive = source.archive(&symbol.symbol, kind);
                if !archive.exists() {
                    missing += 1;
                    continue;
                }
                let status = ArchiveStatus {
                    source: source.name().to_string(),
                    symbol: symbol.symbol.clone(),
                    kind: kind.label().to_string(),
                    rows: archive.row_count()?,
                    cursor: archive.resume_cursor()?,
                };
                println!(
                    "{:<10} {:<10} {:<12} {:>10}  {}",
                    status.source,
                    status.symbol,
                    status.kind,
                    format_number(status.rows as u64),
                    format_cursor(status.cursor)
                );
            }
        }
        if missing > 0 {
            println!(
                "{:<10} {} archives not yet created",
                source.name(),
                format_number(missing as u64)
            );
        }

        for dir in orphan_dirs(source.root(), &known)? {
            orphans.push(format!("{}/{}", source.name(), dir));
        }
    }

    if !orphans.is_empty() {
        println!();
        println!("Archive directories with no matching symbol:");
        for orphan in orphans {
            println!("  {}", orphan);
        }
    }

    Ok(())
}

/// Symbol directories under `root` that match no known encoded symbol.
pub fn orphan_dirs(root: &Path, known: &HashSet<String>) -> Result<BTreeSet<String>> {
    let mut orphans = BTreeSet::new();
    if !root.is_dir() {
        return Ok(orphans);
    }
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to list {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !known.contains(&name) {
            orphans.insert(name);
        }
    }
    Ok(orphans)
}

fn format_cursor(cursor: Option<Cursor>) -> String {
    match cursor.and_then(|c| DateTime::from_timestamp(c.seconds(), 0)) {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn finds_directories_without_symbols() {
        let tmp = TempDir::new().unwrap();
        for dir in ["AAPL", "BRK_B", "DELISTED"] {
            std::fs::create_dir(tmp.path().join(dir)).unwrap();
        }
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();

        let known: HashSet<String> = ["AAPL", "BRK.B"].iter().map(|s| fs_encode(s)).collect();
        let orphans = orphan_dirs(tmp.path(), &known).unwrap();
        assert_eq!(orphans.into_iter().collect::<Vec<_>>(), vec!["DELISTED"]);
    }

    #[test]
    fn missing_root_has_no_orphans() {
        let known = HashSet::new();
        assert!(orphan_dirs(Path::new("/nonexistent/root"), &known)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn cursor_formatting() {
        assert_eq!(format_cursor(None), "-");
        assert_eq!(format_cursor(Some(Cursor(1_611_855_000))), "2021-01-28 17:30:00");
    }
}

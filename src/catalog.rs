//! Symbol catalog loading and job selection.
//!
//! The symbol table is a delimited flat file whose header row must contain
//! `symbol`, `shortName`, and `longName`. Other columns are carried along
//! on each [`SymbolRecord`].

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::models::SymbolRecord;

const REQUIRED_COLUMNS: [&str; 3] = ["symbol", "shortName", "longName"];

/// Load all symbol records, sorted ascending by symbol.
pub fn load(path: &Path, delimiter: char) -> Result<Vec<SymbolRecord>, CatalogError> {
    let unavailable = |reason: String| CatalogError::Unavailable {
        path: path.to_path_buf(),
        reason,
    };

    let content = std::fs::read_to_string(path).map_err(|e| unavailable(e.to_string()))?;
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());

    let header: Vec<String> = match lines.next() {
        Some(line) => split_row(line, delimiter),
        None => return Err(unavailable("file is empty".to_string())),
    };

    let mut positions = [0usize; 3];
    for (slot, column) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = header
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| unavailable(format!("missing required column '{}'", column)))?;
    }
    let [symbol_at, short_at, long_at] = positions;

    let mut symbols = Vec::new();
    for line in lines {
        let fields = split_row(line, delimiter);
        let field = |i: usize| fields.get(i).map(String::as_str).unwrap_or("");

        let symbol = field(symbol_at).trim();
        if symbol.is_empty() {
            tracing::warn!(row = line, "skipping symbol table row without a symbol");
            continue;
        }

        let mut record = SymbolRecord::new(symbol, field(short_at), field(long_at));
        record.extra = header
            .iter()
            .enumerate()
            .filter(|(i, _)| ![symbol_at, short_at, long_at].contains(i))
            .map(|(i, name)| (name.clone(), field(i).to_string()))
            .collect();
        symbols.push(record);
    }

    symbols.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    Ok(symbols)
}

/// Split one row, removing quotes that wrap a whole field.
fn split_row(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter)
        .map(|field| {
            let field = field.trim_end_matches('\r');
            match field
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
            {
                Some(inner) => inner.replace("\"\"", "\""),
                None => field.to_string(),
            }
        })
        .collect()
}

/// Narrows the catalog to the symbols a run should process.
pub struct SymbolFilter {
    start_from: String,
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl SymbolFilter {
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let include = if config.include_globs.is_empty() {
            None
        } else {
            Some(build_globset(&config.include_globs)?)
        };
        Ok(Self {
            start_from: config.start_from.clone(),
            include,
            exclude: build_globset(&config.exclude_globs)?,
        })
    }

    /// Symbols whose first character sorts at or after `start_from` and
    /// that pass the include/exclude globs.
    pub fn accepts(&self, symbol: &str) -> bool {
        if let Some(first) = self.start_from.chars().next() {
            match symbol.chars().next() {
                Some(c) if c >= first => {}
                _ => return false,
            }
        }
        if self.exclude.is_match(symbol) {
            return false;
        }
        match &self.include {
            Some(set) => set.is_match(symbol),
            None => true,
        }
    }

    pub fn apply(&self, symbols: Vec<SymbolRecord>) -> Vec<SymbolRecord> {
        symbols
            .into_iter()
            .filter(|s| self.accepts(&s.symbol))
            .collect()
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_table(content: &str) -> (TempDir, std::path::PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("symbol_table.csv");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn loads_and_sorts() {
        let (_tmp, path) = write_table(
            "symbol|shortName|longName|exchange\n\
             MSFT |Microsoft Corporation|Microsoft Corporation|NMS\n\
             AAPL|Apple Inc.|Apple Inc.|NMS\n\
             BRK.B|Berkshire Hathaway Inc.|\"Berkshire Hathaway Inc.\"|NYQ\n",
        );
        let symbols = load(&path, '|').unwrap();
        let names: Vec<&str> = symbols.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(names, vec!["AAPL", "BRK.B", "MSFT"]);
        assert_eq!(symbols[1].long_name, "Berkshire Hathaway Inc.");
        assert_eq!(
            symbols[0].extra,
            vec![("exchange".to_string(), "NMS".to_string())]
        );
    }

    #[test]
    fn missing_file_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let err = load(&tmp.path().join("nope.csv"), '|').unwrap_err();
        assert!(matches!(err, CatalogError::Unavailable { .. }));
    }

    #[test]
    fn missing_column_is_unavailable() {
        let (_tmp, path) = write_table("symbol|shortName\nAAPL|Apple\n");
        let err = load(&path, '|').unwrap_err();
        assert!(err.to_string().contains("longName"));
    }

    #[test]
    fn filter_honours_start_and_globs() {
        let config = CatalogConfig {
            start_from: "B".to_string(),
            exclude_globs: vec!["*.W".to_string()],
            ..CatalogConfig::default()
        };
        let filter = SymbolFilter::from_config(&config).unwrap();
        assert!(!filter.accepts("AAPL"));
        assert!(filter.accepts("BRK.B"));
        assert!(!filter.accepts("BRK.W"));

        let config = CatalogConfig {
            include_globs: vec!["G*".to_string()],
            ..CatalogConfig::default()
        };
        let filter = SymbolFilter::from_config(&config).unwrap();
        assert!(filter.accepts("GME"));
        assert!(!filter.accepts("AMC"));
    }
}

//! English word lookup used by the query builder.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Answers whether a token is a recognized dictionary word.
pub trait WordLookup: Send + Sync {
    fn is_word(&self, word: &str) -> bool;
}

/// In-memory, case-insensitive word list.
#[derive(Debug, Default, Clone)]
pub struct WordList {
    words: HashSet<String>,
}

impl WordList {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// Load a word list with one word per line. Blank lines and lines
    /// starting with `#` are ignored.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read word list: {}", path.display()))?;
        Ok(Self::new(
            content.lines().filter(|line| !line.trim_start().starts_with('#')),
        ))
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl WordLookup for WordList {
    fn is_word(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lookup_is_case_insensitive() {
        let words = WordList::new(["Apple", "group"]);
        assert!(words.is_word("apple"));
        assert!(words.is_word("GROUP"));
        assert!(!words.is_word("goldman"));
    }

    #[test]
    fn loads_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("words.txt");
        std::fs::write(&path, "# english words\napple\n\n  group  \n").unwrap();
        let words = WordList::from_file(&path).unwrap();
        assert_eq!(words.len(), 2);
        assert!(words.is_word("group"));
    }
}

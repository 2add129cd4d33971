//! Query construction and disambiguation for ticker symbols.
//!
//! A symbol's short and long names are reduced to company names, merged
//! into a [`QueryPlan`], and, for tickers that are also common English
//! words, paired with a cashtag so that results can be filtered for
//! false-positive matches after they come back.

use std::collections::HashSet;
use std::sync::Arc;

use crate::dictionary::WordLookup;
use crate::models::{Post, SymbolRecord};

const ARTICLES: &[&str] = &["a", "an", "the"];

const ENTITY_SUFFIXES: &[&str] = &[
    "corporation",
    "corp",
    "cor",
    "etf",
    "incorporated",
    "inc",
    "limited",
    "ltd",
];

/// Ordered search terms for one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub terms: Vec<String>,
    /// When set, `terms[0]` is `$SYMBOL` and results go through
    /// [`QueryPlan::filter_collisions`].
    pub detect_cashtag: bool,
}

/// Result of running the cashtag collision filter over one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// Filter not applicable to this plan.
    Skipped,
    Applied { dropped: usize },
    /// Every post would have been dropped; the page is kept whole.
    Bypassed,
}

impl QueryPlan {
    /// A plan that searches for the cashtag alone, without post filtering.
    pub fn cashtag_only(symbol: &str) -> Self {
        Self {
            terms: vec![format!("${}", symbol)],
            detect_cashtag: false,
        }
    }

    pub fn joined(&self, separator: &str) -> String {
        self.terms.join(separator)
    }

    fn secondary_terms(&self) -> &[String] {
        self.terms.get(1..).unwrap_or(&[])
    }

    /// Drop posts that only matched because the ticker is an ordinary word.
    ///
    /// A post is kept when one of its `text_fields` contains a secondary
    /// term, or contains the cashtag as a standalone token. Posts carrying
    /// none of the fields are kept. If nothing in a non-empty page would
    /// survive, the page is returned unfiltered.
    pub fn filter_collisions(
        &self,
        posts: Vec<Post>,
        text_fields: &[&str],
    ) -> (Vec<Post>, FilterVerdict) {
        if !self.detect_cashtag || posts.is_empty() {
            return (posts, FilterVerdict::Skipped);
        }

        let cashtag = self.terms[0].to_lowercase();
        let secondary: Vec<String> = self
            .secondary_terms()
            .iter()
            .map(|t| t.to_lowercase())
            .collect();

        let total = posts.len();
        let kept: Vec<Post> = posts
            .iter()
            .filter(|post| is_relevant(post, text_fields, &cashtag, &secondary))
            .cloned()
            .collect();

        if kept.is_empty() {
            return (posts, FilterVerdict::Bypassed);
        }
        let dropped = total - kept.len();
        (kept, FilterVerdict::Applied { dropped })
    }
}

fn is_relevant(post: &Post, text_fields: &[&str], cashtag: &str, secondary: &[String]) -> bool {
    let mut inspected = false;
    for field in text_fields {
        let Some(text) = post.text(field) else {
            continue;
        };
        inspected = true;
        let lower = text.to_lowercase();
        if secondary.iter().any(|term| lower.contains(term.as_str())) {
            return true;
        }
        if has_cashtag_token(&lower, cashtag) {
            return true;
        }
    }
    !inspected
}

fn has_cashtag_token(lower: &str, cashtag: &str) -> bool {
    lower
        .replace(&[',', ';', '.'][..], " ")
        .split_whitespace()
        .any(|word| word == cashtag)
}

/// Builds [`QueryPlan`]s from symbol metadata.
pub struct QueryBuilder {
    words: Arc<dyn WordLookup>,
    common_symbols: HashSet<String>,
}

impl QueryBuilder {
    pub fn new<I, S>(words: Arc<dyn WordLookup>, common_symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words,
            common_symbols: common_symbols.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_common(&self, symbol: &str) -> bool {
        self.common_symbols.contains(symbol)
    }

    /// Reduce a raw security name to the part people actually type.
    ///
    /// Names of three characters or fewer are too ambiguous; the raw name,
    /// stripped of commas and periods, is used instead.
    pub fn company_name(&self, raw: &str) -> String {
        let head = raw.split(',').next().unwrap_or("").to_lowercase();

        let mut words: Vec<&str> = Vec::new();
        let mut seen_non_word = false;
        for token in head.split_whitespace() {
            if words.is_empty() && ARTICLES.contains(&token) {
                continue;
            }
            if !self.words.is_word(token) {
                seen_non_word = true;
            } else if seen_non_word {
                break;
            }
            words.push(token);
        }

        if let Some(last) = words.last() {
            let bare = last.replace('.', "");
            if ENTITY_SUFFIXES.contains(&bare.as_str()) || bare.chars().count() <= 2 {
                words.pop();
            }
        }

        let name = words.join(" ");
        if name.chars().count() <= 3 {
            return raw.replace(&[',', '.'][..], "").trim().to_lowercase();
        }
        name
    }

    /// Company-name candidates from the long and short names, with
    /// duplicates and superstrings of shorter candidates removed.
    pub fn name_candidates(&self, symbol: &SymbolRecord) -> Vec<String> {
        let mut candidates: Vec<String> = [&symbol.long_name, &symbol.short_name]
            .into_iter()
            .map(|raw| self.company_name(raw))
            .filter(|name| !name.is_empty())
            .collect();
        candidates.sort_by_key(|name| name.chars().count());

        let mut kept: Vec<String> = Vec::new();
        for candidate in candidates {
            if kept.iter().any(|k| candidate.contains(k.as_str())) {
                continue;
            }
            kept.push(candidate);
        }
        kept
    }

    /// Build the plan for a symbol. `None` means there is nothing worth
    /// searching for.
    pub fn plan(&self, symbol: &SymbolRecord) -> Option<QueryPlan> {
        let mut terms = self.name_candidates(symbol);
        let mut detect_cashtag = false;

        if self.is_common(&symbol.symbol) {
            terms.insert(0, format!("${}", symbol.symbol));
            detect_cashtag = true;
        } else if symbol.symbol.chars().count() > 1 {
            terms.insert(0, symbol.symbol.clone());
        }

        if terms.is_empty() {
            return None;
        }
        Some(QueryPlan {
            terms,
            detect_cashtag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::WordList;
    use serde_json::{json, Map, Value};

    fn words() -> Arc<dyn WordLookup> {
        Arc::new(WordList::new([
            "apple", "group", "all", "state", "the", "can", "holdings", "company", "of", "and",
        ]))
    }

    fn post(fields: Value) -> Post {
        let map: Map<String, Value> = fields.as_object().cloned().unwrap();
        Post::new(map)
    }

    #[test]
    fn apple_inc() {
        let builder = QueryBuilder::new(words(), ["ALL"]);
        assert_eq!(builder.company_name("Apple Inc."), "apple");
    }

    #[test]
    fn goldman_sachs_drops_article_and_descriptor() {
        let builder = QueryBuilder::new(words(), ["ALL"]);
        assert_eq!(
            builder.company_name("The Goldman Sachs Group, Inc."),
            "goldman sachs"
        );
    }

    #[test]
    fn short_names_fall_back_to_raw() {
        let builder = QueryBuilder::new(words(), Vec::<String>::new());
        // "ibm corp." reduces to "ibm", which is too short to trust.
        assert_eq!(builder.company_name("IBM Corp."), "ibm corp");
        assert_eq!(builder.company_name("A.B, Inc."), "ab inc");
    }

    #[test]
    fn trailing_short_token_is_stripped() {
        let builder = QueryBuilder::new(words(), Vec::<String>::new());
        assert_eq!(builder.company_name("Nvidia Corporation"), "nvidia");
        assert_eq!(builder.company_name("Zoetis Co"), "zoetis");
    }

    #[test]
    fn candidates_drop_superstrings() {
        let builder = QueryBuilder::new(words(), Vec::<String>::new());
        let symbol = SymbolRecord::new("GS", "Goldman Sachs", "The Goldman Sachs Group, Inc.");
        assert_eq!(builder.name_candidates(&symbol), vec!["goldman sachs"]);

        let symbol = SymbolRecord::new("TSLA", "Tesla Motors", "Tesla");
        // "tesla motors" contains the shorter "tesla"
        assert_eq!(builder.name_candidates(&symbol), vec!["tesla"]);
    }

    #[test]
    fn common_word_symbol_leads_with_cashtag() {
        let builder = QueryBuilder::new(words(), ["ALL", "CAN"]);
        let symbol = SymbolRecord::new("ALL", "Allstate Corporation (The)", "The Allstate Corporation");
        let plan = builder.plan(&symbol).unwrap();
        assert_eq!(plan.terms[0], "$ALL");
        assert!(plan.detect_cashtag);
        assert!(plan.terms.contains(&"allstate".to_string()));
    }

    #[test]
    fn ordinary_symbol_leads_with_bare_ticker() {
        let builder = QueryBuilder::new(words(), ["ALL"]);
        let symbol = SymbolRecord::new("AAPL", "Apple Inc.", "Apple Inc.");
        let plan = builder.plan(&symbol).unwrap();
        assert_eq!(plan.terms, vec!["AAPL", "apple"]);
        assert!(!plan.detect_cashtag);
        assert_eq!(plan.joined("|"), "AAPL|apple");
    }

    #[test]
    fn single_letter_symbol_is_not_queried_bare() {
        let builder = QueryBuilder::new(words(), ["ALL"]);
        let symbol = SymbolRecord::new("F", "Ford Motor Company", "Ford Motor Company");
        let plan = builder.plan(&symbol).unwrap();
        assert!(!plan.terms.contains(&"F".to_string()));
    }

    #[test]
    fn no_viable_query() {
        let builder = QueryBuilder::new(words(), ["ALL"]);
        let symbol = SymbolRecord::new("X", "", "");
        assert!(builder.plan(&symbol).is_none());
    }

    #[test]
    fn filter_drops_plain_word_usage() {
        let plan = QueryPlan {
            terms: vec!["$ALL".to_string(), "allstate".to_string()],
            detect_cashtag: true,
        };
        let posts = vec![
            post(json!({"body": "I will buy more of this stock", "created_utc": 1})),
            post(json!({"body": "$ALL to the moon", "created_utc": 2})),
        ];
        let (kept, verdict) = plan.filter_collisions(posts, &["title", "selftext", "body"]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text("body"), Some("$ALL to the moon"));
        assert_eq!(verdict, FilterVerdict::Applied { dropped: 1 });
    }

    #[test]
    fn filter_keeps_secondary_term_and_punctuated_cashtag() {
        let plan = QueryPlan {
            terms: vec!["$CAN".to_string(), "canaan".to_string()],
            detect_cashtag: true,
        };
        let posts = vec![
            post(json!({"title": "Canaan earnings", "selftext": "can't wait"})),
            post(json!({"body": "loaded up on $can, again."})),
            post(json!({"body": "you can do it"})),
        ];
        let (kept, verdict) = plan.filter_collisions(posts, &["title", "selftext", "body"]);
        assert_eq!(kept.len(), 2);
        assert_eq!(verdict, FilterVerdict::Applied { dropped: 1 });
    }

    #[test]
    fn filter_bypassed_when_everything_would_go() {
        let plan = QueryPlan {
            terms: vec!["$ALL".to_string()],
            detect_cashtag: true,
        };
        let posts = vec![
            post(json!({"body": "all in"})),
            post(json!({"body": "all out"})),
        ];
        let (kept, verdict) = plan.filter_collisions(posts, &["body"]);
        assert_eq!(kept.len(), 2);
        assert_eq!(verdict, FilterVerdict::Bypassed);
    }

    #[test]
    fn filter_skipped_without_cashtag_detection() {
        let plan = QueryPlan::cashtag_only("AAPL");
        let posts = vec![post(json!({"tweet": "nothing relevant"}))];
        let (kept, verdict) = plan.filter_collisions(posts, &["tweet"]);
        assert_eq!(kept.len(), 1);
        assert_eq!(verdict, FilterVerdict::Skipped);
    }
}

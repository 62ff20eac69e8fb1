//! Routing rules - keyword conditions and destination folders

mod action;
mod keywords;
mod matcher;

pub use action::{CopyError, copy_into};
pub use keywords::KeywordList;
pub use matcher::{Decision, MatchPass, SUPPORTED_EXTENSIONS, decide, is_supported, route};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// A rule that routes matching files into a destination folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// File name must contain at least one of these (case-insensitive)
    #[serde(default, deserialize_with = "keywords::deserialize")]
    pub include_keywords: Vec<String>,

    /// File name and path must contain none of these (case-insensitive)
    #[serde(default, deserialize_with = "keywords::deserialize")]
    pub exclude_keywords: Vec<String>,

    /// Folder that matching files are copied into
    pub target_dir: PathBuf,
}

impl Rule {
    /// Create a new rule
    pub fn new(
        include_keywords: Vec<String>,
        exclude_keywords: Vec<String>,
        target_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            include_keywords,
            exclude_keywords,
            target_dir: target_dir.into(),
        }
    }

    /// Lower-cased, non-blank include keywords
    pub fn includes(&self) -> KeywordList {
        KeywordList::new(&self.include_keywords)
    }

    /// Lower-cased, non-blank exclude keywords
    pub fn excludes(&self) -> KeywordList {
        KeywordList::new(&self.exclude_keywords)
    }

    /// No include and no exclude keywords: matches anything once reached
    pub fn is_catch_all(&self) -> bool {
        self.includes().is_empty() && self.excludes().is_empty()
    }

    /// Only exclude keywords. Such a rule never routes a file, it only vetoes.
    pub fn is_exclude_only(&self) -> bool {
        self.includes().is_empty() && !self.excludes().is_empty()
    }

    /// One-line summary for listings
    pub fn summary(&self) -> String {
        format!(
            "include: {} | exclude: {} -> {}",
            keywords::display(&self.include_keywords),
            keywords::display(&self.exclude_keywords),
            self.target_dir.display()
        )
    }
}

/// Ordered, immutable collection of rules.
///
/// Order is the precedence contract: within each matching pass the first
/// rule in list order wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Rules in precedence order
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Union of every rule's exclude keywords, lower-cased, in rule order
    pub fn exclude_keywords(&self) -> Vec<String> {
        self.rules
            .iter()
            .flat_map(|rule| rule.excludes().into_inner())
            .collect()
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Rule set shared between the configuration side and event processing.
///
/// Readers take an `Arc` snapshot and never observe a partially edited list;
/// writers replace the whole set at once.
#[derive(Debug, Clone)]
pub struct SharedRules {
    tx: Arc<watch::Sender<Arc<RuleSet>>>,
}

impl SharedRules {
    pub fn new(rules: RuleSet) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(rules));
        Self { tx: Arc::new(tx) }
    }

    /// Current rule set
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.tx.borrow())
    }

    /// Swap in a new rule set
    pub fn replace(&self, rules: RuleSet) {
        self.tx.send_replace(Arc::new(rules));
    }
}

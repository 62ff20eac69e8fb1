//! Rule matching - decides which single rule (if any) receives a file

use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use super::RuleSet;

/// File name suffixes that are considered at all (compared case-insensitively)
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".stl", ".pts", ".stl.nested"];

/// Which pass selected the rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    /// A rule with include keywords matched the file name
    Include,
    /// A rule without any keywords was reached
    CatchAll,
}

/// Outcome of evaluating one file against a rule set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Extension is not on the allow-list; rules were never consulted
    Unsupported,
    /// Some rule's exclude keyword matched the name or path
    Vetoed { keyword: String },
    /// Routed to the rule at `rule_index`
    Routed {
        rule_index: usize,
        pass: MatchPass,
        target_dir: PathBuf,
    },
    /// No rule applies; the file stays where it is
    NoMatch,
}

impl Decision {
    pub fn target_dir(&self) -> Option<&Path> {
        match self {
            Decision::Routed { target_dir, .. } => Some(target_dir),
            _ => None,
        }
    }
}

/// Whether the file name ends with one of [`SUPPORTED_EXTENSIONS`]
pub fn is_supported(path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.to_string_lossy().to_lowercase();
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|ext| name.len() > ext.len() && name.ends_with(ext))
}

/// Apply the extension gate, then route
pub fn decide(path: &Path, rules: &RuleSet) -> Decision {
    if !is_supported(path) {
        return Decision::Unsupported;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    evaluate(&file_name, path, rules)
}

/// Destination folder for a file, or `None` when no rule applies.
///
/// Rules are consulted in three passes, each short-circuiting:
///
/// 1. every rule's exclude keywords form a global veto, checked against the
///    lower-cased file name and full path;
/// 2. rules with include keywords, in list order: the first whose include
///    keywords hit the file name and whose own excludes miss wins;
/// 3. catch-all rules (no keywords at all), in list order: the first wins.
///
/// A rule with only exclude keywords is never selected; it only vetoes.
pub fn route(file_name: &str, file_path: &Path, rules: &RuleSet) -> Option<PathBuf> {
    match evaluate(file_name, file_path, rules) {
        Decision::Routed { target_dir, .. } => Some(target_dir),
        _ => None,
    }
}

fn evaluate(file_name: &str, file_path: &Path, rules: &RuleSet) -> Decision {
    let name = file_name.to_lowercase();
    let path = file_path.to_string_lossy().to_lowercase();
    let haystacks = [name.as_str(), path.as_str()];

    if let Some(keyword) = rules
        .exclude_keywords()
        .into_iter()
        .find(|k| haystacks.iter().any(|h| h.contains(k.as_str())))
    {
        debug!("Global exclude keyword '{}' vetoes {}", keyword, file_path.display());
        return Decision::Vetoed { keyword };
    }

    for (index, rule) in rules.iter().enumerate() {
        let includes = rule.includes();
        if includes.is_empty() {
            continue;
        }
        if includes.find_in(&[name.as_str()]).is_none() {
            trace!("Rule #{} include keywords miss {}", index, file_name);
            continue;
        }
        if let Some(keyword) = rule.excludes().find_in(&haystacks) {
            trace!("Rule #{} excluded by '{}'", index, keyword);
            continue;
        }
        return Decision::Routed {
            rule_index: index,
            pass: MatchPass::Include,
            target_dir: rule.target_dir.clone(),
        };
    }

    for (index, rule) in rules.iter().enumerate() {
        if rule.is_catch_all() {
            return Decision::Routed {
                rule_index: index,
                pass: MatchPass::CatchAll,
                target_dir: rule.target_dir.clone(),
            };
        }
    }

    Decision::NoMatch
}

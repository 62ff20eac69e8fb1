//! Keyword normalization and substring matching

use serde::{Deserialize, Deserializer};

/// Keywords prepared for matching: trimmed, lower-cased, blanks removed.
///
/// Stored rules keep the casing the user typed; normalization happens here,
/// at match time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordList(Vec<String>);

impl KeywordList {
    pub fn new(raw: &[String]) -> Self {
        Self(
            raw.iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .map(str::to_lowercase)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }

    /// First keyword contained in any of the (already lower-cased) haystacks
    pub fn find_in(&self, haystacks: &[&str]) -> Option<&str> {
        self.0
            .iter()
            .find(|k| haystacks.iter().any(|h| h.contains(k.as_str())))
            .map(String::as_str)
    }
}

/// Split a comma-separated keyword string, dropping blank entries
pub fn split(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

/// Comma-joined keywords, or "none"
pub fn display(keywords: &[String]) -> String {
    let cleaned: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if cleaned.is_empty() {
        "none".to_string()
    } else {
        cleaned.join(", ")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeywordsRepr {
    List(Vec<String>),
    Text(String),
}

/// Accepts either a list of keywords or a legacy comma-separated string
pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match KeywordsRepr::deserialize(deserializer)? {
        KeywordsRepr::List(list) => list
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        KeywordsRepr::Text(text) => split(&text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_case_and_blanks() {
        let list = KeywordList::new(&["  Final ".to_string(), "".to_string(), "   ".to_string()]);
        assert_eq!(list.into_inner(), vec!["final".to_string()]);
    }

    #[test]
    fn test_find_in_checks_every_haystack() {
        let list = KeywordList::new(&["draft".to_string()]);
        assert_eq!(list.find_in(&["part.stl", "/work/drafts/part.stl"]), Some("draft"));
        assert_eq!(list.find_in(&["part.stl", "/work/part.stl"]), None);
    }

    #[test]
    fn test_split_comma_string() {
        assert_eq!(split("a, b,, c ,"), vec!["a", "b", "c"]);
        assert!(split(" , ").is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(display(&[]), "none");
        assert_eq!(display(&["A".to_string(), " b ".to_string()]), "A, b");
    }
}

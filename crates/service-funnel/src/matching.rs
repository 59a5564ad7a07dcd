/// Text containment rules used by funnel lookups.
///
/// Every "does this text contain that answer" check in the engine goes through
/// a `MatchPolicy`. `SubstringMatch` is the catalog's established behavior: a
/// token matches anywhere, so a short token like "a" matches almost any text.
/// `WordMatch` only accepts whole-word occurrences and can be selected with
/// `MATCH_POLICY=word`.
use std::str::FromStr;

use regex::Regex;

use crate::error::AppError;

pub trait MatchPolicy: Send + Sync {
    /// Case-sensitive containment.
    fn contains(&self, haystack: &str, needle: &str) -> bool;

    /// Containment after lowercasing both sides.
    fn contains_ignore_case(&self, haystack: &str, needle: &str) -> bool {
        self.contains(&haystack.to_lowercase(), &needle.to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMatch;

impl MatchPolicy for SubstringMatch {
    fn contains(&self, haystack: &str, needle: &str) -> bool {
        haystack.contains(needle)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WordMatch;

impl MatchPolicy for WordMatch {
    fn contains(&self, haystack: &str, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        // \b only anchors next to word characters; needles that start or end
        // with punctuation fall back to plain containment on that side.
        let first_is_word = needle.chars().next().is_some_and(is_word_char);
        let last_is_word = needle.chars().last().is_some_and(is_word_char);
        let pattern = format!(
            "{}{}{}",
            if first_is_word { r"\b" } else { "" },
            regex::escape(needle),
            if last_is_word { r"\b" } else { "" },
        );
        match Regex::new(&pattern) {
            Ok(re) => re.is_match(haystack),
            Err(_) => haystack.contains(needle),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicyKind {
    #[default]
    Substring,
    Word,
}

impl MatchPolicyKind {
    pub fn build(self) -> Box<dyn MatchPolicy> {
        match self {
            MatchPolicyKind::Substring => Box::new(SubstringMatch),
            MatchPolicyKind::Word => Box::new(WordMatch),
        }
    }
}

impl FromStr for MatchPolicyKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "substring" => Ok(MatchPolicyKind::Substring),
            "word" => Ok(MatchPolicyKind::Word),
            other => Err(AppError::Config(format!(
                "MATCH_POLICY must be 'substring' or 'word', got '{other}'"
            ))),
        }
    }
}

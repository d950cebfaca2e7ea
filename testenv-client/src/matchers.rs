use crate::{ClientError, Result};
use regex::Regex;
use std::fmt;

/// Matches strings that the pattern matches in full, not just a substring.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    pattern: String,
    regex: Regex,
}

impl RegexMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let invalid = |e: regex::Error| ClientError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        };
        // Checked unanchored first: wrapping can hide unbalanced groups like `a)(b`
        Regex::new(pattern).map_err(invalid)?;
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(invalid)?;
        Ok(Self { pattern: pattern.to_string(), regex })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// `None` never matches.
    pub fn matches(&self, item: Option<&str>) -> bool {
        item.is_some_and(|s| self.regex.is_match(s))
    }
}

impl fmt::Display for RegexMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "regex [{}]", self.pattern)
    }
}

/// Shorthand for [`RegexMatcher::new`].
pub fn regex(pattern: &str) -> Result<RegexMatcher> {
    RegexMatcher::new(pattern)
}

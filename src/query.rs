use std::fmt;

/// a trimmed, non-empty question as submitted to the completion service.
///
/// equality is exact string match on the trimmed text; no other
/// normalization (case, inner whitespace) happens.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryText(String);

impl QueryText {
    /// trims `raw`; `None` when nothing is left to ask.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for QueryText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_surrounding_whitespace() {
        let q = QueryText::parse("  what is due process?\n").expect("non-empty");
        assert_eq!(q.as_str(), "what is due process?");
    }

    #[test]
    fn parse_rejects_blank_input() {
        assert!(QueryText::parse("").is_none());
        assert!(QueryText::parse(" \t\r\n ").is_none());
    }

    #[test]
    fn inner_whitespace_and_case_are_kept() {
        let a = QueryText::parse("Due  Process").unwrap();
        let b = QueryText::parse("due process").unwrap();
        assert_eq!(a.as_str(), "Due  Process");
        assert_ne!(a, b);
    }
}

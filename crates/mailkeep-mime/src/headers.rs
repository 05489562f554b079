//! Header blocks.

use std::collections::BTreeMap;

/// Unfolded message headers.
///
/// Names compare case-insensitively. A repeated name replaces the earlier
/// value; nothing accumulates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing any existing value for the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            *entry = (name, value);
        } else {
            self.entries.push((name, value));
        }
    }

    /// Gets the value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the number of distinct headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over headers in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Copies the headers into a name-to-value map.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries.iter().cloned().collect()
    }

    /// Parses a header block.
    ///
    /// Lines end with CRLF or a bare LF. A line starting with a space or tab
    /// continues the previous header: its trimmed content is appended with
    /// no separator. Lines without a `:` are ignored, and parsing stops at
    /// the first empty line.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                if current.is_some() {
                    break;
                }
                continue;
            }

            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.insert(name, value);
            }
            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_string(), value.trim().to_string()));
            }
        }

        if let Some((name, value)) = current {
            headers.insert(name, value);
        }
        headers
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_get_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn test_last_value_wins() {
        let headers = Headers::parse("Received: one\r\nSubject: x\r\nreceived: two\r\n");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("Received"), Some("two"));
    }

    #[test]
    fn test_unfolding_has_no_separator() {
        let headers = Headers::parse("Subject: Hello\r\n  World\r\n\tAgain\r\n");
        assert_eq!(headers.get("Subject"), Some("HelloWorldAgain"));
    }

    #[test]
    fn test_split_on_first_colon() {
        let headers = Headers::parse("Date: Mon, 01 Jan 2024 10:00:00 +0000\r\n");
        assert_eq!(headers.get("Date"), Some("Mon, 01 Jan 2024 10:00:00 +0000"));
    }

    #[test]
    fn test_lines_without_colon_ignored() {
        let headers = Headers::parse("garbage line\r\nFrom: a@example.com\r\n");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("From"), Some("a@example.com"));
    }

    #[test]
    fn test_stops_at_blank_line() {
        let headers = Headers::parse("From: a@example.com\r\n\r\nNot-A-Header: body");
        assert!(headers.get("Not-A-Header").is_none());
    }

    #[test]
    fn test_bare_lf_lines() {
        let headers = Headers::parse("From: a@example.com\nTo: b@example.com\n");
        assert_eq!(headers.get("To"), Some("b@example.com"));
    }

    #[test]
    fn test_iteration_order_and_map() {
        let headers = Headers::parse("B: 2\r\nA: 1\r\n");
        let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(headers.to_map().get("A").map(String::as_str), Some("1"));
    }

    proptest! {
        #[test]
        fn prop_three_line_fold(
            first in "[!-~]{1,20}",
            second in "[!-~]{1,20}",
            third in "[!-~]{1,20}",
            indent in prop::sample::select(vec![" ", "\t", "   "]),
        ) {
            let raw = format!("X-Folded: {first}\r\n{indent}{second}\r\n{indent}{third}\r\n");
            let headers = Headers::parse(&raw);
            let expected = format!("{first}{second}{third}");
            prop_assert_eq!(headers.get("X-Folded"), Some(expected.as_str()));
        }
    }
}

//! Response framing and parsing.
//!
//! IMAP responses are CRLF-terminated lines, any of which may announce a
//! literal (`{n}`) whose `n` bytes follow verbatim. A command is complete once
//! a line starting with its tag arrives outside any literal.

use crate::{Error, Result};

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Marker preceding each header literal in a `BODY.PEEK[HEADER]` fetch.
const HEADER_MARKER: &[u8] = b"BODY[HEADER]";

/// Finds the position of CRLF in a buffer.
pub(crate) fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a literal length from the end of a line.
///
/// Matches patterns like `{123}\r\n` or `{123+}\r\n` (non-synchronizing).
pub(crate) fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);
    let open = line.iter().rposition(|&b| b == b'{')?;

    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Incremental search for the completion line of a tagged command.
///
/// Remembers how far it has scanned so each new chunk is examined once.
#[derive(Debug)]
pub(crate) struct TaggedScanner {
    tag: String,
    pos: usize,
}

impl TaggedScanner {
    pub(crate) fn new(tag: &str) -> Self {
        Self {
            tag: format!("{tag} "),
            pos: 0,
        }
    }

    /// Returns the end offset of the tagged line once it is in `buf`.
    pub(crate) fn advance(&mut self, buf: &[u8]) -> Result<Option<usize>> {
        loop {
            let rest = &buf[self.pos..];
            let Some(crlf) = find_crlf(rest) else {
                if rest.len() > MAX_LINE_LENGTH {
                    return Err(Error::Protocol("line too long".to_string()));
                }
                return Ok(None);
            };

            let line = &rest[..crlf + 2];
            let line_end = self.pos + crlf + 2;

            if line.starts_with(self.tag.as_bytes()) {
                self.pos = line_end;
                return Ok(Some(line_end));
            }

            match parse_literal_length(line) {
                Some(len) if len > MAX_LITERAL_SIZE => {
                    return Err(Error::Protocol(format!(
                        "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
                    )));
                }
                Some(len) => {
                    if buf.len() < line_end + len {
                        return Ok(None);
                    }
                    self.pos = line_end + len;
                }
                None => self.pos = line_end,
            }
        }
    }
}

/// Completion status carried by a tagged line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command succeeded.
    Ok,
    /// Command failed.
    No,
    /// Command was malformed or not understood.
    Bad,
}

/// Complete response to one tagged command.
#[derive(Debug, Clone)]
pub struct TaggedResponse {
    /// Raw bytes, untagged data followed by the tagged line.
    pub raw: Vec<u8>,
    /// Completion status.
    pub status: Status,
    /// Human-readable text after the status keyword.
    pub text: String,
}

impl TaggedResponse {
    /// Parses the response to the command tagged `tag`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` if the final line does not carry a
    /// recognised status.
    pub fn parse(tag: &str, raw: Vec<u8>) -> Result<Self> {
        let body = raw.strip_suffix(b"\r\n").unwrap_or(&raw);
        let start = body
            .windows(2)
            .rposition(|w| w == b"\r\n")
            .map_or(0, |pos| pos + 2);
        let line = String::from_utf8_lossy(&body[start..]).into_owned();

        let rest = line
            .strip_prefix(tag)
            .map(str::trim_start)
            .ok_or_else(|| Error::InvalidResponse(line.clone()))?;
        let (keyword, text) = rest.split_once(' ').unwrap_or((rest, ""));
        let status = match keyword.to_ascii_uppercase().as_str() {
            "OK" => Status::Ok,
            "NO" => Status::No,
            "BAD" => Status::Bad,
            _ => return Err(Error::InvalidResponse(line.clone())),
        };

        Ok(Self {
            raw,
            status,
            text: text.to_string(),
        })
    }

    /// Returns true if the command succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Converts NO/BAD into the matching error.
    ///
    /// # Errors
    ///
    /// Returns `No` or `Bad` carrying the server's text.
    pub fn into_ok(self) -> Result<Self> {
        match self.status {
            Status::Ok => Ok(self),
            Status::No => Err(Error::No(self.text)),
            Status::Bad => Err(Error::Bad(self.text)),
        }
    }

    /// Returns the response as text, with invalid UTF-8 replaced.
    #[must_use]
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }
}

/// One entry of a LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxEntry {
    /// Mailbox attributes such as `\Noselect` or `\HasChildren`.
    pub attributes: Vec<String>,
    /// Hierarchy delimiter, `None` for a flat namespace.
    pub delimiter: Option<String>,
    /// Server-canonical mailbox name, as passed to SELECT.
    pub name: String,
}

impl MailboxEntry {
    /// Returns false if the mailbox cannot be selected.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self
            .attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case("\\Noselect") || a.eq_ignore_ascii_case("\\NonExistent"))
    }

    /// Returns the last component of the hierarchical name.
    #[must_use]
    pub fn leaf_name(&self) -> &str {
        self.delimiter
            .as_deref()
            .filter(|d| !d.is_empty())
            .and_then(|d| self.name.rsplit_once(d))
            .map_or(self.name.as_str(), |(_, leaf)| leaf)
    }

    /// Returns the name of the parent mailbox, if any.
    #[must_use]
    pub fn parent_name(&self) -> Option<&str> {
        let delimiter = self.delimiter.as_deref().filter(|d| !d.is_empty())?;
        self.name.rsplit_once(delimiter).map(|(parent, _)| parent)
    }
}

/// Parses a `* LIST (attrs) "delim" name` line.
///
/// Quoted names are taken from between the last two double quotes; atom names
/// are the last token. Anything else yields `None`.
#[must_use]
pub fn parse_list_line(line: &str) -> Option<MailboxEntry> {
    let line = line.trim_end();
    let rest = line.strip_prefix("* LIST ")?;

    let (attributes, after_attrs) = match rest.strip_prefix('(') {
        Some(inner) => {
            let close = inner.find(')')?;
            let attrs = inner[..close]
                .split_whitespace()
                .map(str::to_string)
                .collect();
            (attrs, inner[close + 1..].trim_start())
        }
        None => (Vec::new(), rest),
    };

    let delimiter = if let Some(quoted) = after_attrs.strip_prefix('"') {
        quoted.find('"').map(|end| quoted[..end].to_string())
    } else {
        None
    };

    let name = if line.ends_with('"') {
        let last = line.rfind('"')?;
        let first = line[..last].rfind('"')?;
        line[first + 1..last].to_string()
    } else {
        let atom = line.rsplit(' ').next()?;
        if atom.is_empty() || atom.starts_with('{') || atom.ends_with(')') {
            return None;
        }
        atom.to_string()
    };

    Some(MailboxEntry {
        attributes,
        delimiter,
        name,
    })
}

/// Mailbox status reported by SELECT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderStatus {
    /// Number of messages in the mailbox (0 if not reported).
    pub message_count: u32,
    /// Next UID the server will assign.
    pub uid_next: Option<u32>,
    /// UID epoch of the mailbox.
    pub uid_validity: Option<u32>,
}

/// Extracts EXISTS, UIDNEXT and UIDVALIDITY from a SELECT response.
///
/// Every value is best-effort; missing data never fails.
#[must_use]
pub fn parse_select(text: &str) -> FolderStatus {
    let mut status = FolderStatus::default();

    for line in text.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if tokens
            .iter()
            .any(|t| t.to_ascii_uppercase().contains("EXISTS"))
        {
            if let Some(count) = tokens.iter().find_map(|t| t.parse::<u32>().ok()) {
                status.message_count = count;
            }
        }

        if let Some(value) = bracketed_number(&tokens, "UIDNEXT") {
            status.uid_next = Some(value);
        }
        if let Some(value) = bracketed_number(&tokens, "UIDVALIDITY") {
            status.uid_validity = Some(value);
        }
    }

    status
}

/// Finds `[KEY n]` among the tokens and returns `n`.
fn bracketed_number(tokens: &[&str], key: &str) -> Option<u32> {
    let index = tokens
        .iter()
        .position(|t| t.to_ascii_uppercase().contains(key))?;
    tokens[index + 1..]
        .iter()
        .find(|t| t.ends_with(']'))
        .and_then(|t| t.trim_end_matches(']').parse().ok())
}

/// Splits a `FETCH (BODY.PEEK[HEADER])` response into per-message header
/// blocks.
///
/// Each block starts after the literal announcement that follows the
/// `BODY[HEADER]` marker and runs for the announced length, or up to the
/// next `\r\n)\r\n` when the length cannot be used. If nothing can be
/// extracted the whole response is returned as a single block.
#[must_use]
pub fn extract_header_blocks(raw: &[u8]) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some(found) = find(&raw[pos..], HEADER_MARKER) {
        let marker_end = pos + found + HEADER_MARKER.len();
        let Some(brace) = find(&raw[marker_end..], b"}\r\n") else {
            break;
        };
        let start = marker_end + brace + 3;

        let announced = raw[marker_end..marker_end + brace]
            .iter()
            .rposition(|&b| b == b'{')
            .and_then(|open| {
                std::str::from_utf8(&raw[marker_end + open + 1..marker_end + brace])
                    .ok()?
                    .trim_end_matches('+')
                    .parse::<usize>()
                    .ok()
            })
            .filter(|len| start + len <= raw.len());

        let end = match announced {
            Some(len) => start + len,
            None => match find(&raw[start..], b"\r\n)\r\n") {
                Some(offset) => start + offset,
                None => break,
            },
        };

        blocks.push(String::from_utf8_lossy(&raw[start..end]).into_owned());
        pos = end;
    }

    if blocks.is_empty() {
        blocks.push(String::from_utf8_lossy(raw).into_owned());
    }
    blocks
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Formats a string as an IMAP quoted string.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"hello\r\n"), Some(5));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"no newline"), None);
        assert_eq!(find_crlf(b"just\n"), None);
    }

    #[test]
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"* 1 FETCH (BODY[] {123}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"A0001 APPEND INBOX {5+}\r\n"), Some(5));
        assert_eq!(parse_literal_length(b"* OK ready\r\n"), None);
        assert_eq!(parse_literal_length(b"* 1 FETCH {}\r\n"), None);
        assert_eq!(parse_literal_length(b"{12}"), None);
    }

    #[test]
    fn test_scanner_finds_tagged_line() {
        let buf = b"* 3 EXISTS\r\nA0002 OK done\r\n";
        let mut scanner = TaggedScanner::new("A0002");
        assert_eq!(scanner.advance(buf).unwrap(), Some(buf.len()));
    }

    #[test]
    fn test_scanner_waits_for_partial_line() {
        let mut scanner = TaggedScanner::new("A0001");
        assert_eq!(scanner.advance(b"* OK [UIDNEXT 3]\r\nA0001 O").unwrap(), None);
        assert_eq!(
            scanner.advance(b"* OK [UIDNEXT 3]\r\nA0001 OK\r\n").unwrap(),
            Some(28)
        );
    }

    #[test]
    fn test_scanner_ignores_tag_inside_literal() {
        let buf = b"* 1 FETCH (BODY[HEADER] {17}\r\nA0003 OK fake\r\n\r\n)\r\nA0003 OK FETCH done\r\n";
        let mut scanner = TaggedScanner::new("A0003");
        assert_eq!(scanner.advance(buf).unwrap(), Some(buf.len()));
    }

    #[test]
    fn test_scanner_ignores_tag_substring() {
        let buf = b"* 1 FETCH (FLAGS (XA0004 OK))\r\nA0004 OK\r\n";
        let mut scanner = TaggedScanner::new("A0004");
        assert_eq!(scanner.advance(buf).unwrap(), Some(buf.len()));

        let mut other = TaggedScanner::new("A000");
        assert_eq!(other.advance(b"A0004 OK\r\n").unwrap(), None);
    }

    #[test]
    fn test_scanner_waits_for_literal_bytes() {
        let mut scanner = TaggedScanner::new("A0001");
        assert_eq!(scanner.advance(b"* 1 FETCH (BODY[] {10}\r\nA0001").unwrap(), None);
    }

    #[test]
    fn test_scanner_rejects_huge_literal() {
        let mut scanner = TaggedScanner::new("A0001");
        let err = scanner
            .advance(b"* 1 FETCH (BODY[] {999999999999}\r\n")
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_tagged_response_status() {
        let ok = TaggedResponse::parse("A0001", b"* CAPABILITY IMAP4rev1\r\nA0001 OK LOGIN completed\r\n".to_vec()).unwrap();
        assert!(ok.is_ok());
        assert_eq!(ok.text, "LOGIN completed");

        let no = TaggedResponse::parse("A0002", b"A0002 NO [AUTHENTICATIONFAILED] nope\r\n".to_vec()).unwrap();
        assert_eq!(no.status, Status::No);
        assert!(matches!(no.into_ok(), Err(Error::No(_))));

        let bad = TaggedResponse::parse("A0003", b"A0003 BAD syntax\r\n".to_vec()).unwrap();
        assert!(matches!(bad.into_ok(), Err(Error::Bad(_))));
    }

    #[test]
    fn test_tagged_response_invalid() {
        let err = TaggedResponse::parse("A0001", b"A0001 MAYBE\r\n".to_vec()).unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_list_quoted() {
        let entry =
            parse_list_line("* LIST (\\HasNoChildren) \"/\" \"Work/Projects\"").unwrap();
        assert_eq!(entry.name, "Work/Projects");
        assert_eq!(entry.delimiter.as_deref(), Some("/"));
        assert_eq!(entry.attributes, vec!["\\HasNoChildren"]);
        assert_eq!(entry.leaf_name(), "Projects");
        assert_eq!(entry.parent_name(), Some("Work"));
        assert!(entry.is_selectable());
    }

    #[test]
    fn test_parse_list_atom_and_nil() {
        let entry = parse_list_line("* LIST (\\HasChildren) \".\" INBOX").unwrap();
        assert_eq!(entry.name, "INBOX");
        assert_eq!(entry.leaf_name(), "INBOX");
        assert_eq!(entry.parent_name(), None);

        let flat = parse_list_line("* LIST () NIL \"Archive\"").unwrap();
        assert_eq!(flat.delimiter, None);
        assert_eq!(flat.name, "Archive");
    }

    #[test]
    fn test_parse_list_noselect() {
        let entry = parse_list_line("* LIST (\\Noselect \\HasChildren) \"/\" \"[Gmail]\"").unwrap();
        assert!(!entry.is_selectable());
    }

    #[test]
    fn test_parse_list_skips_other_lines() {
        assert!(parse_list_line("* LSUB () \"/\" \"INBOX\"").is_none());
        assert!(parse_list_line("A0003 OK LIST completed").is_none());
        assert!(parse_list_line("* LIST (\\HasNoChildren) \"/\" {5}").is_none());
    }

    #[test]
    fn test_parse_select() {
        let status = parse_select(
            "* 172 EXISTS\r\n* OK [UIDNEXT 305] Predicted next UID\r\nA0003 OK [READ-WRITE] SELECT completed\r\n",
        );
        assert_eq!(status.message_count, 172);
        assert_eq!(status.uid_next, Some(305));
        assert_eq!(status.uid_validity, None);
    }

    #[test]
    fn test_parse_select_full() {
        let status = parse_select(
            "* FLAGS (\\Answered \\Seen)\r\n* 0 EXISTS\r\n* 0 RECENT\r\n* OK [UIDVALIDITY 3857529045] UIDs valid\r\n* OK [UIDNEXT 1] next\r\nA0002 OK\r\n",
        );
        assert_eq!(status.message_count, 0);
        assert_eq!(status.uid_next, Some(1));
        assert_eq!(status.uid_validity, Some(3_857_529_045));
    }

    #[test]
    fn test_parse_select_missing_values() {
        assert_eq!(parse_select("A0002 OK\r\n"), FolderStatus::default());
    }

    #[test]
    fn test_extract_header_blocks() {
        let raw = b"* 1 FETCH (BODY[HEADER] {22}\r\nSubject: one\r\nX: 1\r\n\r\n)\r\n* 2 FETCH (BODY[HEADER] {14}\r\nSubject: two\r\n)\r\nA0004 OK FETCH completed\r\n";
        let blocks = extract_header_blocks(raw);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], "Subject: one\r\nX: 1\r\n\r\n");
        assert_eq!(blocks[1], "Subject: two\r\n");
    }

    #[test]
    fn test_extract_header_blocks_without_usable_length() {
        let raw = b"* 1 FETCH (BODY[HEADER] {999}\r\nSubject: short\r\n\r\n)\r\nA0004 OK\r\n";
        let blocks = extract_header_blocks(raw);
        assert_eq!(blocks, vec!["Subject: short\r\n".to_string()]);
    }

    #[test]
    fn test_extract_header_blocks_fallback() {
        let raw = b"A0004 OK FETCH completed\r\n";
        let blocks = extract_header_blocks(raw);
        assert_eq!(blocks, vec!["A0004 OK FETCH completed\r\n".to_string()]);
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("user@example.com"), "\"user@example.com\"");
        assert_eq!(quote("pa\"ss\\word"), "\"pa\\\"ss\\\\word\"");
    }

    proptest! {
        #[test]
        fn prop_scanner_finds_tag_after_any_untagged_lines(
            lines in proptest::collection::vec("[a-zA-Z0-9 ]{0,40}", 0..8)
        ) {
            let mut buf = Vec::new();
            for line in &lines {
                buf.extend_from_slice(b"* ");
                buf.extend_from_slice(line.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            buf.extend_from_slice(b"A0009 OK done\r\n");
            let mut scanner = TaggedScanner::new("A0009");
            prop_assert_eq!(scanner.advance(&buf).unwrap(), Some(buf.len()));
        }
    }
}

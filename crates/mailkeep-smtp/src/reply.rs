//! SMTP reply framing and parsing.
//!
//! A reply is one or more lines sharing a three-digit code. Continuation
//! lines carry a `-` after the code; the final line carries a space (or
//! nothing at all).

use std::fmt;

use crate::{Error, Result};

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(pub u16);

impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication successful
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 251 User not local; will forward
    pub const USER_NOT_LOCAL: Self = Self(251);
    /// 334 Server challenge (AUTH continuation)
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);

    /// Returns true for 2xx codes.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns true for 3xx codes.
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        self.0 >= 300 && self.0 < 400
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A complete SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code.
    pub code: ReplyCode,
    /// Raw reply lines without line endings, code prefix included.
    pub lines: Vec<String>,
}

impl Reply {
    /// Returns true if the code is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_positive()
    }

    /// Returns true if the reply carries `code`.
    #[must_use]
    pub fn is(&self, code: ReplyCode) -> bool {
        self.code == code
    }

    /// Returns the text of every line with the code prefix removed, joined
    /// by spaces.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.get(4..).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Returns true if `line` ends a reply: three digits, then a space or the
/// end of the line.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.len() >= 3
        && bytes[..3].iter().all(u8::is_ascii_digit)
        && (bytes.len() == 3 || bytes[3] == b' ')
}

/// Returns the length of the first complete reply in `buf`.
///
/// Every complete line is inspected; the reply ends after the first line
/// that [`is_last_reply_line`] accepts. Incomplete trailing data is ignored.
#[must_use]
pub fn reply_end(buf: &[u8]) -> Option<usize> {
    let mut start = 0;
    while let Some(offset) = buf[start..].iter().position(|&b| b == b'\n') {
        let end = start + offset + 1;
        let line = trim_line_end(&buf[start..end]);
        if is_last_reply_line(&String::from_utf8_lossy(line)) {
            return Some(end);
        }
        start = end;
    }
    None
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Parses a complete reply.
///
/// # Errors
///
/// Returns `Protocol` if the reply is empty, a line lacks a numeric code, or
/// the lines disagree on the code.
pub fn parse_reply(raw: &[u8]) -> Result<Reply> {
    let lines: Vec<String> = raw
        .split(|&b| b == b'\n')
        .map(trim_line_end)
        .filter(|line| !line.is_empty())
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect();

    let first = lines
        .first()
        .ok_or_else(|| Error::Protocol("empty reply".to_string()))?;
    let code = parse_code(first)?;

    for line in &lines[1..] {
        if parse_code(line)? != code {
            return Err(Error::Protocol(format!("inconsistent reply codes: {line}")));
        }
    }

    Ok(Reply { code, lines })
}

fn parse_code(line: &str) -> Result<ReplyCode> {
    line.get(..3)
        .filter(|code| code.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|code| code.parse().ok())
        .map(ReplyCode)
        .ok_or_else(|| Error::Protocol(format!("invalid reply line: {line}")))
}

//! Response framing and parsing.
//!
//! POP3 replies start with `+OK` or `-ERR`. Single-line replies end at the
//! first line break; multi-line replies (LIST, UIDL, RETR) end with a line
//! holding a single `.`.

use crate::{Error, Result};

/// Bounds on how much a single reply may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseLimits {
    /// Maximum reply size in bytes.
    pub max_bytes: usize,
    /// Maximum number of reads spent on one reply.
    pub max_reads: usize,
}

impl Default for ResponseLimits {
    fn default() -> Self {
        Self {
            max_bytes: 1_000_000,
            max_reads: 100,
        }
    }
}

/// Returns the end offset of the first line, if a full line has arrived.
///
/// A line normally ends at `\n`. A bare `\r` also ends a line once the next
/// byte is known not to be `\n`.
pub(crate) fn first_line_end(buf: &[u8]) -> Option<usize> {
    if let Some(lf) = buf.iter().position(|&b| b == b'\n') {
        return Some(lf + 1);
    }
    buf.iter()
        .position(|&b| b == b'\r')
        .filter(|&cr| cr + 1 < buf.len())
        .map(|cr| cr + 1)
}

/// Decides whether `buf` holds a complete reply.
///
/// Only a `+OK` reply to a multi-line command carries a payload; `-ERR`
/// and anything unrecognised end with their first line.
#[must_use]
pub fn is_complete(buf: &[u8], multiline: bool) -> bool {
    if multiline && buf.starts_with(b"+OK") {
        buf.ends_with(b"\r\n.\r\n") || buf.ends_with(b"\n.\n")
    } else {
        first_line_end(buf).is_some()
    }
}

/// A complete POP3 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// True for `+OK`.
    pub ok: bool,
    /// Text after the status indicator on the first line.
    pub text: String,
    /// Multi-line payload, terminator removed and dot-stuffing undone.
    pub lines: Vec<String>,
}

impl Reply {
    /// Parses a complete reply.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` if the first line is neither `+OK` nor `-ERR`.
    pub fn parse(raw: &[u8], multiline: bool) -> Result<Self> {
        let end = first_line_end(raw).unwrap_or(raw.len());
        let first = String::from_utf8_lossy(&raw[..end]);
        let rest = String::from_utf8_lossy(&raw[end..]);
        let first = first.trim_end_matches(['\r', '\n']);

        let (ok, status_text) = if let Some(rest) = first.strip_prefix("+OK") {
            (true, rest)
        } else if let Some(rest) = first.strip_prefix("-ERR") {
            (false, rest)
        } else {
            return Err(Error::InvalidResponse(first.to_string()));
        };

        let lines = if ok && multiline {
            payload_lines(&rest)
        } else {
            Vec::new()
        };

        Ok(Self {
            ok,
            text: status_text.trim().to_string(),
            lines,
        })
    }

    /// Returns the payload joined with CRLF.
    #[must_use]
    pub fn body(&self) -> String {
        self.lines.join("\r\n")
    }
}

/// Splits a multi-line payload, dropping the terminator line and undoing
/// byte-stuffing.
fn payload_lines(payload: &str) -> Vec<String> {
    let mut lines: Vec<&str> = payload
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();

    // The split leaves an empty tail after the final line break.
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    if lines.last() == Some(&".") {
        lines.pop();
    }

    lines
        .into_iter()
        .map(|line| line.strip_prefix('.').filter(|l| l.starts_with('.')).unwrap_or(line))
        .map(str::to_string)
        .collect()
}

/// Mailbox summary from STAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxStat {
    /// Number of messages.
    pub count: u32,
    /// Total size in octets.
    pub size: u64,
}

/// Parses `+OK <count> <size> [extra...]`, taking the first two numbers.
///
/// # Errors
///
/// Returns `InvalidResponse` if fewer than two numbers are present.
pub fn parse_stat(text: &str) -> Result<MailboxStat> {
    let mut numbers = text.split_whitespace().filter_map(|t| t.parse::<u64>().ok());
    match (numbers.next(), numbers.next()) {
        (Some(count), Some(size)) => Ok(MailboxStat {
            count: u32::try_from(count)
                .map_err(|_| Error::InvalidResponse(text.to_string()))?,
            size,
        }),
        _ => Err(Error::InvalidResponse(text.to_string())),
    }
}

/// One line of a LIST reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageInfo {
    /// Message number within this session.
    pub number: u32,
    /// Size in octets.
    pub size: u64,
}

/// One line of a UIDL reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidlEntry {
    /// Message number within this session.
    pub number: u32,
    /// Server-unique, persistent message identifier.
    pub uid: String,
}

/// Parses LIST payload lines; malformed lines are skipped.
#[must_use]
pub fn parse_list(lines: &[String]) -> Vec<MessageInfo> {
    lines
        .iter()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some(MessageInfo {
                number: parts.next()?.parse().ok()?,
                size: parts.next()?.parse().ok()?,
            })
        })
        .collect()
}

/// Parses UIDL payload lines; malformed lines are skipped.
#[must_use]
pub fn parse_uidl(lines: &[String]) -> Vec<UidlEntry> {
    lines
        .iter()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some(UidlEntry {
                number: parts.next()?.parse().ok()?,
                uid: parts.next()?.to_string(),
            })
        })
        .collect()
}

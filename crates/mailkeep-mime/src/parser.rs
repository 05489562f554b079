//! RFC 822/2822 message parsing.
//!
//! Single-part messages only: the body is classified as plain text or HTML
//! from `Content-Type` and returned verbatim.

use chrono::{DateTime, Utc};

use crate::address::Address;
use crate::encoding::decode_header_value;
use crate::error::{Error, Result};
use crate::headers::Headers;

/// RFC 2822 date-time, the only accepted `Date` layout.
pub const RFC2822_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Separator between the header block and the body.
const BODY_SEPARATOR: &str = "\r\n\r\n";

/// Structured view of a raw message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    /// `Message-ID` header, verbatim.
    pub message_id: Option<String>,
    /// `Subject`, with a whole-value RFC 2047 word decoded.
    pub subject: Option<String>,
    /// First parseable `From` address.
    pub from: Option<Address>,
    /// `To` addresses.
    pub to: Vec<Address>,
    /// `Cc` addresses.
    pub cc: Vec<Address>,
    /// `Date`, if it matches [`RFC2822_DATE_FORMAT`].
    pub date: Option<DateTime<Utc>>,
    /// Body when it is not HTML.
    pub body_plain: Option<String>,
    /// Body when `Content-Type` names `text/html`.
    pub body_html: Option<String>,
    /// All headers after unfolding.
    pub headers: Headers,
}

/// Parses a raw message.
///
/// The header block ends at the first `\r\n\r\n`; everything after it is
/// the body. Input without that separator is treated as headers only.
///
/// # Errors
///
/// Returns `InvalidFormat` if the input is blank or contains no header.
pub fn parse(raw: &str) -> Result<ParsedMessage> {
    if raw.trim().is_empty() {
        return Err(Error::InvalidFormat("empty message".to_string()));
    }

    let (header_text, body) = match raw.split_once(BODY_SEPARATOR) {
        Some((headers, body)) => (headers, Some(body)),
        None => (raw, None),
    };

    let headers = Headers::parse(header_text);
    if headers.is_empty() {
        return Err(Error::InvalidFormat("no headers found".to_string()));
    }

    let (body_plain, body_html) = match body {
        Some(body) if is_html(&headers) => (None, Some(body.to_string())),
        Some(body) => (Some(body.to_string()), None),
        None => (None, None),
    };

    Ok(ParsedMessage {
        message_id: headers.get("Message-ID").map(str::to_string),
        subject: headers.get("Subject").map(decode_subject),
        from: headers.get("From").and_then(Address::parse),
        to: headers.get("To").map(Address::parse_list).unwrap_or_default(),
        cc: headers.get("Cc").map(Address::parse_list).unwrap_or_default(),
        date: headers.get("Date").and_then(parse_date),
        body_plain,
        body_html,
        headers,
    })
}

/// Parses an RFC 2822 date, returning `None` on any deviation from
/// [`RFC2822_DATE_FORMAT`].
#[must_use]
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(text.trim(), RFC2822_DATE_FORMAT)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

fn is_html(headers: &Headers) -> bool {
    headers
        .get("Content-Type")
        .is_some_and(|value| value.to_ascii_lowercase().contains("text/html"))
}

fn decode_subject(value: &str) -> String {
    decode_header_value(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SIMPLE: &str = concat!(
        "Message-ID: <1234@example.com>\r\n",
        "From: \"Alice Smith\" <alice@example.com>\r\n",
        "To: bob@example.com, Carol <carol@example.com>\r\n",
        "Cc: dave@example.com\r\n",
        "Subject: Lunch\r\n",
        "Date: Tue, 05 Mar 2024 14:30:00 +0100\r\n",
        "\r\n",
        "See you at noon.\r\n"
    );

    #[test]
    fn test_parse_simple_message() {
        let msg = parse(SIMPLE).unwrap();
        assert_eq!(msg.message_id.as_deref(), Some("<1234@example.com>"));
        assert_eq!(msg.subject.as_deref(), Some("Lunch"));
        assert_eq!(
            msg.from,
            Some(Address::with_name("Alice Smith", "alice@example.com"))
        );
        assert_eq!(msg.to.len(), 2);
        assert_eq!(msg.to[1], Address::with_name("Carol", "carol@example.com"));
        assert_eq!(msg.cc, vec![Address::new("dave@example.com")]);
        assert_eq!(
            msg.date,
            Some(Utc.with_ymd_and_hms(2024, 3, 5, 13, 30, 0).unwrap())
        );
        assert_eq!(msg.body_plain.as_deref(), Some("See you at noon.\r\n"));
        assert_eq!(msg.body_html, None);
    }

    #[test]
    fn test_body_keeps_later_blank_lines() {
        let msg = parse("Subject: x\r\n\r\npara one\r\n\r\npara two").unwrap();
        assert_eq!(msg.body_plain.as_deref(), Some("para one\r\n\r\npara two"));
    }

    #[test]
    fn test_html_body() {
        let raw = "Subject: x\r\nContent-Type: TEXT/HTML; charset=UTF-8\r\n\r\n<p>Hi</p>";
        let msg = parse(raw).unwrap();
        assert_eq!(msg.body_html.as_deref(), Some("<p>Hi</p>"));
        assert_eq!(msg.body_plain, None);
    }

    #[test]
    fn test_other_content_type_is_plain() {
        let raw = "Subject: x\r\nContent-Type: multipart/mixed; boundary=b\r\n\r\n--b";
        let msg = parse(raw).unwrap();
        assert_eq!(msg.body_plain.as_deref(), Some("--b"));
    }

    #[test]
    fn test_headers_only() {
        let msg = parse("Subject: just headers\r\nFrom: a@example.com\r\n").unwrap();
        assert_eq!(msg.subject.as_deref(), Some("just headers"));
        assert_eq!(msg.body_plain, None);
        assert_eq!(msg.body_html, None);
    }

    #[test]
    fn test_folded_header() {
        let raw = "Subject: part one\r\n part two\r\n\tpart three\r\n\r\nbody";
        let msg = parse(raw).unwrap();
        assert_eq!(msg.subject.as_deref(), Some("part onepart twopart three"));
    }

    #[test]
    fn test_encoded_subject_decoded() {
        let msg = parse("Subject: =?UTF-8?B?SMOpbGxv?=\r\n\r\n").unwrap();
        assert_eq!(msg.subject.as_deref(), Some("Héllo"));

        let broken = parse("Subject: =?UTF-8?B?!!!?=\r\n\r\n").unwrap();
        assert_eq!(broken.subject.as_deref(), Some("=?UTF-8?B?!!!?="));
    }

    #[test]
    fn test_bad_date_is_none() {
        let msg = parse("Date: yesterday\r\nSubject: x\r\n").unwrap();
        assert_eq!(msg.date, None);
        assert!(parse_date("Tue, 05 Mar 2024 14:30:00 +0100 (CET)").is_none());
    }

    #[test]
    fn test_invalid_format() {
        assert!(matches!(parse(""), Err(Error::InvalidFormat(_))));
        assert!(matches!(parse("  \r\n"), Err(Error::InvalidFormat(_))));
        assert!(matches!(
            parse("no headers here\r\n\r\nbody"),
            Err(Error::InvalidFormat(_))
        ));
    }
}

//! Base64 and RFC 2047 header encoding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data).map_err(Into::into)
}

/// Encodes a header value as a single RFC 2047 `B` word when it contains
/// any non-ASCII character.
///
/// ASCII values pass through unchanged. There is no word-level splitting:
/// the whole value becomes one `=?UTF-8?B?...?=` word.
#[must_use]
pub fn encode_header_value(text: &str) -> String {
    if text.is_ascii() {
        return text.to_string();
    }
    format!("=?UTF-8?B?{}?=", encode_base64(text.as_bytes()))
}

/// Decodes a value that consists of exactly one RFC 2047 encoded word.
///
/// Values that are not an encoded word are returned unchanged. Only the
/// UTF-8 (and US-ASCII) charsets are understood.
///
/// # Errors
///
/// Returns an error if the value looks like an encoded word but its charset,
/// encoding or payload is invalid.
pub fn decode_header_value(text: &str) -> Result<String> {
    let Some(inner) = text
        .trim()
        .strip_prefix("=?")
        .and_then(|rest| rest.strip_suffix("?="))
    else {
        return Ok(text.to_string());
    };

    let mut parts = inner.splitn(3, '?');
    let (Some(charset), Some(encoding), Some(payload)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::InvalidEncoding(text.to_string()));
    };

    if !charset.eq_ignore_ascii_case("utf-8") && !charset.eq_ignore_ascii_case("us-ascii") {
        return Err(Error::InvalidEncoding(format!("unsupported charset {charset}")));
    }

    let bytes = match encoding {
        "B" | "b" => decode_base64(payload)?,
        "Q" | "q" => decode_q(payload)?,
        other => {
            return Err(Error::InvalidEncoding(format!("unknown encoding {other}")));
        }
    };
    String::from_utf8(bytes).map_err(Into::into)
}

/// Decodes the RFC 2047 `Q` encoding (quoted-printable with `_` for space).
fn decode_q(payload: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(payload.len());
    let mut bytes = payload.bytes();

    while let Some(b) = bytes.next() {
        match b {
            b'_' => out.push(b' '),
            b'=' => {
                let hex = [bytes.next(), bytes.next()];
                let [Some(hi), Some(lo)] = hex else {
                    return Err(Error::InvalidEncoding(
                        "incomplete escape sequence".to_string(),
                    ));
                };
                let digits = [hi, lo];
                let hex = std::str::from_utf8(&digits)
                    .map_err(|_| Error::InvalidEncoding("invalid hex".to_string()))?;
                let byte = u8::from_str_radix(hex, 16)
                    .map_err(|e| Error::InvalidEncoding(format!("invalid hex: {e}")))?;
                out.push(byte);
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_encode_decode() {
        let encoded = encode_base64(b"Hello, World!");
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");
        assert_eq!(decode_base64(&encoded).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_ascii_passes_through() {
        assert_eq!(encode_header_value("Quarterly report"), "Quarterly report");
        assert_eq!(encode_header_value(""), "");
    }

    #[test]
    fn test_non_ascii_encoded_whole() {
        assert_eq!(encode_header_value("Héllo"), "=?UTF-8?B?SMOpbGxv?=");
        assert_eq!(
            encode_header_value("Re: 会議"),
            format!("=?UTF-8?B?{}?=", encode_base64("Re: 会議".as_bytes()))
        );
    }

    #[test]
    fn test_decode_b_word() {
        assert_eq!(decode_header_value("=?UTF-8?B?SMOpbGxv?=").unwrap(), "Héllo");
        assert_eq!(decode_header_value("=?utf-8?b?SMOpbGxv?=").unwrap(), "Héllo");
    }

    #[test]
    fn test_decode_q_word() {
        assert_eq!(
            decode_header_value("=?utf-8?Q?H=C3=A9llo_there?=").unwrap(),
            "Héllo there"
        );
    }

    #[test]
    fn test_decode_plain_value_unchanged() {
        assert_eq!(decode_header_value("Hello").unwrap(), "Hello");
    }

    #[test]
    fn test_decode_rejects_bad_words() {
        assert!(decode_header_value("=?UTF-8?X?abc?=").is_err());
        assert!(decode_header_value("=?KOI8-R?B?abc?=").is_err());
        assert!(decode_header_value("=?UTF-8?B?!!!?=").is_err());
        assert!(decode_header_value("=?UTF-8?Q?=4?=").is_err());
    }
}

//! RFC 5322 message composition.

use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset, Local};
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::address::Address;
use crate::encoding::encode_header_value;
use crate::error::{Error, Result};
use crate::parser::RFC2822_DATE_FORMAT;

/// Inputs for one outgoing message.
///
/// # Example
///
/// ```ignore
/// use mailkeep_mime::{Address, Draft};
///
/// let raw = Draft::new(Address::new("alice@example.com"))
///     .to(Address::with_name("Bob", "bob@example.com"))
///     .subject("Lunch?")
///     .body("Noon at the usual place.")
///     .compose()?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Sender.
    pub from: Address,
    /// Primary recipients; at least one is required.
    pub to: Vec<Address>,
    /// Carbon-copy recipients.
    pub cc: Vec<Address>,
    /// Blind recipients; used for the envelope only, never written as a
    /// header.
    pub bcc: Vec<Address>,
    /// Subject line.
    pub subject: String,
    /// Body text, sent verbatim.
    pub body: String,
    /// Whether `body` is HTML.
    pub is_html: bool,
    /// Explicit Message-ID; generated when `None`.
    pub message_id: Option<String>,
    /// Message-ID being replied to.
    pub in_reply_to: Option<String>,
    /// Thread ancestry, oldest first.
    pub references: Vec<String>,
}

impl Draft {
    /// Creates an empty draft from `from`.
    #[must_use]
    pub const fn new(from: Address) -> Self {
        Self {
            from,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: String::new(),
            body: String::new(),
            is_html: false,
            message_id: None,
            in_reply_to: None,
            references: Vec::new(),
        }
    }

    /// Adds a `To` recipient.
    #[must_use]
    pub fn to(mut self, address: Address) -> Self {
        self.to.push(address);
        self
    }

    /// Adds a `Cc` recipient.
    #[must_use]
    pub fn cc(mut self, address: Address) -> Self {
        self.cc.push(address);
        self
    }

    /// Adds a blind recipient.
    #[must_use]
    pub fn bcc(mut self, address: Address) -> Self {
        self.bcc.push(address);
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets a plain-text body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.is_html = false;
        self
    }

    /// Sets an HTML body.
    #[must_use]
    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.is_html = true;
        self
    }

    /// Uses `id` instead of a generated Message-ID.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Marks the draft as a reply to `id`.
    #[must_use]
    pub fn in_reply_to(mut self, id: impl Into<String>) -> Self {
        self.in_reply_to = Some(id.into());
        self
    }

    /// Appends a thread ancestor.
    #[must_use]
    pub fn reference(mut self, id: impl Into<String>) -> Self {
        self.references.push(id.into());
        self
    }

    /// Returns every address the message is delivered to: To, Cc, then Bcc.
    #[must_use]
    pub fn envelope_recipients(&self) -> Vec<String> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(|address| address.email.clone())
            .collect()
    }

    /// Serializes the draft, dated now.
    ///
    /// # Errors
    ///
    /// See [`Draft::compose_at`].
    pub fn compose(&self) -> Result<String> {
        self.compose_at(Local::now().fixed_offset())
    }

    /// Serializes the draft with `Date` (and any generated Message-ID) taken
    /// from `now`.
    ///
    /// Headers are emitted in a fixed order: Message-ID, Date, From, To, Cc,
    /// Subject, In-Reply-To, References, MIME-Version, Content-Type,
    /// Content-Transfer-Encoding. Empty optional headers are omitted.
    ///
    /// # Errors
    ///
    /// Returns `MissingRecipient` if `to` is empty, `InvalidAddress` if
    /// any address is not `local@domain`, and `InvalidFormat` if a header
    /// value contains CR or LF.
    pub fn compose_at(&self, now: DateTime<FixedOffset>) -> Result<String> {
        if self.to.is_empty() {
            return Err(Error::MissingRecipient);
        }
        if let Some(bad) = std::iter::once(&self.from)
            .chain(&self.to)
            .chain(&self.cc)
            .chain(&self.bcc)
            .find(|address| !address.is_valid())
        {
            return Err(Error::InvalidAddress(bad.email.clone()));
        }
        self.check_line_breaks()?;

        let message_id = self
            .message_id
            .clone()
            .unwrap_or_else(|| generate_message_id(&self.from, now));

        let mut out = String::with_capacity(512 + self.body.len());
        push_header(&mut out, "Message-ID", &message_id);
        push_header(&mut out, "Date", &now.format(RFC2822_DATE_FORMAT).to_string());
        push_header(&mut out, "From", &self.from.to_string());
        push_header(&mut out, "To", &format_list(&self.to));
        if !self.cc.is_empty() {
            push_header(&mut out, "Cc", &format_list(&self.cc));
        }
        push_header(&mut out, "Subject", &encode_header_value(&self.subject));
        if let Some(parent) = &self.in_reply_to {
            push_header(&mut out, "In-Reply-To", parent);
        }
        if !self.references.is_empty() {
            push_header(&mut out, "References", &self.references.join(" "));
        }
        push_header(&mut out, "MIME-Version", "1.0");
        push_header(
            &mut out,
            "Content-Type",
            if self.is_html {
                "text/html; charset=UTF-8"
            } else {
                "text/plain; charset=UTF-8"
            },
        );
        push_header(&mut out, "Content-Transfer-Encoding", "8bit");

        out.push_str("\r\n");
        out.push_str(&self.body);
        Ok(out)
    }
}

impl Draft {
    /// Rejects header values that would end their header line early.
    fn check_line_breaks(&self) -> Result<()> {
        let names = std::iter::once(&self.from)
            .chain(&self.to)
            .chain(&self.cc)
            .filter_map(|address| address.name.as_deref().map(|name| ("address name", name)));
        let fields = [("Subject", self.subject.as_str())]
            .into_iter()
            .chain(self.message_id.as_deref().map(|id| ("Message-ID", id)))
            .chain(self.in_reply_to.as_deref().map(|id| ("In-Reply-To", id)))
            .chain(self.references.iter().map(|id| ("References", id.as_str())))
            .chain(names);

        for (field, value) in fields {
            if value.contains(['\r', '\n']) {
                return Err(Error::InvalidFormat(format!("line break in {field}")));
            }
        }
        Ok(())
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, "{name}: {value}\r\n");
}

fn format_list(addresses: &[Address]) -> String {
    addresses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds `<unix-seconds.random8@domain>`, falling back to `localhost` when
/// the sender has no domain.
#[must_use]
pub fn generate_message_id(from: &Address, now: DateTime<FixedOffset>) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let domain = from.domain().unwrap_or("localhost");
    format!("<{}.{token}@{domain}>", now.timestamp())
}

//! Mailbox addresses.

use std::fmt;

/// An email address with an optional display name.
///
/// Equality is structural: two addresses are equal when both the name and
/// the email match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address {
    /// Display name, if any.
    pub name: Option<String>,
    /// The `local@domain` part.
    pub email: String,
}

impl Address {
    /// Creates an address without a display name.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Creates an address with a display name.
    #[must_use]
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Parses `Name <email>`, `"Name" <email>`, `<email>` or a bare email.
    ///
    /// Returns `None` when no email remains after trimming.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let (name, email) = match (text.find('<'), text.find('>')) {
            (Some(open), Some(close)) if open < close => {
                let name = text[..open].trim().trim_matches('"').trim();
                (
                    (!name.is_empty()).then(|| name.to_string()),
                    text[open + 1..close].trim(),
                )
            }
            _ => (None, text.trim()),
        };

        if email.is_empty() {
            return None;
        }
        Some(Self {
            name,
            email: email.to_string(),
        })
    }

    /// Parses a comma-separated address list, dropping entries that do not
    /// parse.
    ///
    /// Commas inside quoted display names are not recognised.
    #[must_use]
    pub fn parse_list(text: &str) -> Vec<Self> {
        text.split(',').filter_map(Self::parse).collect()
    }

    /// Returns true for `local@domain` with exactly one `@`, both sides
    /// non-empty, and no whitespace or angle brackets.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let mut parts = self.email.split('@');
        let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
            return false;
        };
        !local.is_empty()
            && !domain.is_empty()
            && !self
                .email
                .chars()
                .any(|c| c.is_whitespace() || c == '<' || c == '>')
    }

    /// Returns the domain part, if the address has one.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty())
    }

    /// Returns the display name, or the email when there is none.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

/// Formats as `"Name" <email>` or a bare `email`.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => write!(f, "\"{name}\" <{}>", self.email),
            _ => f.write_str(&self.email),
        }
    }
}

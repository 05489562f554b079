//! Command tags.
//!
//! Tags match commands with their completion responses.

/// Tag generator for one IMAP connection.
///
/// Produces `A0001`, `A0002`, and so on. The counter restarts whenever a new
/// connection is opened.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { counter: 0, prefix }
    }

    /// Generates the next tag.
    #[must_use]
    pub fn next(&mut self) -> String {
        self.counter = self.counter.wrapping_add(1);
        format!("{}{:04}", self.prefix, self.counter)
    }

    /// Returns the number of tags issued on this connection.
    #[must_use]
    pub const fn issued(&self) -> u32 {
        self.counter
    }

    /// Starts numbering from 1 again.
    pub const fn reset(&mut self) {
        self.counter = 0;
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tag_is_one() {
        let mut tags = TagGenerator::default();
        assert_eq!(tags.next(), "A0001");
        assert_eq!(tags.next(), "A0002");
        assert_eq!(tags.issued(), 2);
    }

    #[test]
    fn test_reset() {
        let mut tags = TagGenerator::new('B');
        let _ = tags.next();
        let _ = tags.next();
        tags.reset();
        assert_eq!(tags.next(), "B0001");
    }

    #[test]
    fn test_wide_counter() {
        let mut tags = TagGenerator::default();
        for _ in 0..10_000 {
            let _ = tags.next();
        }
        assert_eq!(tags.next(), "A10001");
    }
}

use chatline_common::{Error, Result};

/// Normalises free text typed by an actor or returned by a provider.
pub struct InputValidator;

impl InputValidator {
    /// Strip control characters (keeping newlines and tabs) and surrounding
    /// whitespace.
    pub fn sanitize(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Truncate to at most `max_chars` characters on a char boundary.
    pub fn truncate_chars(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            Some((byte_index, _)) => text[..byte_index].to_string(),
            None => text.to_string(),
        }
    }

    /// Sanitize and bound an outgoing message. Empty input is rejected.
    pub fn validate_message(text: &str, max_chars: usize) -> Result<String> {
        let cleaned = Self::sanitize(text);
        if cleaned.is_empty() {
            return Err(Error::General("message is empty".to_string()));
        }
        Ok(Self::truncate_chars(&cleaned, max_chars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_control_characters() {
        assert_eq!(InputValidator::sanitize("  hi\u{0007} there\n "), "hi there");
        assert_eq!(InputValidator::sanitize("a\tb\nc"), "a\tb\nc");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(InputValidator::truncate_chars("héllo", 2), "hé");
        assert_eq!(InputValidator::truncate_chars("short", 10), "short");
        assert_eq!(InputValidator::truncate_chars("🙂🙂🙂", 1), "🙂");
    }

    #[test]
    fn validate_message_rejects_blank_input() {
        assert!(InputValidator::validate_message(" \u{0000} ", 10).is_err());
        assert_eq!(
            InputValidator::validate_message("hello world", 5).unwrap(),
            "hello"
        );
    }
}

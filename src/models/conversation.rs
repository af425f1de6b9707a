use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TITLE_MAX_CHARS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derive a conversation title from the first user message.
pub fn title_from_message(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_title_is_kept() {
        assert_eq!(title_from_message("Hello there"), "Hello there");
    }

    #[test]
    fn test_long_title_is_truncated() {
        let text = "a".repeat(60);
        let title = title_from_message(&text);
        assert_eq!(title, format!("{}...", "a".repeat(50)));
    }

    #[test]
    fn test_exactly_fifty_chars_has_no_ellipsis() {
        let text = "b".repeat(50);
        assert_eq!(title_from_message(&text), text);
    }

    #[test]
    fn test_truncation_counts_chars_not_bytes() {
        let text = "é".repeat(55);
        let title = title_from_message(&text);
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), 53);
    }
}

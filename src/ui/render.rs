use std::io::Write;
use std::sync::Arc;

use chrono::Local;

use crate::models::{Conversation, Message, Role};
use crate::providers::ProviderError;
use crate::services::markdown::render_markdown;
use crate::services::TurnObserver;

const ASSISTANT_LABEL: &str = "\x1b[1;35massistant\x1b[0m";
const USER_LABEL: &str = "\x1b[1;36myou\x1b[0m";
const ERROR_STYLE: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Prints a streaming reply as it arrives.
pub struct TerminalObserver<W: Write + Send> {
    out: W,
    started: bool,
}

impl<W: Write + Send> TerminalObserver<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            started: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        let result = self
            .out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush());
        if let Err(e) = result {
            tracing::debug!("Failed to write to terminal: {}", e);
        }
    }
}

impl<W: Write + Send> TurnObserver for TerminalObserver<W> {
    fn on_delta(&mut self, _messages: &Arc<Vec<Message>>, delta: &str) {
        if !self.started {
            self.started = true;
            self.emit(&format!("{}\n", ASSISTANT_LABEL));
        }
        self.emit(delta);
    }

    fn on_error(&mut self, error: &ProviderError) {
        let lead = if self.started { "\n" } else { "" };
        self.emit(&format!(
            "{}{}{}{}\n",
            lead,
            ERROR_STYLE,
            error.user_message(),
            RESET
        ));
    }

    fn on_complete(&mut self, _content: &str) {
        if self.started {
            self.emit("\n");
        }
    }
}

pub fn format_conversation_list(conversations: &[Conversation], current: Option<&str>) -> String {
    if conversations.is_empty() {
        return "No conversations yet.\n".to_string();
    }
    let mut out = String::new();
    for (i, c) in conversations.iter().enumerate() {
        let marker = if current == Some(c.id.as_str()) { '*' } else { ' ' };
        out.push_str(&format!(
            "{} {:>3}. {}  {}\n",
            marker,
            i + 1,
            c.updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            c.title
        ));
    }
    out
}

pub fn format_message(message: &Message, markdown: bool) -> String {
    let label = match message.role {
        Role::User => USER_LABEL,
        Role::Assistant => ASSISTANT_LABEL,
    };
    let body = match (message.role, markdown) {
        (Role::Assistant, true) => render_markdown(&message.content),
        _ => message.content.clone(),
    };
    format!("{}\n{}\n", label, body)
}

pub fn format_history(messages: &[Message], markdown: bool) -> String {
    messages
        .iter()
        .map(|m| format_message(m, markdown))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::services::markdown::strip_ansi;

    fn conversation(id: &str, title: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_observer_prints_deltas_in_order() {
        let mut observer = TerminalObserver::new(Vec::new());
        let messages = Arc::new(Vec::new());
        observer.on_delta(&messages, "Hel");
        observer.on_delta(&messages, "lo");
        observer.on_complete("Hello");

        let printed = String::from_utf8(observer.into_inner()).unwrap();
        assert_eq!(strip_ansi(&printed), "assistant\nHello\n");
    }

    #[test]
    fn test_observer_prints_user_facing_error() {
        let mut observer = TerminalObserver::new(Vec::new());
        observer.on_error(&ProviderError::RateLimited);

        let printed = String::from_utf8(observer.into_inner()).unwrap();
        assert_eq!(
            strip_ansi(&printed),
            "Rate limit exceeded. Please wait a moment and try again.\n"
        );
    }

    #[test]
    fn test_conversation_list_marks_current() {
        let list = [conversation("a", "First"), conversation("b", "Second")];
        let text = format_conversation_list(&list, Some("b"));
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("    1. "));
        assert!(lines[0].ends_with("First"));
        assert!(lines[1].starts_with("*   2. "));
        assert_eq!(format_conversation_list(&[], None), "No conversations yet.\n");
    }

    #[test]
    fn test_history_renders_assistant_markdown() {
        let messages = [
            Message::new(Role::User, "**raw**"),
            Message::new(Role::Assistant, "**styled**"),
        ];
        let styled = strip_ansi(&format_history(&messages, true));
        assert_eq!(styled, "you\n**raw**\n\nassistant\nstyled\n");

        let plain = strip_ansi(&format_history(&messages, false));
        assert_eq!(plain, "you\n**raw**\n\nassistant\n**styled**\n");
    }
}

use crate::config::APP_NAME;

pub struct Suggestion {
    pub title: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
}

pub const SUGGESTIONS: [Suggestion; 4] = [
    Suggestion {
        title: "Code",
        description: "Write, debug, or explain code",
        prompt: "Help me write a Python script that fetches data from an API and saves it to a CSV file",
    },
    Suggestion {
        title: "Trading",
        description: "Strategies & market analysis",
        prompt: "Explain the RSI indicator and how to use it for trading decisions",
    },
    Suggestion {
        title: "Chat",
        description: "General conversation",
        prompt: "What are some effective techniques for learning new skills faster?",
    },
    Suggestion {
        title: "Create",
        description: "Brainstorm & ideas",
        prompt: "Help me brainstorm ideas for a side project that could generate passive income",
    },
];

/// Prompt for `/suggest <n>`, counting from one.
pub fn suggestion_prompt(n: usize) -> Option<&'static str> {
    n.checked_sub(1)
        .and_then(|i| SUGGESTIONS.get(i))
        .map(|s| s.prompt)
}

pub fn welcome_text(show_suggestions: bool) -> String {
    let mut text = format!(
        "{}\nYour personal AI assistant for coding, trading, and everything in between.\n",
        APP_NAME
    );
    if show_suggestions {
        text.push('\n');
        for (i, s) in SUGGESTIONS.iter().enumerate() {
            text.push_str(&format!("  {}. {:<8} {}\n", i + 1, s.title, s.description));
        }
        text.push_str("\nType a message, /suggest <n>, or /help.\n");
    }
    text
}

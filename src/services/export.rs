use std::path::Path;

use anyhow::{Context, Result};

use crate::models::{Conversation, Message, Role};

/// Render a conversation as a standalone markdown document.
pub fn export_to_markdown(conversation: &Conversation, messages: &[Message]) -> String {
    let mut output = format!("# {}\n\n", conversation.title);
    output.push_str(&format!(
        "> Started: {} | Messages: {}\n\n",
        conversation.created_at.format("%Y-%m-%d %H:%M"),
        messages.len()
    ));
    output.push_str("---\n\n");

    for msg in messages {
        let label = match msg.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        };
        output.push_str(&format!(
            "### {} · {}\n\n{}\n\n",
            label,
            msg.timestamp.format("%H:%M"),
            msg.content
        ));
    }

    output
}

pub fn write_export(path: &Path, conversation: &Conversation, messages: &[Message]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, export_to_markdown(conversation, messages))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Exported conversation {} to {}", conversation.id, path.display());
    Ok(())
}

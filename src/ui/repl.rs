use std::io::Write;
use std::path::Path;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use super::command::{Command, HELP};
use super::render::{format_conversation_list, format_history, TerminalObserver};
use super::welcome::{suggestion_prompt, welcome_text};
use crate::models::Conversation;
use crate::services::export::write_export;
use crate::services::{AppSettings, ChatSession, Database, SendOutcome, SettingsService};

enum Flow {
    Continue,
    Quit,
}

/// Line-oriented front end over a [`ChatSession`].
pub struct Repl<W: Write + Send> {
    session: ChatSession,
    db: Database,
    settings: AppSettings,
    out: W,
}

impl<W: Write + Send> Repl<W> {
    pub async fn new(session: ChatSession, db: Database, out: W) -> Self {
        let settings = SettingsService::load(&db).await;
        Self {
            session,
            db,
            settings,
            out,
        }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub async fn run<R>(&mut self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        if let Err(e) = self.session.refresh_conversations().await {
            tracing::error!("Error fetching conversations: {:#}", e);
        }
        let welcome = welcome_text(self.settings.show_suggestions);
        self.print(&welcome);

        let mut lines = input.lines();
        loop {
            self.print("\n> ");
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                self.print("\n");
                break;
            };

            if let Flow::Quit = self.handle(Command::parse(&line)).await {
                break;
            }
        }
        Ok(())
    }

    async fn handle(&mut self, command: Command) -> Flow {
        match command {
            Command::Empty => {}
            Command::Quit => return Flow::Quit,
            Command::Help => self.print(&format!("{}\n", HELP)),
            Command::Invalid(reason) => self.print(&format!("{}\n", reason)),
            Command::Send(text) => self.send(&text).await,
            Command::Suggest(n) => match suggestion_prompt(n) {
                Some(prompt) => {
                    self.print(&format!("{}\n", prompt));
                    self.send(prompt).await;
                }
                None => self.print("No such suggestion\n"),
            },
            Command::New => {
                self.session.new_chat();
                let welcome = welcome_text(self.settings.show_suggestions);
                self.print(&welcome);
            }
            Command::List => {
                if let Err(e) = self.session.refresh_conversations().await {
                    self.print(&format!("Failed to load conversations: {:#}\n", e));
                    return Flow::Continue;
                }
                let list = format_conversation_list(
                    self.session.conversations(),
                    self.session.current_conversation_id(),
                );
                self.print(&list);
            }
            Command::Open(target) => {
                let Some(id) = self.resolve(&target) else {
                    return Flow::Continue;
                };
                match self.session.load_conversation(&id).await {
                    Ok(()) => {
                        let history =
                            format_history(&self.session.messages(), self.settings.render_markdown);
                        self.print(&history);
                    }
                    Err(e) => self.print(&format!("Failed to open conversation: {:#}\n", e)),
                }
            }
            Command::Delete(target) => {
                let Some(id) = self.resolve(&target) else {
                    return Flow::Continue;
                };
                match self.session.delete_conversation(&id).await {
                    Ok(()) => self.print("Conversation deleted\n"),
                    Err(e) => self.print(&format!("Failed to delete conversation: {:#}\n", e)),
                }
            }
            Command::History => {
                let messages = self.session.messages();
                if messages.is_empty() {
                    self.print("No messages yet.\n");
                } else {
                    let history = format_history(&messages, self.settings.render_markdown);
                    self.print(&history);
                }
            }
            Command::Export(path) => self.export(Path::new(&path)),
            Command::Markdown(enabled) => {
                self.settings.render_markdown = enabled;
                if let Err(e) = SettingsService::save(&self.db, &self.settings).await {
                    tracing::warn!("Failed to save settings: {:#}", e);
                }
                let state = if enabled { "on" } else { "off" };
                self.print(&format!("Markdown rendering {}\n", state));
            }
        }
        Flow::Continue
    }

    async fn send(&mut self, text: &str) {
        let outcome = {
            let mut observer = TerminalObserver::new(&mut self.out);
            send_turn(&mut self.session, text, &mut observer).await
        };
        match outcome {
            SendOutcome::Cancelled(_) => self.print("\n[stopped]\n"),
            SendOutcome::StartFailed => self.print("Could not start a new conversation\n"),
            SendOutcome::Completed(_) | SendOutcome::Failed(_) | SendOutcome::Ignored => {}
        }
    }

    fn export(&mut self, path: &Path) {
        let Some(conversation) = self.session.current_conversation().cloned() else {
            self.print("Nothing to export yet\n");
            return;
        };
        match write_export(path, &conversation, &self.session.messages()) {
            Ok(()) => self.print(&format!("Saved to {}\n", path.display())),
            Err(e) => self.print(&format!("Export failed: {:#}\n", e)),
        }
    }

    /// Map `<n|id>` to a conversation id, reporting misses to the user.
    fn resolve(&mut self, target: &str) -> Option<String> {
        let found = resolve_target(self.session.conversations(), target).map(|c| c.id.clone());
        if found.is_none() {
            self.print(&format!("No conversation matches '{}' (see /list)\n", target));
        }
        found
    }

    fn print(&mut self, text: &str) {
        let result = self
            .out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush());
        if let Err(e) = result {
            tracing::debug!("Failed to write to terminal: {}", e);
        }
    }
}

/// Run one turn, cancelling it if Ctrl-C arrives before it finishes.
pub async fn send_turn<W: Write + Send>(
    session: &mut ChatSession,
    text: &str,
    observer: &mut TerminalObserver<W>,
) -> SendOutcome {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = session.send_message(text, observer, &cancel).await;
    interrupt.abort();
    outcome
}

/// Accepts a 1-based position from `/list` or a full conversation id.
pub fn resolve_target<'a>(conversations: &'a [Conversation], target: &str) -> Option<&'a Conversation> {
    if let Ok(n) = target.parse::<usize>() {
        if let Some(c) = n.checked_sub(1).and_then(|i| conversations.get(i)) {
            return Some(c);
        }
    }
    conversations.iter().find(|c| c.id == target)
}

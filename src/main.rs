use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lumen::config::{Config, RawConfig};
use lumen::providers::HttpCompletionProvider;
use lumen::services::{ChatSession, ConversationStore, Database, RemoteStore, SendOutcome};
use lumen::ui::render::format_conversation_list;
use lumen::ui::{send_turn, Repl, TerminalObserver};

#[derive(Debug, Parser)]
#[command(name = "lumen", version, about = "Chat with a streaming completion endpoint")]
struct Cli {
    /// Chat completion endpoint
    #[arg(long, env = "LUMEN_CHAT_URL")]
    chat_url: Option<String>,

    /// Bearer token sent to the chat endpoint
    #[arg(long, env = "LUMEN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of a REST conversation store; history stays local when unset
    #[arg(long, env = "LUMEN_STORE_URL")]
    store_url: Option<String>,

    #[arg(long, env = "LUMEN_STORE_KEY", hide_env_values = true)]
    store_key: Option<String>,

    /// SQLite database for history and settings
    #[arg(long, env = "LUMEN_DB_PATH")]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send one message in a new conversation and print the reply
    Ask { prompt: Vec<String> },
    /// List saved conversations
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::resolve(RawConfig {
        chat_url: cli.chat_url,
        api_key: cli.api_key,
        store_url: cli.store_url,
        store_key: cli.store_key,
        db_path: cli.db_path,
    })?;
    tracing::debug!("Starting with {:?}", config);

    let db = Database::open(&config.db_path)?;
    let store: Arc<dyn ConversationStore> = match &config.remote_store {
        Some(remote) => Arc::new(RemoteStore::new(remote)?),
        None => Arc::new(db.clone()),
    };
    tracing::info!("Using conversation store {}", config.store_label());

    let provider = Arc::new(HttpCompletionProvider::new(
        config.chat_url.clone(),
        config.api_key.clone(),
    ));
    let mut session = ChatSession::new(store, provider);

    match cli.command {
        Some(Commands::Ask { prompt }) => {
            let mut observer = TerminalObserver::new(std::io::stdout());
            match send_turn(&mut session, &prompt.join(" "), &mut observer).await {
                SendOutcome::Failed(e) => bail!(e.user_message()),
                SendOutcome::StartFailed => bail!("Could not start a new conversation"),
                SendOutcome::Ignored => bail!("Nothing to send"),
                _ => Ok(()),
            }
        }
        Some(Commands::List) => {
            session.refresh_conversations().await?;
            print!("{}", format_conversation_list(session.conversations(), None));
            Ok(())
        }
        None => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut repl = Repl::new(session, db, std::io::stdout()).await;
            repl.run(stdin).await
        }
    }
}

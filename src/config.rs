use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use url::Url;

pub const APP_ID: &str = "lumen";
pub const APP_NAME: &str = "Lumen";

/// Conversation titles keep this many characters of the first message.
pub const TITLE_MAX_CHARS: usize = 50;

/// A managed REST backend that holds conversation history instead of the
/// local database.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteStoreConfig {
    pub base_url: Url,
    pub api_key: String,
}

impl std::fmt::Debug for RemoteStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStoreConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"***")
            .finish()
    }
}

#[derive(Clone)]
pub struct Config {
    pub chat_url: Url,
    pub api_key: String,
    /// Local database; always used for settings, and for history unless a
    /// remote store is configured.
    pub db_path: PathBuf,
    pub remote_store: Option<RemoteStoreConfig>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("chat_url", &self.chat_url.as_str())
            .field("api_key", &"***")
            .field("store", &self.store_label())
            .finish()
    }
}

/// Raw settings as they come from the command line or the environment.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    pub chat_url: Option<String>,
    pub api_key: Option<String>,
    pub store_url: Option<String>,
    pub store_key: Option<String>,
    pub db_path: Option<PathBuf>,
}

impl Config {
    pub fn resolve(raw: RawConfig) -> Result<Self> {
        let chat_url = match raw.chat_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => parse_http_url(url).context("Invalid chat URL")?,
            _ => bail!("No chat endpoint configured (set --chat-url or LUMEN_CHAT_URL)"),
        };

        let api_key = raw.api_key.unwrap_or_default();

        let remote_store = match raw.store_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {
                let base_url = parse_http_url(url).context("Invalid store URL")?;
                // Managed backends usually accept the same publishable key
                let api_key = raw.store_key.unwrap_or_else(|| api_key.clone());
                Some(RemoteStoreConfig { base_url, api_key })
            }
            _ => None,
        };

        let db_path = match raw.db_path {
            Some(path) => path,
            None => default_db_path()?,
        };

        Ok(Self {
            chat_url,
            api_key,
            db_path,
            remote_store,
        })
    }

    pub fn store_label(&self) -> String {
        match &self.remote_store {
            Some(remote) => remote.base_url.to_string(),
            None => format!("sqlite:{}", self.db_path.display()),
        }
    }
}

fn parse_http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("'{}' is not a valid URL", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => bail!("Unsupported URL scheme '{}'", other),
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    let data_dir = match std::env::var("XDG_DATA_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let home = std::env::var("HOME").context("HOME not set")?;
            PathBuf::from(home).join(".local/share")
        }
    };
    Ok(data_dir.join(APP_ID).join(format!("{}.db", APP_ID)))
}

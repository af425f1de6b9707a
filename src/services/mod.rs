pub mod assembler;
pub mod chat;
pub mod database;
pub mod export;
pub mod markdown;
pub mod remote;
pub mod settings;
pub mod store;

pub use assembler::{consume_stream, MessageAssembler, StreamEnd};
pub use chat::{ChatSession, NoopObserver, SendOutcome, TurnObserver};
pub use database::Database;
pub use remote::RemoteStore;
pub use settings::{AppSettings, SettingsService};
pub use store::ConversationStore;

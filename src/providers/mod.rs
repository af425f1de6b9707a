pub mod client;
pub mod models;
pub mod stream;
pub mod traits;
pub mod types;

pub use client::HttpCompletionProvider;
pub use stream::StreamDecoder;
pub use traits::CompletionProvider;
pub use types::{ByteStream, ChatMessage, CompletionRequest, ProviderError};

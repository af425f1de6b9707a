pub mod conversation;
pub mod message;

pub use conversation::{title_from_message, Conversation};
pub use message::{Message, Role};

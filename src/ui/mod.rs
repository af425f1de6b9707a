pub mod command;
pub mod render;
pub mod repl;
pub mod welcome;

pub use command::Command;
pub use render::TerminalObserver;
pub use repl::{send_turn, Repl};

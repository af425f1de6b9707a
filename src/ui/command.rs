/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New,
    List,
    Open(String),
    Delete(String),
    History,
    Export(String),
    Markdown(bool),
    Suggest(usize),
    Help,
    Quit,
    /// Anything that is not a command is sent as a message.
    Send(String),
    Empty,
    Invalid(String),
}

pub const HELP: &str = "\
Commands:
  /new               start a new chat
  /list              list saved conversations
  /open <n|id>       continue a conversation
  /delete <n|id>     delete a conversation
  /history           show the current conversation
  /export <path>     save the current conversation as markdown
  /markdown on|off   toggle styled rendering of history
  /suggest <n>       send one of the suggested prompts
  /help              show this help
  /quit              exit
Press Ctrl-C while a reply is streaming to stop it.";

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Send(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        match (name, arg) {
            ("new", "") => Command::New,
            ("list", "") => Command::List,
            ("history", "") => Command::History,
            ("help", "") => Command::Help,
            ("quit" | "exit", "") => Command::Quit,
            ("open", target) if !target.is_empty() => Command::Open(target.to_string()),
            ("delete", target) if !target.is_empty() => Command::Delete(target.to_string()),
            ("export", path) if !path.is_empty() => Command::Export(path.to_string()),
            ("markdown", "on") => Command::Markdown(true),
            ("markdown", "off") => Command::Markdown(false),
            ("suggest", n) => match n.parse::<usize>() {
                Ok(n) if n > 0 => Command::Suggest(n),
                _ => Command::Invalid("Usage: /suggest <n>".to_string()),
            },
            ("open" | "delete", _) => Command::Invalid(format!("Usage: /{} <n|id>", name)),
            ("export", _) => Command::Invalid("Usage: /export <path>".to_string()),
            ("markdown", _) => Command::Invalid("Usage: /markdown on|off".to_string()),
            _ => Command::Invalid(format!("Unknown command /{} (try /help)", name)),
        }
    }
}

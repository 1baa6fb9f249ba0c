use serde_json::{json, Value};
use std::str::FromStr;

pub const HELP: &str = "\
Commands:
  /state <json>   send a full game state
  /reset          ask the peer to reset
  /ping           measure the round trip
  /status         show connection details
  /quit           disconnect and exit
Anything else is sent as an action (JSON if it parses, otherwise {\"text\": ...}).";

/// One line typed at the console
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    State(Value),
    Action(Value),
    Reset,
    Ping,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty line")]
    Empty,

    #[error("/state needs a JSON value")]
    MissingState,

    #[error("/state payload is not valid JSON: {0}")]
    InvalidState(String),

    #[error("unknown command /{0} (try /help)")]
    Unknown(String),
}

impl ConsoleCommand {
    /// Whether the command writes to the data channel.
    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            ConsoleCommand::State(_)
                | ConsoleCommand::Action(_)
                | ConsoleCommand::Reset
                | ConsoleCommand::Ping
        )
    }

    fn action_from_text(text: &str) -> Self {
        let value =
            serde_json::from_str::<Value>(text).unwrap_or_else(|_| json!({ "text": text }));
        ConsoleCommand::Action(value)
    }
}

impl FromStr for ConsoleCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandError::Empty);
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::action_from_text(line));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        match name {
            "state" if arg.is_empty() => Err(CommandError::MissingState),
            "state" => serde_json::from_str(arg)
                .map(ConsoleCommand::State)
                .map_err(|e| CommandError::InvalidState(e.to_string())),
            "reset" => Ok(ConsoleCommand::Reset),
            "ping" => Ok(ConsoleCommand::Ping),
            "status" => Ok(ConsoleCommand::Status),
            "help" => Ok(ConsoleCommand::Help),
            "quit" | "exit" => Ok(ConsoleCommand::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

pub mod console_command;

pub use console_command::{CommandError, ConsoleCommand, HELP};

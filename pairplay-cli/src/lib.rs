pub mod application;
pub mod infrastructure;

pub use application::{CommandError, ConsoleCommand};
pub use infrastructure::{CliError, Inbound, LogConfig, Result, SessionRuntime, SessionSnapshot};

pub mod clipboard;
pub mod error;
pub mod observability;
pub mod session_runtime;

pub use clipboard::{present_code, CodeDelivery, PasteBuffer};
pub use error::{CliError, Result};
pub use observability::LogConfig;
pub use session_runtime::{Inbound, SessionRuntime, SessionSnapshot};

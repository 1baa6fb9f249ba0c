use crate::infrastructure::error::{CliError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub default_level: tracing::Level,
    /// Level for the WebRTC stack, which is chatty below `warn`
    pub webrtc_level: tracing::Level,
    pub show_spans: bool,
    pub show_thread_ids: bool,
    pub show_targets: bool,

    #[cfg(feature = "console")]
    pub enable_console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: tracing::Level::INFO,
            webrtc_level: tracing::Level::WARN,
            show_spans: false,
            show_thread_ids: false,
            show_targets: false,
            #[cfg(feature = "console")]
            enable_console: false,
        }
    }
}

impl LogConfig {
    /// Development configuration (verbose, human-readable)
    pub fn dev() -> Self {
        Self {
            default_level: tracing::Level::DEBUG,
            show_spans: true,
            show_thread_ids: true,
            show_targets: true,
            ..Default::default()
        }
    }

    /// `dev()` when verbose, otherwise the default.
    pub fn for_verbosity(verbose: bool) -> Self {
        if verbose {
            Self::dev()
        } else {
            Self::default()
        }
    }

    /// Enable tokio console
    #[cfg(feature = "console")]
    pub fn with_console(mut self) -> Self {
        self.enable_console = true;
        self
    }

    /// Filter used when `RUST_LOG` is not set
    pub fn filter_directives(&self) -> String {
        let level = self.default_level.to_string().to_lowercase();
        [
            level.clone(),
            format!("pairplay_cli={level}"),
            format!("pairplay_p2p={level}"),
            format!("webrtc={}", self.webrtc_level.to_string().to_lowercase()),
        ]
        .join(",")
    }

    pub fn init(self) -> Result<()> {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(self.filter_directives())
                .map_err(|e| CliError::Logging(e.to_string()))?,
        };

        #[cfg(feature = "console")]
        if self.enable_console {
            use console_subscriber::ConsoleLayer;

            eprintln!("🔍 Tokio Console enabled - connect with `tokio-console`");

            let console_layer = ConsoleLayer::builder()
                .server_addr(([127, 0, 0, 1], 6669))
                .spawn();

            return tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init()
                .map_err(|e| CliError::Logging(e.to_string()));
        }

        // Logs share the terminal with the console, so keep them on stderr
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(self.show_targets)
            .with_thread_ids(self.show_thread_ids)
            .with_span_events(if self.show_spans {
                fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE
            } else {
                fmt::format::FmtSpan::NONE
            });

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| CliError::Logging(e.to_string()))
    }
}

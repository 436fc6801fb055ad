use crate::config::Config;
use log::{LevelFilter, SetLoggerError};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Dependencies that log every socket frame and HTTP request. They are only
/// shown at `TRACE`.
const FILTERED_MODULES: &[&str] = &[
    "tungstenite",
    "tokio_tungstenite",
    "hyper",
    "reqwest",
    "rustls",
    "mio",
];

pub struct Logger {}

impl Logger {
    /// Install the terminal logger at the configured level.
    ///
    /// Fails if a global logger has already been installed.
    pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
        let level = config.log_level_filter;

        TermLogger::init(
            level,
            Self::build_log_config(Self::filters_dependencies(level)),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        )
    }

    fn filters_dependencies(level: LevelFilter) -> bool {
        level < LevelFilter::Trace
    }

    fn build_log_config(apply_filters: bool) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder
            .set_time_format_rfc3339()
            .set_thread_level(LevelFilter::Off)
            .set_target_level(LevelFilter::Error);

        if apply_filters {
            for module in FILTERED_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }

        builder.build()
    }
}

use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;

/// Default platform base URL used when `BASE_URL` is not set.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8111";

/// Default path segment of the notification API.
pub const DEFAULT_NOTIFICATION_ENDPOINT: &str = "notification2";

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The HTTP base URL of the platform. The streaming URL is derived from it
    /// by switching the scheme to ws/wss.
    #[arg(short, long, env, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Path segment of the notification API, relative to the base URL.
    #[arg(long, env, default_value = DEFAULT_NOTIFICATION_ENDPOINT)]
    notification_endpoint: String,

    /// Timeout in seconds for a single connect or reconnect attempt
    #[arg(long, env, default_value_t = 30)]
    pub operation_timeout_secs: u64,

    /// Seconds between two connection health checks
    #[arg(long, env, default_value_t = 20)]
    pub monitor_interval_secs: u64,

    /// Seconds before the nominal token expiry at which a token counts as expired
    #[arg(long, env, default_value_t = 30, allow_negative_numbers = true)]
    pub token_expiration_offset_secs: i64,

    /// Timeout in seconds for REST calls against the platform
    #[arg(long, env, default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Maximum number of retries for transient REST failures
    #[arg(long, env, default_value_t = 3)]
    pub http_max_retries: u32,

    /// The tenant the bootstrap credentials belong to.
    #[arg(long, env)]
    tenant: Option<String>,

    /// The user name of the bootstrap credentials.
    #[arg(long, env)]
    username: Option<String>,

    /// The password of the bootstrap credentials.
    #[arg(long, env)]
    password: Option<String>,

    /// A list of tenant-wide subscription names to register on start.
    #[arg(long, env, value_delimiter = ',', use_value_delimiter = true)]
    pub subscriptions: Vec<String>,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap_or(LevelFilter::Info)),
        )]
    pub log_level_filter: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn notification_endpoint(&self) -> &str {
        &self.notification_endpoint
    }

    pub fn tenant(&self) -> Option<String> {
        self.tenant.clone()
    }

    pub fn username(&self) -> Option<String> {
        self.username.clone()
    }

    pub fn password(&self) -> Option<String> {
        self.password.clone()
    }

    /// Returns `(tenant, username, password)` when all three are configured.
    pub fn bootstrap_credentials(&self) -> Option<(String, String, String)> {
        Some((self.tenant()?, self.username()?, self.password()?))
    }
}

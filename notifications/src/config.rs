//! Runtime settings of the streaming side.

use std::time::Duration;

use async_trait::async_trait;
use service::config::{Config, DEFAULT_BASE_URL, DEFAULT_NOTIFICATION_ENDPOINT};
use url::Url;

use crate::error::{config_error, Error};

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationSettings {
    /// HTTP base URL of the platform.
    pub base_url: String,
    pub notification_endpoint: String,
    /// Upper bound for a single connect or reconnect.
    pub operation_timeout: Duration,
    /// Period of the connection monitor.
    pub monitor_interval: Duration,
    /// Margin before the nominal token expiry at which a token is replaced.
    pub token_expiration_offset: chrono::Duration,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            notification_endpoint: DEFAULT_NOTIFICATION_ENDPOINT.to_string(),
            operation_timeout: Duration::from_secs(30),
            monitor_interval: Duration::from_secs(20),
            token_expiration_offset: chrono::Duration::seconds(30),
        }
    }
}

impl From<&Config> for NotificationSettings {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            notification_endpoint: config.notification_endpoint().to_string(),
            operation_timeout: Duration::from_secs(config.operation_timeout_secs),
            monitor_interval: Duration::from_secs(config.monitor_interval_secs),
            token_expiration_offset: chrono::Duration::seconds(config.token_expiration_offset_secs),
        }
    }
}

impl NotificationSettings {
    /// Reject settings that would make connections misbehave.
    pub fn validate(&self) -> Result<(), Error> {
        let mut problems = Vec::new();

        if self.operation_timeout.is_zero() {
            problems.push("operation timeout must be greater than zero");
        }
        if self.monitor_interval.is_zero() {
            problems.push("monitor interval must be greater than zero");
        }
        if self.notification_endpoint.trim_matches('/').is_empty() {
            problems.push("notification endpoint must not be empty");
        }
        if self.token_expiration_offset < chrono::Duration::zero() {
            problems.push("token expiration offset must not be negative");
        }

        if !problems.is_empty() {
            return Err(config_error(&problems.join("; ")));
        }

        self.consumer_url().map(|_| ())
    }

    /// Streaming endpoint without the token, e.g. `ws://host/notification2/consumer/`.
    pub fn consumer_url(&self) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_url)?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(config_error(&format!("Unsupported base URL scheme {other}"))),
        };
        url.set_scheme(scheme)
            .map_err(|_| config_error(&format!("Cannot switch {} to {scheme}", self.base_url)))?;

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(url.join(&format!(
            "{}/consumer/",
            self.notification_endpoint.trim_matches('/')
        ))?)
    }
}

/// Append the bearer token as the `token` query parameter.
pub fn with_token(consumer_url: &Url, token: &str) -> Url {
    let mut url = consumer_url.clone();
    url.query_pairs_mut().append_pair("token", token);
    url
}

/// Removes the token from a connect URL before it is logged.
pub(crate) fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    if url.query().is_some() {
        url.set_query(Some("token=***"));
    }
    url.to_string()
}

/// Lazily supplies the settings a connection is built with.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn get(&self) -> Result<NotificationSettings, Error>;
}

/// Provider returning a fixed value.
pub struct StaticSettingsProvider {
    settings: NotificationSettings,
}

impl StaticSettingsProvider {
    pub fn new(settings: NotificationSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SettingsProvider for StaticSettingsProvider {
    async fn get(&self) -> Result<NotificationSettings, Error> {
        Ok(self.settings.clone())
    }
}

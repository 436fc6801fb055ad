//! Builder for the authenticated platform REST client.

use std::time::Duration;

use reqwest_middleware::ClientBuilder;
use reqwest_retry::RetryTransientMiddleware;
use url::Url;

use super::BackoffPolicy;
use crate::api::PlatformClient;
use crate::credentials::Credentials;
use crate::error::Error;

/// Default path segment of the notification API.
pub const DEFAULT_ENDPOINT: &str = "notification2";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Assembles a `PlatformClient` for one tenant: Basic authentication, a
/// per-request timeout and backoff retries for transient failures. Retries
/// stop once the request has used up `(max_retries + 1)` timeouts in total.
pub struct PlatformClientBuilder {
    base_url: String,
    endpoint: String,
    credentials: Credentials,
    timeout: Duration,
    max_retries: u32,
}

impl PlatformClientBuilder {
    pub fn new(base_url: &str, credentials: Credentials) -> Self {
        Self {
            base_url: base_url.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credentials,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn build(self) -> Result<PlatformClient, Error> {
        let base_url = normalize_base_url(&self.base_url)?;

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("platform-api/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let policy = BackoffPolicy::new(self.max_retries)
            .with_budget(self.timeout * (self.max_retries + 1));
        let http = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(policy))
            .build();

        Ok(PlatformClient::new(
            http,
            base_url,
            self.endpoint,
            self.credentials,
        ))
    }
}

/// Parse `base_url` so that relative joins keep its path.
fn normalize_base_url(base_url: &str) -> Result<Url, Error> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

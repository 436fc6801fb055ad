//! Per-tenant credentials used to authenticate REST calls.

use reqwest_middleware::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};

/// HTTP Basic credentials of one tenant.
///
/// The platform expects the login in the form `tenant/username`.
#[derive(Debug, Clone)]
pub struct Credentials {
    tenant: String,
    username: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(tenant: impl Into<String>, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            tenant: tenant.into(),
            username: username.into(),
            password,
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Login name sent in the Basic authorization header.
    pub fn login(&self) -> String {
        format!("{}/{}", self.tenant, self.username)
    }

    /// Apply Basic authentication to a request builder.
    pub fn authenticate(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(self.login(), Some(self.password.expose_secret()))
    }

    /// True when both credentials would produce the same authorization header.
    pub fn same_as(&self, other: &Credentials) -> bool {
        self.tenant == other.tenant
            && self.username == other.username
            && self.password.expose_secret() == other.password.expose_secret()
    }
}

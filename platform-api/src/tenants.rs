//! Per-tenant API access.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::*;

use crate::api::{NotificationApi, PlatformClient};
use crate::credentials::Credentials;
use crate::error::Error;
use crate::http::PlatformClientBuilder;

/// Source of the API handle for a tenant.
pub trait TenantApiProvider: Send + Sync {
    /// `None` when the tenant has no registered API access.
    fn api_for(&self, tenant: &str) -> Option<Arc<dyn NotificationApi>>;
}

/// Tenants added and removed by a credentials update.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CredentialsChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Registry holding one authenticated client per tenant.
pub struct TenantRegistry {
    base_url: String,
    endpoint: String,
    timeout: Duration,
    max_retries: u32,
    clients: DashMap<String, Arc<PlatformClient>>,
}

impl TenantRegistry {
    pub fn new(base_url: &str, endpoint: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            endpoint: endpoint.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            clients: DashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Register or replace the credentials of a single tenant.
    pub fn insert(&self, credentials: Credentials) -> Result<(), Error> {
        let tenant = credentials.tenant().to_string();
        let client = PlatformClientBuilder::new(&self.base_url, credentials)
            .with_endpoint(&self.endpoint)
            .with_timeout(self.timeout)
            .with_max_retries(self.max_retries)
            .build()?;

        self.clients.insert(tenant, Arc::new(client));
        Ok(())
    }

    pub fn remove(&self, tenant: &str) -> bool {
        self.clients.remove(tenant).is_some()
    }

    pub fn tenants(&self) -> Vec<String> {
        self.clients.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Replace the full credential set.
    ///
    /// Unchanged tenants keep their client; changed credentials rebuild it.
    pub fn update_credentials(&self, credentials: Vec<Credentials>) -> Result<CredentialsChange, Error> {
        let incoming: HashSet<String> = credentials
            .iter()
            .map(|credentials| credentials.tenant().to_string())
            .collect();

        let mut change = CredentialsChange::default();

        for tenant in self.tenants() {
            if !incoming.contains(&tenant) {
                self.clients.remove(&tenant);
                change.removed.push(tenant);
            }
        }

        for credentials in credentials {
            let tenant = credentials.tenant().to_string();
            let unchanged = self
                .clients
                .get(&tenant)
                .map(|client| client.credentials().same_as(&credentials));

            match unchanged {
                Some(true) => {}
                Some(false) => self.insert(credentials)?,
                None => {
                    self.insert(credentials)?;
                    change.added.push(tenant);
                }
            }
        }

        if !change.added.is_empty() || !change.removed.is_empty() {
            info!(
                "Tenant credentials updated: added {:?}, removed {:?}",
                change.added, change.removed
            );
        }
        Ok(change)
    }
}

impl TenantApiProvider for TenantRegistry {
    fn api_for(&self, tenant: &str) -> Option<Arc<dyn NotificationApi>> {
        self.clients
            .get(tenant)
            .map(|client| client.value().clone() as Arc<dyn NotificationApi>)
    }
}

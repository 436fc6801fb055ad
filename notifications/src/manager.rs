//! The public face of the subsystem: one active connection per
//! (tenant, subscription name), registered, queried and torn down here.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use log::*;
use platform_api::clock::Clock;
use platform_api::subscriptions;
use platform_api::tenants::TenantApiProvider;
use platform_api::tokens::{self, TokenClaim, TokenClaimWithToken, TokenProvider, TokenValidator};
use platform_api::NotificationApi;
use tokio_util::sync::CancellationToken;

use crate::config::SettingsProvider;
use crate::connection::{Connection, ConnectionContext};
use crate::error::{not_found_error, Error, ErrorKind};
use crate::handler::DataFeedHandler;
use crate::registration::RegisterNotification;
use crate::sync::Locker;
use crate::transport::{Transport, TransportState};

/// Upper bound for waiting on the one-time settings fetch.
const SETTINGS_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

type ConnectionKey = (String, String);

fn key(tenant: &str, name: &str) -> ConnectionKey {
    (tenant.to_string(), name.to_string())
}

/// Builds connections from lazily fetched settings.
struct ConnectionFactory {
    settings: Arc<dyn SettingsProvider>,
    tenants: Arc<dyn TenantApiProvider>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    locker: Locker,
    context: Mutex<Option<ConnectionContext>>,
}

impl ConnectionFactory {
    async fn context(&self) -> Result<ConnectionContext, Error> {
        self.locker
            .get_value(&self.context, || async {
                let settings = self.settings.get().await?;
                settings.validate()?;
                debug!("Notification settings loaded: {settings:?}");

                let validator = TokenValidator::new(self.clock.clone(), settings.token_expiration_offset);
                Ok(ConnectionContext {
                    consumer_url: settings.consumer_url()?,
                    operation_timeout: settings.operation_timeout,
                    monitor_interval: settings.monitor_interval,
                    transport: self.transport.clone(),
                    tokens: Arc::new(TokenProvider::new(self.tenants.clone(), validator)),
                })
            })
            .await
    }

    async fn create(
        &self,
        handler: Arc<dyn DataFeedHandler>,
        shutdown: &CancellationToken,
    ) -> Result<Connection, Error> {
        Ok(Connection::new(self.context().await?, handler, shutdown))
    }
}

/// Maps (tenant, subscription name) to its active connection.
pub struct NotificationManager {
    tenants: Arc<dyn TenantApiProvider>,
    factory: ConnectionFactory,
    connections: DashMap<ConnectionKey, Arc<Connection>>,
    shutdown: CancellationToken,
}

impl NotificationManager {
    pub fn new(
        tenants: Arc<dyn TenantApiProvider>,
        settings: Arc<dyn SettingsProvider>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            factory: ConnectionFactory {
                settings,
                tenants: tenants.clone(),
                transport,
                clock,
                locker: Locker::new(SETTINGS_LOCK_TIMEOUT),
                context: Mutex::new(None),
            },
            tenants,
            connections: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Ensure the subscription exists, obtain a token and start streaming.
    ///
    /// Nothing is kept when any step fails. A second registration of an
    /// active (tenant, name) replaces the first connection and disconnects it.
    pub async fn register(
        &self,
        tenant: &str,
        registration: &RegisterNotification,
        handler: Arc<dyn DataFeedHandler>,
    ) -> Result<(), Error> {
        let subscription = registration.validate()?;
        let api = self.api_for(tenant)?;

        let subscriber = match subscriptions::find(api.as_ref(), &subscription.name).await? {
            Some(id) => id,
            None => subscriptions::create(api.as_ref(), subscription).await?,
        };

        let claim = TokenClaim::new(subscriber, subscription.name.clone())
            .with_non_persistent(registration.non_persistent());
        let token = tokens::create(api.as_ref(), &claim).await?;

        let connection = self.factory.create(handler, &self.shutdown).await?;
        connection
            .connect(tenant, TokenClaimWithToken { claim, token })
            .await
            .map_err(|e| Error {
                source: Some(Box::new(e)),
                error_kind: ErrorKind::Api { status: None },
            })?;

        let previous = self
            .connections
            .insert(key(tenant, &subscription.name), Arc::new(connection));
        if let Some(previous) = previous {
            info!(
                "Replacing active connection of subscription {} for tenant {tenant}",
                subscription.name
            );
            previous.disconnect().await;
        }

        info!("Registered subscription {} for tenant {tenant}", subscription.name);
        Ok(())
    }

    /// Stop streaming and revoke the token. The remote subscription stays.
    pub async fn unregister(&self, tenant: &str, name: &str) -> Result<(), Error> {
        let (_, connection) = self
            .connections
            .remove(&key(tenant, name))
            .ok_or_else(|| not_found_error(&format!("No active connection for {tenant}/{name}")))?;

        let token = connection.token().filter(|token| !token.is_empty());
        connection.disconnect().await;
        let token = token.ok_or_else(|| not_found_error(&format!("No token held for {tenant}/{name}")))?;

        let api = self.api_for(tenant)?;
        tokens::unsubscribe(api.as_ref(), &token).await?;

        info!("Unregistered subscription {name} for tenant {tenant}");
        Ok(())
    }

    /// Tear down the local stream, then delete the remote subscription.
    ///
    /// The stream is torn down whether or not the remote delete succeeds.
    pub async fn delete_subscription(&self, tenant: &str, name: &str) -> Result<(), Error> {
        if let Some((_, connection)) = self.connections.remove(&key(tenant, name)) {
            let token = connection.token().filter(|token| !token.is_empty());
            connection.disconnect().await;
            if let (Some(token), Some(api)) = (token, self.tenants.api_for(tenant)) {
                if let Err(e) = tokens::unsubscribe(api.as_ref(), &token).await {
                    warn!("Revoking the token of {tenant}/{name} failed: {e}");
                }
            }
        }

        let api = self.api_for(tenant)?;
        subscriptions::delete(api.as_ref(), name).await?;

        info!("Deleted subscription {name} for tenant {tenant}");
        Ok(())
    }

    pub fn get_state(&self, tenant: &str, name: &str) -> Result<TransportState, Error> {
        self.connections
            .get(&key(tenant, name))
            .map(|connection| connection.state())
            .ok_or_else(|| not_found_error(&format!("No active connection for {tenant}/{name}")))
    }

    /// Names of the subscriptions currently streaming for `tenant`.
    pub fn active_subscriptions(&self, tenant: &str) -> Vec<String> {
        self.connections
            .iter()
            .filter(|entry| entry.key().0 == tenant)
            .map(|entry| entry.key().1.clone())
            .collect()
    }

    /// Disconnect every connection, one after the other, and forget them.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let keys: Vec<ConnectionKey> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            if let Some((_, connection)) = self.connections.remove(&key) {
                connection.disconnect().await;
            }
        }
        self.connections.clear();

        info!("Notification manager shut down");
    }

    fn api_for(&self, tenant: &str) -> Result<Arc<dyn NotificationApi>, Error> {
        self.tenants.api_for(tenant).ok_or_else(|| Error {
            source: None,
            error_kind: ErrorKind::TenantNotFound(tenant.to_string()),
        })
    }
}

impl Drop for NotificationManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

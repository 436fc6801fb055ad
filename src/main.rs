use log::{error, info, warn};
use notifications::{
    config::{NotificationSettings, StaticSettingsProvider},
    handler::LogHandler,
    registration::RegisterNotification,
    transport::WebSocketTransport,
    NotificationManager,
};
use platform_api::{
    clock::SystemClock, credentials::Credentials, subscriptions::ApiType, tenants::TenantRegistry,
};
use secrecy::SecretString;
use service::{config::Config, logging::Logger};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let settings = NotificationSettings::from(&config);
    if let Err(e) = settings.validate() {
        error!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    let tenants = Arc::new(
        TenantRegistry::new(config.base_url(), config.notification_endpoint())
            .with_timeout(Duration::from_secs(config.http_timeout_secs))
            .with_max_retries(config.http_max_retries),
    );

    let tenant = match config.bootstrap_credentials() {
        Some((tenant, username, password)) => {
            let credentials = Credentials::new(&tenant, username, SecretString::new(password));
            if let Err(e) = tenants.insert(credentials) {
                error!("Failed to build the platform client for tenant {tenant}: {e}");
                std::process::exit(1);
            }
            Some(tenant)
        }
        None => {
            warn!("No tenant credentials configured, nothing will be registered");
            None
        }
    };

    let manager = NotificationManager::new(
        tenants.clone(),
        Arc::new(StaticSettingsProvider::new(settings)),
        Arc::new(WebSocketTransport),
        Arc::new(SystemClock),
    );

    if let Some(tenant) = &tenant {
        for name in &config.subscriptions {
            let registration = RegisterNotification::tenant(
                name,
                vec![ApiType::Alarms, ApiType::Measurements, ApiType::Operations],
                None,
                vec![],
                None,
            );

            match manager
                .register(tenant, &registration, Arc::new(LogHandler::new(name)))
                .await
            {
                Ok(()) => info!("Streaming subscription {name} of tenant {tenant}"),
                Err(e) => error!("Failed to register subscription {name}: {e}"),
            }
        }
    }

    info!("Waiting for notifications, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
    }

    manager.shutdown().await;
}

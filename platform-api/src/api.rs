//! REST access to the notification resources of one tenant.
//!
//! `NotificationApi` is the seam the rest of the workspace programs against;
//! `PlatformClient` implements it over reqwest with retry middleware.

use async_trait::async_trait;
use log::*;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::credentials::Credentials;
use crate::error::Error;

/// Scope a subscription is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubscriptionContext {
    /// A single managed object.
    #[serde(rename = "mo")]
    ManagedObject,
    /// Every object of the tenant.
    #[serde(rename = "tenant")]
    Tenant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReference {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub apis: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_filter: Option<String>,
}

/// Body of a create-subscription request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub context: SubscriptionContext,
    pub subscription: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_filter: Option<SubscriptionFilter>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fragments_to_copy: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub non_persistent: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionResource {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionCollection {
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionResource>,
}

/// Body of a create-token request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub subscriber: String,
    pub subscription: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub non_persistent: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnsubscribeResponse {
    pub result: Option<String>,
}

/// Remote subscription and token resources of a single tenant.
///
/// Implementations report a 404 as `ErrorKind::NotFound` and any other failed
/// call as `ErrorKind::Api`.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// List the subscriptions registered under `name`.
    async fn find_subscriptions(&self, name: &str) -> Result<SubscriptionCollection, Error>;

    async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<SubscriptionResource, Error>;

    async fn delete_subscription(&self, id: &str) -> Result<(), Error>;

    async fn create_token(&self, request: &TokenRequest) -> Result<TokenResponse, Error>;

    /// Revoke `token` and drop the subscriber it was issued for.
    async fn unsubscribe(&self, token: &str) -> Result<UnsubscribeResponse, Error>;
}

/// reqwest-backed `NotificationApi`.
pub struct PlatformClient {
    http: ClientWithMiddleware,
    base_url: Url,
    endpoint: String,
    credentials: Credentials,
}

impl PlatformClient {
    pub(crate) fn new(
        http: ClientWithMiddleware,
        base_url: Url,
        endpoint: String,
        credentials: Credentials,
    ) -> Self {
        Self {
            http,
            base_url,
            endpoint,
            credentials,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self
            .base_url
            .join(&format!("{}/{}", self.endpoint.trim_matches('/'), path))?)
    }
}

#[async_trait]
impl NotificationApi for PlatformClient {
    async fn find_subscriptions(&self, name: &str) -> Result<SubscriptionCollection, Error> {
        let url = self.url("subscriptions")?;
        debug!("Looking up subscription {} for tenant {}", name, self.credentials.tenant());

        let response = self
            .credentials
            .authenticate(self.http.get(url))
            .query(&[("subscription", name)])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<SubscriptionResource, Error> {
        let url = self.url("subscriptions")?;
        debug!(
            "Creating subscription {} for tenant {}",
            request.subscription,
            self.credentials.tenant()
        );

        let response = self
            .credentials
            .authenticate(self.http.post(url))
            .json(request)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn delete_subscription(&self, id: &str) -> Result<(), Error> {
        let url = self.url(&format!("subscriptions/{id}"))?;
        debug!("Deleting subscription {} for tenant {}", id, self.credentials.tenant());

        self.credentials
            .authenticate(self.http.delete(url))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn create_token(&self, request: &TokenRequest) -> Result<TokenResponse, Error> {
        let url = self.url("token")?;

        let response = self
            .credentials
            .authenticate(self.http.post(url))
            .json(request)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn unsubscribe(&self, token: &str) -> Result<UnsubscribeResponse, Error> {
        let url = self.url("unsubscribe")?;

        let response = self
            .credentials
            .authenticate(self.http.post(url))
            .query(&[("token", token)])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiErrorKind, ErrorKind};
    use crate::http::PlatformClientBuilder;
    use mockito::{Matcher, Server, ServerGuard};
    use secrecy::SecretString;

    // "t100/service:secret"
    const BASIC_AUTH: &str = "Basic dDEwMC9zZXJ2aWNlOnNlY3JldA==";

    async fn setup_test_server() -> ServerGuard {
        Server::new_async().await
    }

    fn client_for(server: &ServerGuard) -> PlatformClient {
        PlatformClientBuilder::new(
            &server.url(),
            Credentials::new("t100", "service", SecretString::new("secret".to_string())),
        )
        .with_max_retries(0)
        .build()
        .unwrap()
    }

    #[tokio::test]
    async fn test_find_subscriptions_queries_by_name() {
        let mut server = setup_test_server().await;
        let _mock = server
            .mock("GET", "/notification2/subscriptions")
            .match_query(Matcher::UrlEncoded("subscription".into(), "alarms".into()))
            .match_header("authorization", BASIC_AUTH)
            .with_status(200)
            .with_body(r#"{"subscriptions":[{"id":"42"},{"id":"43"}]}"#)
            .create_async()
            .await;

        let collection = client_for(&server).find_subscriptions("alarms").await.unwrap();

        assert_eq!(collection.subscriptions.len(), 2);
        assert_eq!(collection.subscriptions[0].id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_create_subscription_sends_camel_case_body() {
        let mut server = setup_test_server().await;
        let _mock = server
            .mock("POST", "/notification2/subscriptions")
            .match_body(Matcher::Json(serde_json::json!({
                "context": "mo",
                "subscription": "device-alarms",
                "source": { "id": "12345" },
                "subscriptionFilter": { "apis": ["alarms"], "typeFilter": "c8y_Heat" },
                "fragmentsToCopy": ["c8y_Position"],
                "nonPersistent": true
            })))
            .with_status(201)
            .with_body(r#"{"id":"77"}"#)
            .create_async()
            .await;

        let request = SubscriptionRequest {
            context: SubscriptionContext::ManagedObject,
            subscription: "device-alarms".to_string(),
            source: Some(SourceReference {
                id: "12345".to_string(),
            }),
            subscription_filter: Some(SubscriptionFilter {
                apis: vec!["alarms".to_string()],
                type_filter: Some("c8y_Heat".to_string()),
            }),
            fragments_to_copy: vec!["c8y_Position".to_string()],
            non_persistent: Some(true),
        };
        let resource = client_for(&server).create_subscription(&request).await.unwrap();

        assert_eq!(resource.id.as_deref(), Some("77"));
    }

    #[tokio::test]
    async fn test_delete_subscription_maps_404_to_not_found() {
        let mut server = setup_test_server().await;
        let _mock = server
            .mock("DELETE", "/notification2/subscriptions/77")
            .with_status(404)
            .create_async()
            .await;

        let err = client_for(&server).delete_subscription("77").await.unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_create_token_maps_server_error_to_status() {
        let mut server = setup_test_server().await;
        let _mock = server
            .mock("POST", "/notification2/token")
            .match_body(Matcher::Json(serde_json::json!({
                "subscriber": "77",
                "subscription": "device-alarms"
            })))
            .with_status(403)
            .create_async()
            .await;

        let request = TokenRequest {
            subscriber: "77".to_string(),
            subscription: "device-alarms".to_string(),
            non_persistent: None,
        };
        let err = client_for(&server).create_token(&request).await.unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::Api(ApiErrorKind::Status(403)));
        assert_eq!(err.status_code(), Some(403));
    }

    #[tokio::test]
    async fn test_unsubscribe_passes_token_as_query() {
        let mut server = setup_test_server().await;
        let _mock = server
            .mock("POST", "/notification2/unsubscribe")
            .match_query(Matcher::UrlEncoded("token".into(), "abc.def.ghi".into()))
            .with_status(200)
            .with_body(r#"{"result":"DONE"}"#)
            .create_async()
            .await;

        let response = client_for(&server).unsubscribe("abc.def.ghi").await.unwrap();

        assert_eq!(response.result.as_deref(), Some("DONE"));
    }

    #[tokio::test]
    async fn test_unreadable_body_is_invalid_response() {
        let mut server = setup_test_server().await;
        let _mock = server
            .mock("POST", "/notification2/token")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let request = TokenRequest {
            subscriber: "77".to_string(),
            subscription: "device-alarms".to_string(),
            non_persistent: None,
        };
        let err = client_for(&server).create_token(&request).await.unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::Api(ApiErrorKind::InvalidResponse));
    }
}

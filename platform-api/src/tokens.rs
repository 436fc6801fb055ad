//! Notification token lifecycle: creation, expiry checks, refresh and revocation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::dangerous::insecure_decode;
use log::*;
use serde::Deserialize;

use crate::api::{NotificationApi, TokenRequest};
use crate::clock::Clock;
use crate::error::{empty_result_error, malformed_token_error, tenant_not_found_error, Error};
use crate::tenants::TenantApiProvider;

/// Default safety margin before the nominal expiry.
pub const DEFAULT_EXPIRATION_OFFSET_SECS: i64 = 30;

/// Input for token creation.
///
/// `subscriber` is the remote id of the subscription, `subscription` its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaim {
    pub subscriber: String,
    pub subscription: String,
    pub non_persistent: Option<bool>,
}

impl TokenClaim {
    pub fn new(subscriber: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self {
            subscriber: subscriber.into(),
            subscription: subscription.into(),
            non_persistent: None,
        }
    }

    pub fn with_non_persistent(mut self, non_persistent: Option<bool>) -> Self {
        self.non_persistent = non_persistent;
        self
    }

    fn to_request(&self) -> TokenRequest {
        TokenRequest {
            subscriber: self.subscriber.clone(),
            subscription: self.subscription.clone(),
            non_persistent: self.non_persistent,
        }
    }
}

/// A claim together with the token issued for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaimWithToken {
    pub claim: TokenClaim,
    pub token: String,
}

/// Mint a token for `claim`.
///
/// A 404 is reported as `ApiErrorKind::Status(404)`, not as a missing resource.
pub async fn create(api: &dyn NotificationApi, claim: &TokenClaim) -> Result<String, Error> {
    let response = api
        .create_token(&claim.to_request())
        .await
        .map_err(Error::not_found_as_status)?;
    let token = response.token.ok_or_else(empty_result_error)?;

    debug!(
        "Created token for subscription {} (subscriber {})",
        claim.subscription, claim.subscriber
    );
    Ok(token)
}

/// Revoke `token` server side. A 404 is reported as `ErrorKind::NotFound`.
pub async fn unsubscribe(api: &dyn NotificationApi, token: &str) -> Result<(), Error> {
    let response = api.unsubscribe(token).await?;
    response.result.ok_or_else(empty_result_error)?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Decides whether a token is close enough to its expiry to be replaced.
pub struct TokenValidator {
    clock: Arc<dyn Clock>,
    offset: Duration,
}

impl TokenValidator {
    /// A negative `offset` counts as zero: a token is never treated as fresh
    /// past its nominal expiry.
    pub fn new(clock: Arc<dyn Clock>, offset: Duration) -> Self {
        Self {
            clock,
            offset: offset.max(Duration::zero()),
        }
    }

    /// True once `now >= exp - offset`.
    ///
    /// The signature is not verified; the issuing platform is trusted. A token
    /// whose expiry claim cannot be decoded is reported as `TokenErrorKind::Malformed`.
    pub fn is_expired(&self, token: &str) -> Result<bool, Error> {
        let expires_at = expiry(token)?;
        Ok(self.clock.now() >= expires_at - self.offset)
    }
}

/// Reads the `exp` claim of a JWT without checking its signature.
fn expiry(token: &str) -> Result<DateTime<Utc>, Error> {
    let claim = insecure_decode::<ExpiryClaim>(token)
        .map_err(|e| malformed_token_error(&e.to_string()))?
        .claims;

    DateTime::from_timestamp(claim.exp, 0)
        .ok_or_else(|| malformed_token_error(&format!("exp {} is out of range", claim.exp)))
}

/// Refresh gate used when a connection has to be re-established.
pub struct TokenProvider {
    tenants: Arc<dyn TenantApiProvider>,
    validator: TokenValidator,
}

impl TokenProvider {
    pub fn new(tenants: Arc<dyn TenantApiProvider>, validator: TokenValidator) -> Self {
        Self { tenants, validator }
    }

    /// Returns `Ok(None)` while `current` is still fresh, otherwise a new token
    /// minted for the same claim.
    pub async fn get_token_if_expired(
        &self,
        tenant: &str,
        claim: &TokenClaim,
        current: &str,
    ) -> Result<Option<String>, Error> {
        if !self.validator.is_expired(current)? {
            return Ok(None);
        }

        let api = self
            .tenants
            .api_for(tenant)
            .ok_or_else(|| tenant_not_found_error(tenant))?;

        info!(
            "Token for subscription {} of tenant {} expired, requesting a new one",
            claim.subscription, tenant
        );
        create(api.as_ref(), claim).await.map(Some)
    }
}

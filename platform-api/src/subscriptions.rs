//! Get-or-create protocol against the remote subscription resource.

use std::fmt;
use std::str::FromStr;

use log::*;

use crate::api::{
    NotificationApi, SourceReference, SubscriptionContext, SubscriptionFilter, SubscriptionRequest,
};
use crate::error::{empty_result_error, not_found_error, Error};

/// Platform API categories a subscription can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiType {
    Alarms,
    AlarmsWithChildren,
    Events,
    EventsWithChildren,
    ManagedObjects,
    Measurements,
    Operations,
}

impl ApiType {
    /// Name used on the wire, always lowercase.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiType::Alarms => "alarms",
            ApiType::AlarmsWithChildren => "alarmswithchildren",
            ApiType::Events => "events",
            ApiType::EventsWithChildren => "eventswithchildren",
            ApiType::ManagedObjects => "managedobjects",
            ApiType::Measurements => "measurements",
            ApiType::Operations => "operations",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ApiTypeParseError;

impl FromStr for ApiType {
    type Err = ApiTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alarms" => Ok(ApiType::Alarms),
            "alarmswithchildren" => Ok(ApiType::AlarmsWithChildren),
            "events" => Ok(ApiType::Events),
            "eventswithchildren" => Ok(ApiType::EventsWithChildren),
            "managedobjects" => Ok(ApiType::ManagedObjects),
            "measurements" => Ok(ApiType::Measurements),
            "operations" => Ok(ApiType::Operations),
            _ => Err(ApiTypeParseError),
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a subscription is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// A single addressable object.
    Object { id: String },
    /// The whole tenant, narrowed by the API filter.
    Tenant,
}

/// A validated, immutable subscription descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub name: String,
    pub scope: Scope,
    pub apis: Vec<ApiType>,
    pub type_filter: Option<String>,
    pub fragments_to_copy: Vec<String>,
    pub non_persistent: Option<bool>,
}

impl Subscription {
    /// Translate into the create-subscription wire request.
    pub fn to_request(&self) -> SubscriptionRequest {
        let (context, source) = match &self.scope {
            Scope::Object { id } => (
                SubscriptionContext::ManagedObject,
                Some(SourceReference { id: id.clone() }),
            ),
            Scope::Tenant => (SubscriptionContext::Tenant, None),
        };

        let filter = SubscriptionFilter {
            apis: self.apis.iter().map(|api| api.as_str().to_string()).collect(),
            type_filter: self.type_filter.clone(),
        };
        let subscription_filter = if filter.apis.is_empty() && filter.type_filter.is_none() {
            None
        } else {
            Some(filter)
        };

        SubscriptionRequest {
            context,
            subscription: self.name.clone(),
            source,
            subscription_filter,
            fragments_to_copy: self.fragments_to_copy.clone(),
            non_persistent: self.non_persistent,
        }
    }
}

/// Resolve the id of the subscription registered under `name`.
///
/// `Ok(None)` means the subscription does not exist yet. A 404 from the
/// lookup itself is a failed call (`ApiErrorKind::Status(404)`).
pub async fn find(api: &dyn NotificationApi, name: &str) -> Result<Option<String>, Error> {
    lookup(api, name).await.map_err(Error::not_found_as_status)
}

async fn lookup(api: &dyn NotificationApi, name: &str) -> Result<Option<String>, Error> {
    let collection = api.find_subscriptions(name).await?;

    Ok(collection
        .subscriptions
        .into_iter()
        .next()
        .and_then(|subscription| subscription.id))
}

/// Create the remote subscription and return its id.
pub async fn create(api: &dyn NotificationApi, subscription: &Subscription) -> Result<String, Error> {
    let resource = api
        .create_subscription(&subscription.to_request())
        .await
        .map_err(Error::not_found_as_status)?;
    let id = resource.id.ok_or_else(empty_result_error)?;

    info!("Created subscription {} with id {}", subscription.name, id);
    Ok(id)
}

/// Delete the subscription registered under `name`.
///
/// A subscription that does not exist is reported as `ErrorKind::NotFound`.
pub async fn delete(api: &dyn NotificationApi, name: &str) -> Result<(), Error> {
    let id = lookup(api, name)
        .await?
        .ok_or_else(|| not_found_error(&format!("Subscription {name} does not exist")))?;

    api.delete_subscription(&id).await?;

    info!("Deleted subscription {} with id {}", name, id);
    Ok(())
}

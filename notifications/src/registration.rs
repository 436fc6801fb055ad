//! Subscription descriptors as supplied by callers of the orchestrator.

use platform_api::subscriptions::{ApiType, Scope, Subscription};

use crate::error::{Error, ErrorKind};

/// What to subscribe to, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterNotification {
    subscription: Subscription,
}

impl RegisterNotification {
    /// Notifications of a single object.
    pub fn object(
        name: &str,
        id: &str,
        apis: Vec<ApiType>,
        type_filter: Option<&str>,
        fragments_to_copy: Vec<String>,
        non_persistent: Option<bool>,
    ) -> Self {
        Self::build(
            name,
            Scope::Object { id: id.to_string() },
            apis,
            type_filter,
            fragments_to_copy,
            non_persistent,
        )
    }

    /// Tenant-wide notifications, narrowed by `apis` and `type_filter`.
    pub fn tenant(
        name: &str,
        apis: Vec<ApiType>,
        type_filter: Option<&str>,
        fragments_to_copy: Vec<String>,
        non_persistent: Option<bool>,
    ) -> Self {
        Self::build(
            name,
            Scope::Tenant,
            apis,
            type_filter,
            fragments_to_copy,
            non_persistent,
        )
    }

    fn build(
        name: &str,
        scope: Scope,
        apis: Vec<ApiType>,
        type_filter: Option<&str>,
        fragments_to_copy: Vec<String>,
        non_persistent: Option<bool>,
    ) -> Self {
        Self {
            subscription: Subscription {
                name: name.to_string(),
                scope,
                apis,
                type_filter: type_filter.map(str::to_string),
                fragments_to_copy,
                non_persistent,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.subscription.name
    }

    pub fn non_persistent(&self) -> Option<bool> {
        self.subscription.non_persistent
    }

    /// Check the descriptor and hand out the subscription it describes.
    ///
    /// All problems are reported together in one `InvalidRegistration` error.
    pub fn validate(&self) -> Result<&Subscription, Error> {
        let subscription = &self.subscription;
        let mut problems = Vec::new();

        if subscription.name.trim().is_empty() {
            problems.push("Subscription name is required and cannot be empty.");
        }
        if let Scope::Object { id } = &subscription.scope {
            if id.trim().is_empty() {
                problems.push("Object id is required and cannot be empty.");
            }
        }
        let type_missing = subscription
            .type_filter
            .as_deref()
            .map_or(true, |t| t.trim().is_empty());
        if subscription.apis.contains(&ApiType::Events) && type_missing {
            problems.push("Type is required for the events api.");
        }

        if problems.is_empty() {
            Ok(subscription)
        } else {
            Err(Error {
                source: Some(problems.join(" ").into()),
                error_kind: ErrorKind::InvalidRegistration,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_object_registration() {
        let registration = RegisterNotification::object(
            "device-alarms",
            "12345",
            vec![ApiType::Alarms],
            None,
            vec![],
            Some(true),
        );

        let subscription = registration.validate().unwrap();

        assert_eq!(
            subscription.scope,
            Scope::Object {
                id: "12345".to_string()
            }
        );
        assert_eq!(registration.non_persistent(), Some(true));
    }

    #[test]
    fn test_object_registration_collects_all_problems() {
        let err = RegisterNotification::object(" ", "", vec![], None, vec![], None)
            .validate()
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::InvalidRegistration);
        assert_eq!(
            err.message(),
            "Subscription name is required and cannot be empty. Object id is required and cannot be empty."
        );
    }

    #[test]
    fn test_events_require_a_type() {
        let err = RegisterNotification::tenant("events", vec![ApiType::Events], None, vec![], None)
            .validate()
            .unwrap_err();
        assert_eq!(err.message(), "Type is required for the events api.");

        RegisterNotification::tenant(
            "events",
            vec![ApiType::Events],
            Some("c8y_Heat"),
            vec![],
            None,
        )
        .validate()
        .unwrap();
    }

    #[test]
    fn test_tenant_registration_without_filters_is_valid() {
        let registration = RegisterNotification::tenant("everything", vec![], None, vec![], None);

        assert_eq!(registration.validate().unwrap().scope, Scope::Tenant);
        assert_eq!(registration.name(), "everything");
    }
}

//! # platform-api
//!
//! REST-side collaborators of the notification subsystem:
//! - Subscription registrar (get-or-create, delete by name)
//! - Notification token lifecycle (create, refresh when expired, revoke)
//! - Token expiry validation against an injectable clock
//! - Per-tenant API access with Basic authentication
//! - HTTP client building with retry middleware
//!
//! ## Usage
//!
//! ```rust,ignore
//! use platform_api::{
//!     subscriptions, tokens,
//!     tenants::{TenantApiProvider, TenantRegistry},
//!     tokens::{TokenClaim, TokenProvider, TokenValidator},
//! };
//! ```

pub mod api;
pub mod clock;
pub mod credentials;
pub mod error;
pub mod http;
pub mod subscriptions;
pub mod tenants;
pub mod tokens;

// Re-export commonly used types
pub use api::NotificationApi;
pub use error::{Error, ErrorKind};

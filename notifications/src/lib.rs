//! # notifications
//!
//! Streaming side of the notification subsystem:
//! - Message extraction and the typed message envelope
//! - Subscription descriptors with validation
//! - WebSocket transport behind the `Transport`/`Socket` traits
//! - One connection per subscription with receive and monitor loops
//! - `NotificationManager`, keyed by (tenant, subscription name)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use notifications::{
//!     config::StaticSettingsProvider, handler::LogHandler, manager::NotificationManager,
//!     registration::RegisterNotification, transport::WebSocketTransport,
//! };
//!
//! let manager = NotificationManager::new(tenants, settings, Arc::new(WebSocketTransport), clock);
//! manager.register("t100", &registration, Arc::new(LogHandler::new("alarms"))).await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod manager;
pub mod message;
pub mod registration;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod testing;

pub use error::{Error, ErrorKind};
pub use manager::NotificationManager;

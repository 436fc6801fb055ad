//! HTTP client building with middleware.

mod client;
mod retry;

pub use client::{PlatformClientBuilder, DEFAULT_ENDPOINT};
pub use retry::BackoffPolicy;

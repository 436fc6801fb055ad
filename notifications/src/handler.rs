//! Caller supplied processing of delivered messages.

use async_trait::async_trait;
use log::*;

use crate::message::MessageObject;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes the messages of one subscription.
///
/// A message is acknowledged only when `handle` returns `Ok`. Returning an
/// error (or panicking) leaves it unacknowledged, so the platform delivers it
/// again on the next connect.
#[async_trait]
pub trait DataFeedHandler: Send + Sync {
    async fn handle(&self, message: &MessageObject) -> Result<(), HandlerError>;
}

/// Handler that only logs what it receives.
#[derive(Debug, Default, Clone)]
pub struct LogHandler {
    subscription: String,
}

impl LogHandler {
    pub fn new(subscription: &str) -> Self {
        Self {
            subscription: subscription.to_string(),
        }
    }
}

#[async_trait]
impl DataFeedHandler for LogHandler {
    async fn handle(&self, message: &MessageObject) -> Result<(), HandlerError> {
        info!(
            "[{}] {} {}: {}",
            self.subscription, message.action.text, message.api.text, message.message
        );
        Ok(())
    }
}

//! Error types for the `notifications` crate.

use platform_api::error::{ApiErrorKind, Error as PlatformError, ErrorKind as PlatformErrorKind};
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// Subscription, token or active connection does not exist.
    NotFound,
    /// The tenant has no registered API access.
    TenantNotFound(String),
    /// A remote call failed or returned an empty result.
    Api { status: Option<u16> },
    /// The token could not be decoded.
    Token,
    Transport(TransportErrorKind),
    /// The operation timeout elapsed.
    Timeout,
    /// The operation was cancelled from outside.
    Cancelled,
    /// The connection is not in a state that allows the operation.
    InvalidState,
    /// The subscription descriptor failed validation.
    InvalidRegistration,
    Config,
    /// A guarded resource could not be locked in time.
    Lock,
}

#[derive(Debug, PartialEq)]
pub enum TransportErrorKind {
    ConnectionRefused,
    Connect,
    Send,
    Receive,
    Closed,
}

impl Error {
    /// Transport failures and timeouts are worth retrying; everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::Transport(_) | ErrorKind::Timeout
        )
    }

    /// Status code of a failed remote call, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self.error_kind {
            ErrorKind::Api { status } => status,
            _ => None,
        }
    }

    /// Human readable message of the underlying cause.
    pub fn message(&self) -> String {
        match &self.source {
            Some(source) => source.to_string(),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::TenantNotFound(tenant) => write!(f, "No API access for tenant {tenant}"),
            ErrorKind::Api { status: Some(status) } => {
                write!(f, "API error (status {status}): {}", self.source_text())
            }
            ErrorKind::Api { status: None } => write!(f, "API error: {}", self.source_text()),
            kind => write!(f, "{kind:?}: {}", self.source_text()),
        }
    }
}

impl Error {
    fn source_text(&self) -> String {
        self.source
            .as_ref()
            .map(|source| source.to_string())
            .unwrap_or_default()
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<PlatformError> for Error {
    fn from(err: PlatformError) -> Self {
        let error_kind = match &err.error_kind {
            PlatformErrorKind::NotFound => ErrorKind::NotFound,
            PlatformErrorKind::TenantNotFound(tenant) => ErrorKind::TenantNotFound(tenant.clone()),
            PlatformErrorKind::Api(ApiErrorKind::Status(status)) => ErrorKind::Api {
                status: Some(*status),
            },
            PlatformErrorKind::Api(_) | PlatformErrorKind::Http(_) => {
                ErrorKind::Api { status: None }
            }
            PlatformErrorKind::Token(_) => ErrorKind::Token,
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Config,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        let kind = match &err {
            WsError::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
                TransportErrorKind::ConnectionRefused
            }
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportErrorKind::Closed,
            _ => TransportErrorKind::Connect,
        };

        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Transport(kind),
        }
    }
}

pub(crate) fn transport_error(kind: TransportErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Transport(kind),
    }
}

pub(crate) fn invalid_state_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::InvalidState,
    }
}

pub(crate) fn not_found_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::NotFound,
    }
}

pub(crate) fn config_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Config,
    }
}

pub(crate) fn timeout_error(after: Duration) -> Error {
    Error {
        source: Some(format!("Operation timed out after {after:?}.").into()),
        error_kind: ErrorKind::Timeout,
    }
}

pub(crate) fn cancelled_error() -> Error {
    Error {
        source: Some("Operation was cancelled.".into()),
        error_kind: ErrorKind::Cancelled,
    }
}

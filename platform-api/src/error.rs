//! Error types for the `platform-api` crate.
//!
//! A root Error struct carries the error kind plus an optional source for chaining.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for platform-api crate.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors returned by platform calls.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The remote resource (subscription or token) does not exist.
    NotFound,
    /// No API access is registered for the tenant.
    TenantNotFound(String),
    Api(ApiErrorKind),
    Token(TokenErrorKind),
    Http(HttpErrorKind),
}

/// Errors from remote API calls.
#[derive(Debug, PartialEq)]
pub enum ApiErrorKind {
    /// The platform answered with a non-success status other than 404.
    Status(u16),
    /// The call succeeded but the expected value was missing.
    EmptyResult,
    /// The request never produced a response.
    Request,
    /// The response body could not be decoded.
    InvalidResponse,
}

/// Errors from token inspection.
#[derive(Debug, PartialEq)]
pub enum TokenErrorKind {
    Malformed,
}

/// Errors from HTTP client construction.
#[derive(Debug, PartialEq)]
pub enum HttpErrorKind {
    BuilderFailed,
    InvalidUrl,
}

impl Error {
    /// Status code of the failed call, if the platform returned one.
    pub fn status_code(&self) -> Option<u16> {
        match self.error_kind {
            ErrorKind::Api(ApiErrorKind::Status(status)) => Some(status),
            ErrorKind::NotFound => Some(404),
            _ => None,
        }
    }

    /// Reports a 404 as a failed call instead of a missing resource.
    ///
    /// Lookups and creations use this; only deletes and revocations surface
    /// `ErrorKind::NotFound`.
    pub fn not_found_as_status(self) -> Self {
        match self.error_kind {
            ErrorKind::NotFound => Error {
                source: self.source,
                error_kind: ErrorKind::Api(ApiErrorKind::Status(404)),
            },
            error_kind => Error {
                source: self.source,
                error_kind,
            },
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
            ErrorKind::NotFound => write!(f, "Resource not found")?,
            ErrorKind::TenantNotFound(tenant) => write!(f, "No API access for tenant {tenant}")?,
            ErrorKind::Api(kind) => write!(f, "API error: {:?}", kind)?,
            ErrorKind::Token(kind) => write!(f, "Token error: {:?}", kind)?,
            ErrorKind::Http(kind) => write!(f, "HTTP error: {:?}", kind)?,
        }
        match &self.source {
            Some(source) => write!(f, " ({source})"),
            None => Ok(()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = match err.status() {
            Some(status) if status == reqwest::StatusCode::NOT_FOUND => ErrorKind::NotFound,
            Some(status) => ErrorKind::Api(ApiErrorKind::Status(status.as_u16())),
            None if err.is_builder() => ErrorKind::Http(HttpErrorKind::BuilderFailed),
            None if err.is_decode() => ErrorKind::Api(ApiErrorKind::InvalidResponse),
            None => ErrorKind::Api(ApiErrorKind::Request),
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<reqwest_middleware::Error> for Error {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(err) => err.into(),
            reqwest_middleware::Error::Middleware(err) => Error {
                source: Some(err.into()),
                error_kind: ErrorKind::Api(ApiErrorKind::Request),
            },
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Http(HttpErrorKind::InvalidUrl),
        }
    }
}

/// Helper function to create API errors.
pub fn api_error(kind: ApiErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Api(kind),
    }
}

/// Helper function for a successful call that returned nothing usable.
pub fn empty_result_error() -> Error {
    api_error(ApiErrorKind::EmptyResult, "Result is null.")
}

/// Helper function to create not-found errors.
pub fn not_found_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::NotFound,
    }
}

/// Helper function to create token errors.
pub fn malformed_token_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Token(TokenErrorKind::Malformed),
    }
}

/// Helper function to create tenant errors.
pub fn tenant_not_found_error(tenant: &str) -> Error {
    Error {
        source: None,
        error_kind: ErrorKind::TenantNotFound(tenant.to_string()),
    }
}

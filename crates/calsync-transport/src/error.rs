//! Error types for calendar transport operations.
//!
//! Every transport call reports failures as a [`TransportError`]. The engine
//! only needs to tell three things apart: a version conflict (recovered by
//! refetching), a missing resource (used to detect already-committed grace
//! tasks) and everything else (surfaced to the user).

use std::fmt;
use thiserror::Error;

/// The category of a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorCode {
    /// Authentication failed or credentials are invalid/expired.
    AuthenticationFailed,
    /// Authorization failed - user lacks permission.
    AuthorizationFailed,
    /// Connection failed, timeout, DNS resolution, etc.
    NetworkError,
    /// Too many requests.
    RateLimited,
    /// Server returned a 5xx status.
    ServerError,
    /// The response could not be understood.
    InvalidResponse,
    /// Resource not found (404).
    NotFound,
    /// Resource existed but is gone (410).
    Gone,
    /// The supplied version tag is stale (412).
    VersionConflict,
    /// Request was rejected as invalid (400).
    BadRequest,
    /// Calendar payload could not be encoded or decoded.
    CodecError,
    /// Missing or invalid configuration.
    ConfigurationError,
    /// Unexpected internal state.
    InternalError,
}

impl TransportErrorCode {
    /// Returns true if this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::Gone => "gone",
            Self::VersionConflict => "version_conflict",
            Self::BadRequest => "bad_request",
            Self::CodecError => "codec_error",
            Self::ConfigurationError => "configuration_error",
            Self::InternalError => "internal_error",
        }
    }

    /// Maps an unsuccessful HTTP status to an error code.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::AuthenticationFailed,
            403 => Self::AuthorizationFailed,
            404 => Self::NotFound,
            410 => Self::Gone,
            412 => Self::VersionConflict,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::InvalidResponse,
        }
    }
}

impl fmt::Display for TransportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error that occurred while talking to the calendar server.
#[derive(Debug, Error)]
pub struct TransportError {
    code: TransportErrorCode,
    message: String,
    /// HTTP status, when the error comes from a response.
    status: Option<u16>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(code: TransportErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Creates an error from an unsuccessful HTTP response.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(TransportErrorCode::from_status(status), message).with_status(status)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorCode::NetworkError, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(TransportErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(TransportErrorCode::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportErrorCode::NotFound, message).with_status(404)
    }

    /// Creates a version conflict error (stale version tag).
    pub fn version_conflict(message: impl Into<String>) -> Self {
        Self::new(TransportErrorCode::VersionConflict, message).with_status(412)
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Self::new(TransportErrorCode::CodecError, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(TransportErrorCode::ConfigurationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(TransportErrorCode::InternalError, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> TransportErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the HTTP status, if the error comes from a response.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Returns true if the server rejected a stale version tag.
    pub fn is_version_conflict(&self) -> bool {
        self.code == TransportErrorCode::VersionConflict
    }

    /// Returns true if the resource does not exist (anymore).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.code,
            TransportErrorCode::NotFound | TransportErrorCode::Gone
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.code, status, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

/// A specialized Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

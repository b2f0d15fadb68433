//! Notification error types.

use stomp_codec::StompError;
use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, NotificationError>;

/// Errors that can occur while delivering notifications.
///
/// Connection and credential errors never reach callers of the service; the
/// connection manager consumes them in its reconnect loop.
#[derive(Error, Debug)]
pub enum NotificationError {
    /// Transport-level open/close/error
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server refused the bearer credential during the STOMP handshake
    #[error("Credential rejected: {0}")]
    CredentialRejected(String),

    /// A single inbound frame could not be turned into a notification
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Binding subscriptions failed on an otherwise open session
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// STOMP framing errors
    #[error("STOMP error: {0}")]
    Stomp(#[from] StompError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl NotificationError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a credential rejection.
    pub fn credential_rejected(msg: impl Into<String>) -> Self {
        Self::CredentialRejected(msg.into())
    }

    /// Create a subscription error.
    pub fn subscription(msg: impl Into<String>) -> Self {
        Self::Subscription(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether the error ends the transport session (as opposed to a single bad frame).
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::CredentialRejected(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for NotificationError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

/// Why an inbound payload was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing or empty `type`")]
    MissingType,

    #[error("missing `message`")]
    MissingMessage,
}

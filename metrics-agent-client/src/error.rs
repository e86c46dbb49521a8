use std::time::Duration;

use hyper::StatusCode;
use thiserror::Error;

/// Errors that could occur while adding a datapoint to a batch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    /// The number of label values does not match the number of measured label keys.
    #[error("metric {name:?} expects {expected} label values but {actual} were supplied")]
    LabelCountMismatch {
        /// Name of the metric definition.
        name: String,
        /// Number of measured label keys of the definition.
        expected: usize,
        /// Number of label values supplied.
        actual: usize,
    },
}

/// Errors that could occur while encoding metric families.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Protobuf encoding of a family failed.
    #[error("failed to encode metric family: {0}")]
    Protobuf(#[from] prost::EncodeError),

    /// Rendering the text form failed.
    #[error("failed to render metric family as text")]
    Text(#[from] std::fmt::Error),
}

/// Errors that could occur while performing an HTTP request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be built.
    #[error("failed to build HTTP request: {0}")]
    Build(#[from] hyper::http::Error),

    /// The request could not be sent, or no response was received.
    #[error("HTTP request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    /// The response body could not be read.
    #[error("failed to read HTTP response body: {0}")]
    Body(#[from] hyper::Error),

    /// The request did not complete within the configured timeout.
    #[error("HTTP request timed out after {0:?}")]
    Timeout(Duration),

    /// The TLS connector could not be set up.
    #[error("failed to set up TLS connector: {0}")]
    Tls(#[source] std::io::Error),
}

/// Errors that could occur while sending a batch.
#[derive(Debug, Error)]
pub enum SendError {
    /// The server-advised send interval, or the local backoff, has not elapsed yet.
    #[error("metrics sent faster than server requested, retry in {retry_in:?}")]
    TooFrequent {
        /// Remaining time before a send will be accepted.
        retry_in: Duration,
    },

    /// The batch could not be encoded; it never reached the network.
    #[error("failed to serialize batch: {0}")]
    Serialization(#[from] EncodeError),

    /// The request failed at the transport level.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a status other than `202 Accepted`.
    #[error("received unexpected HTTP status: {status}")]
    UnexpectedStatus {
        /// Status returned by the server.
        status: StatusCode,
    },
}

impl SendError {
    /// Whether this error counts as a failed send attempt for backoff purposes.
    pub fn is_send_failure(&self) -> bool {
        matches!(self, SendError::Transport(_) | SendError::UnexpectedStatus { .. })
    }
}

/// Errors that could occur while obtaining credentials for the push endpoint.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The auth service rejected the metadata token.
    #[error("invalid token supplied to authenticator")]
    InvalidToken,

    /// The request failed at the transport level.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A bootstrap endpoint answered with a non-success status.
    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus {
        /// Requested URL.
        url: String,
        /// Status returned by the server.
        status: StatusCode,
    },

    /// A bootstrap response could not be decoded.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Underlying decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// A bootstrap URL could not be built from the configured host.
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Details about the parsing failure.
        reason: String,
    },
}

/// Errors that could occur while building a client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The push endpoint could not be parsed as a URI.
    #[error("invalid push endpoint: {0}")]
    InvalidEndpoint(String),

    /// The app key cannot be sent as an HTTP header value.
    #[error("app key is not a valid HTTP header value")]
    InvalidAppKey,

    /// The HTTP transport could not be created.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

//! Error types for the OpenStack backend.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the OpenStack backend.
#[derive(Debug, Error)]
pub enum OpenStackError {
    /// Raised when the configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when Keystone rejects the credentials or omits the token.
    #[error("keystone authentication failed: {0}")]
    Auth(String),
    /// Raised when the catalog has no usable endpoint for a service.
    #[error("no {service} endpoint in the service catalog for region {region}")]
    EndpointNotFound {
        /// Service that could not be located.
        service: &'static str,
        /// Preferred region.
        region: String,
    },
    /// Raised when an API call returns a non-success status.
    #[error("{method} {url} returned HTTP {status}: {body}")]
    Http {
        /// HTTP method.
        method: String,
        /// Request URL.
        url: String,
        /// Status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
    /// Raised when the request could not be sent or the body not read.
    #[error("{method} {url} failed: {source}")]
    Transport {
        /// HTTP method.
        method: String,
        /// Request URL.
        url: String,
        /// Client error.
        #[source]
        source: reqwest::Error,
    },
    /// Raised when a response body does not have the expected shape.
    #[error("unexpected response from {url}: {message}")]
    Decode {
        /// Request URL.
        url: String,
        /// Decoder message.
        message: String,
    },
    /// Raised when writing downloaded bytes fails.
    #[error("failed to write image {image_id}: {source}")]
    Io {
        /// Image being downloaded.
        image_id: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for OpenStackError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

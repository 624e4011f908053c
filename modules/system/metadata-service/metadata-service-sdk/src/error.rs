//! Error types for the metadata service contracts.

use thiserror::Error;

/// Errors returned by metadata queries and storage strategies.
#[derive(Debug, Error)]
pub enum MetadataServiceError {
    /// Requested metadata does not exist
    #[error("Metadata not found: {0}")]
    NotFound(String),

    /// Backing storage cannot be reached
    #[error("Metadata storage unavailable: {message}")]
    StorageUnavailable {
        /// Error message
        message: String,
        /// Source error from the storage backend
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Backing storage rejected or failed the operation
    #[error("Metadata storage error: {message}")]
    Storage {
        /// Error message
        message: String,
        /// Source error from the storage backend
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl MetadataServiceError {
    /// Create a storage-unavailable error with a message only.
    #[must_use]
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error with a message only.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error with a source error.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error with a message only.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with a source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether the error means the backing storage could not be reached.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }
}

/// Errors raised by [`crate::Transport`] when opening or addressing listeners.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("Address already in use: {host}:{port}")]
    AddressInUse { host: String, port: u16 },

    #[error("Port {port} is bound for protocol '{bound}', cannot bind '{requested}'")]
    ProtocolConflict {
        port: u16,
        bound: String,
        requested: String,
    },

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Unknown listener: {0}")]
    UnknownListener(u64),

    #[error("Service already published on {address}: {service}")]
    ServiceInUse { address: String, service: String },

    #[error("I/O error binding {address}: {source}")]
    Io {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised on the client side of [`crate::Transport::invoke`].
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("No listener at {0}")]
    NoListener(String),

    #[error("Service not published: {0}")]
    NoService(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<InvokeError> for MetadataServiceError {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::NoListener(_) | InvokeError::Io(_) => Self::StorageUnavailable {
                message: "metadata endpoint unreachable".to_owned(),
                source: Some(Box::new(err)),
            },
            other => Self::internal_with_source("metadata query failed", other),
        }
    }
}

/// Errors raised by [`crate::ServiceUrl::parse`].
#[derive(Debug, Error)]
pub enum UrlParseError {
    #[error("Invalid service URL: {0}")]
    Invalid(#[from] url::ParseError),

    #[error("Service URL has no host: {0}")]
    MissingHost(String),

    #[error("Service URL has no port: {0}")]
    MissingPort(String),
}

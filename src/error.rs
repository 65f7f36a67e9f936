use std::sync::Arc;

/// Represents a result type for operations in the Branch SDK.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the Branch SDK.
///
/// Errors about a particular server request are not returned here. They are delivered to the
/// request's [`RequestCallback`](crate::RequestCallback) instead.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A request was enqueued without a callback while no default callback was set.
    #[error("callback cannot be None when no default callback is set")]
    MissingCallback,

    /// Invalid base URL configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// Indicates that the request worker thread panicked. This should normally never happen.
    #[error("request worker thread panicked")]
    WorkerThreadPanicked,

    /// `LinkInfo::create_url()` was called while a previous call was still in flight.
    #[error("link request already started")]
    LinkRequestInProgress,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// JSON (de)serialization error.
    #[error(transparent)]
    Json(Arc<serde_json::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Json(Arc::new(value))
    }
}

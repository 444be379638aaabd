use std::sync::Arc;

use thiserror::Error;

/// Status and body of a completed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse {
    pub status: u16,
    /// Error body as text; empty for successful writes
    pub body: String,
}

impl WriteResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Anything in `[200, 400)` counts as written.
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// The write never produced a response. These are the only failures that are retried.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("write to {url} timed out")]
    Timeout { url: String },

    #[error("write to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

/// A remote write endpoint addressed per record.
pub trait Destination: Send + Sync + 'static {
    /// Deliver `payload` to `url` over a fresh request.
    fn write(&self, url: &str, payload: &[u8]) -> Result<WriteResponse, TransportError>;
}

impl<D: Destination + ?Sized> Destination for Arc<D> {
    fn write(&self, url: &str, payload: &[u8]) -> Result<WriteResponse, TransportError> {
        (**self).write(url, payload)
    }
}

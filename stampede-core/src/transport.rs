use async_trait::async_trait;
use stampede_http::{HttpClient, HttpRequest, HttpResponse, HttpTransportErrorKind};

/// A request that produced no response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: HttpTransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: HttpTransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<stampede_http::Error> for TransportError {
    fn from(err: stampede_http::Error) -> Self {
        Self {
            kind: err.transport_error_kind(),
            message: err.to_string(),
        }
    }
}

/// Sends one request. Implemented by [`HttpClient`]; tests plug in scripted transports.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.request(req).await.map_err(TransportError::from)
    }
}

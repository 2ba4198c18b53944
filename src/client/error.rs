use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Rejected locally, before any network call
    #[error("invalid stats request: {0}")]
    Validation(String),
    /// No instance of the service could be located
    #[error("service '{0}' is unavailable")]
    ServiceUnavailable(String),
    #[error("invalid stats service url: {0}")]
    Url(#[from] url::ParseError),
    #[error("request to stats service failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("stats service responded with {0}")]
    Status(StatusCode),
}

impl ClientError {
    /// Whether another attempt could succeed: connection problems, timeouts,
    /// 5xx/429 responses and registry misses. Client errors and decode
    /// failures would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Validation(_) | ClientError::Url(_) => false,
            ClientError::ServiceUnavailable(_) => true,
            ClientError::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ClientError::Http(e) => {
                if let Some(status) = e.status() {
                    return status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
                }
                !e.is_decode() && !e.is_builder()
            }
        }
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, ClientError::Http(e) if e.is_connect())
    }
}

//! Error types shared across the catalog, the external clients, and the flows.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// The ticker catalog could not be loaded.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read ticker catalog {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed ticker catalog: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Failed to fetch ticker catalog: {0}")]
    Fetch(#[from] ApiError),
}

/// A call to the market data provider or the intent resolver failed.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned {status}: {message}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("{service}: {message}")]
    Malformed {
        service: &'static str,
        message: String,
    },

    #[error("{env} is not set")]
    MissingApiKey { env: String },
}

impl ApiError {
    pub fn transport(service: &'static str, source: reqwest::Error) -> Self {
        ApiError::Transport { service, source }
    }

    pub fn malformed(service: &'static str, message: impl Into<String>) -> Self {
        ApiError::Malformed {
            service,
            message: message.into(),
        }
    }

    /// Worth another attempt: connection trouble, timeouts, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport { source, .. } => {
                source.is_timeout() || source.is_connect()
            }
            ApiError::Status { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::Malformed { .. } | ApiError::MissingApiKey { .. } => false,
        }
    }
}

/// Failure of a user-facing flow. Nothing propagates past a flow except this.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Failed to process request: {0}")]
    CatalogLoad(#[from] CatalogError),

    #[error(
        "Company \"{0}\" not found in S&P 500 list. Please check the company name and try again."
    )]
    CompanyNotFound(String),

    #[error("Unable to process the request")]
    Unprocessable,

    #[error("Failed to process request: {0}")]
    Upstream(#[from] ApiError),
}

impl FlowError {
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self.to_string(),
        }
    }
}

/// The `{ "error": "..." }` shape handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
}

impl From<&FlowError> for ErrorEnvelope {
    fn from(err: &FlowError) -> Self {
        err.envelope()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_company_not_found_names_input() {
        let err = FlowError::CompanyNotFound("Not A Real Company".to_string());
        assert_eq!(
            err.envelope().error,
            "Company \"Not A Real Company\" not found in S&P 500 list. Please check the company name and try again."
        );
    }

    #[test]
    fn test_upstream_is_wrapped() {
        let err = FlowError::from(ApiError::malformed("polygon", "Failed to fetch stock data"));
        assert_eq!(
            err.to_string(),
            "Failed to process request: polygon: Failed to fetch stock data"
        );
    }

    #[test]
    fn test_envelope_serializes() {
        let json = serde_json::to_string(&FlowError::Unprocessable.envelope()).unwrap();
        assert_eq!(json, r#"{"error":"Unable to process the request"}"#);
    }

    #[test]
    fn test_transient_classification() {
        let server = ApiError::Status {
            service: "polygon",
            status: reqwest::StatusCode::BAD_GATEWAY,
            message: String::new(),
        };
        let throttled = ApiError::Status {
            service: "polygon",
            status: reqwest::StatusCode::TOO_MANY_REQUESTS,
            message: String::new(),
        };
        let forbidden = ApiError::Status {
            service: "polygon",
            status: reqwest::StatusCode::FORBIDDEN,
            message: String::new(),
        };
        assert!(server.is_transient());
        assert!(throttled.is_transient());
        assert!(!forbidden.is_transient());
        assert!(!ApiError::malformed("openai", "bad json").is_transient());
    }
}

use reqwest::StatusCode;
use thiserror::Error;

use crate::models::DecodeError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Could not reach {host}: {source}")]
    Connectivity {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{} {}: {body}", .status.as_u16(), .status.canonical_reason().unwrap_or("Unknown"))]
    Endpoint { status: StatusCode, body: String },

    #[error("Unexpected response shape: {0}")]
    Decode(#[from] DecodeError),

    #[error("Session store error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        ApiError::Endpoint {
            status,
            body: Self::truncate_body(body),
        }
    }

    pub(crate) fn connectivity(url: &str, source: reqwest::Error) -> Self {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        ApiError::Connectivity { host, source }
    }

    /// HTTP status for endpoint errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Endpoint { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, ApiError::Connectivity { .. })
    }
}

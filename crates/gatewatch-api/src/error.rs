//! Discriminated API error returned by every transport operation.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Structured error body the gateway returns on non-2xx responses:
/// `{ "error": { "code": "...", "message": "..." } }`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorBodyInner,
}

#[derive(Debug, Deserialize)]
struct ErrorBodyInner {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Failure of an API call, tagged at the transport boundary so callers
/// branch on variants instead of sniffing properties of opaque values.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("api_base_url_missing")]
    BaseUrlMissing,
    #[error("api_invalid_path")]
    InvalidPath,
    /// The request never produced a response (connect/timeout/DNS).
    #[error("api_request_failed:{message}")]
    Request { message: String },
    #[error("api_read_failed:{message}")]
    Read { message: String },
    /// The gateway answered with a non-success status.
    #[error("api_http_{status}:{}", message.as_deref().unwrap_or("<empty>"))]
    Http {
        status: StatusCode,
        /// Machine-readable code from the structured error body, if any.
        code: Option<String>,
        /// Human-readable message from the structured error body, if any.
        message: Option<String>,
    },
    #[error("api_json_decode_failed:{message}")]
    Decode { message: String },
    /// The operation needs an access token and the client holds none.
    #[error("api_not_authenticated")]
    NotAuthenticated,
}

impl ApiError {
    /// Whether the gateway rejected the caller's credentials.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::Http {
                status: StatusCode::UNAUTHORIZED,
                ..
            } | Self::NotAuthenticated
        )
    }

    /// Whether the failure happened before any response arrived.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::Read { .. })
    }

    /// Message suitable for direct display: prefers the gateway's
    /// structured message, falls back to a generic one.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Http {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.trim().to_string(),
            Self::Http { status, .. } => format!("The request failed ({status})"),
            Self::Request { .. } | Self::Read { .. } => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            Self::NotAuthenticated => "Your session has expired. Please sign in again.".to_string(),
            _ => "An unexpected error occurred".to_string(),
        }
    }

    /// Map a non-success response into [`ApiError::Http`], recovering the
    /// structured code/message when the body carries one.
    #[must_use]
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorBody>(body) {
            Ok(parsed) => Self::Http {
                status,
                code: parsed.error.code,
                message: parsed.error.message,
            },
            Err(_) => {
                let text = String::from_utf8_lossy(body);
                let trimmed = text.trim();
                Self::Http {
                    status,
                    code: None,
                    message: (!trimmed.is_empty()).then(|| trimmed.to_string()),
                }
            }
        }
    }
}

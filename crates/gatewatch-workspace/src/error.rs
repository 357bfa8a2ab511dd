//! Classified workspace failures.
//!
//! Every failure leaving the workspace layer is a [`WorkspaceError`] with
//! a stable machine code, a technical message for logs, and a message safe
//! to show directly. Once constructed, the code is immutable: wrapping
//! adds context but never re-classifies.

use gatewatch_api::error::ApiError;
use serde_json::Value;
use thiserror::Error;

use crate::slug::{SlugError, SlugKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceErrorCode {
    InvalidOrgSlug,
    InvalidProjectSlug,
    OrgNotFound,
    ProjectNotFound,
    NoAccess,
    ApiFailure,
    NetworkError,
    Unknown,
}

impl WorkspaceErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidOrgSlug => "invalid_org_slug",
            Self::InvalidProjectSlug => "invalid_project_slug",
            Self::OrgNotFound => "org_not_found",
            Self::ProjectNotFound => "project_not_found",
            Self::NoAccess => "no_access",
            Self::ApiFailure => "api_failure",
            Self::NetworkError => "network_error",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("workspace_{}:{message}", code.as_str())]
pub struct WorkspaceError {
    code: WorkspaceErrorCode,
    /// Technical message for logs.
    pub message: String,
    /// Message safe to render directly.
    pub user_message: String,
    /// Optional structured context (the offending slug, ids, ...).
    pub context: Option<Value>,
    /// The transport failure this classifies, when there was one.
    #[source]
    pub source: Option<ApiError>,
}

impl WorkspaceError {
    fn new(code: WorkspaceErrorCode, message: String, user_message: String) -> Self {
        Self {
            code,
            message,
            user_message,
            context: None,
            source: None,
        }
    }

    /// The immutable classification of this error.
    #[must_use]
    pub fn code(&self) -> WorkspaceErrorCode {
        self.code
    }

    #[must_use]
    pub fn invalid_slug(kind: SlugKind, slug: &str, cause: &SlugError) -> Self {
        let code = match kind {
            SlugKind::Organization => WorkspaceErrorCode::InvalidOrgSlug,
            SlugKind::Project => WorkspaceErrorCode::InvalidProjectSlug,
        };
        Self::new(
            code,
            format!("malformed {} slug {slug:?}: {cause}", kind.as_str()),
            format!("This {} link is not valid.", kind.as_str()),
        )
        .with_context(serde_json::json!({ "slug": slug }))
    }

    #[must_use]
    pub fn not_found(kind: SlugKind, id: &str) -> Self {
        let code = match kind {
            SlugKind::Organization => WorkspaceErrorCode::OrgNotFound,
            SlugKind::Project => WorkspaceErrorCode::ProjectNotFound,
        };
        Self::new(
            code,
            format!("no {} matches id {id:?}", kind.as_str()),
            format!(
                "This {} doesn't exist or you don't have access to it.",
                kind.as_str()
            ),
        )
        .with_context(serde_json::json!({ "id": id }))
    }

    /// Classify a transport failure: connectivity problems get the
    /// `network_error` code, a 403 is `no_access`, everything else
    /// `api_failure`.
    #[must_use]
    pub fn from_api(error: ApiError) -> Self {
        let code = if error.is_network() {
            WorkspaceErrorCode::NetworkError
        } else if is_forbidden(&error) {
            WorkspaceErrorCode::NoAccess
        } else {
            WorkspaceErrorCode::ApiFailure
        };
        let user_message = if code == WorkspaceErrorCode::NoAccess {
            "You don't have permission to do that.".to_string()
        } else {
            error.user_message()
        };
        let mut classified = Self::new(code, error.to_string(), user_message);
        classified.source = Some(error);
        classified
    }

    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(
            WorkspaceErrorCode::Unknown,
            message.into(),
            "An unexpected error occurred".to_string(),
        )
    }

    /// Attach structured context. The code is preserved.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

fn is_forbidden(error: &ApiError) -> bool {
    matches!(error, ApiError::Http { status, .. } if status.as_u16() == 403)
}

// ApiError is not PartialEq, so compare by classification and message;
// enough for asserting structural equality of resolution outputs.
impl PartialEq for WorkspaceError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.message == other.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slug::decode_slug;

    #[test]
    fn slug_failures_classify_by_kind() {
        let cause = decode_slug("bad", SlugKind::Project).expect_err("malformed");
        let error = WorkspaceError::invalid_slug(SlugKind::Project, "bad", &cause);
        assert_eq!(error.code(), WorkspaceErrorCode::InvalidProjectSlug);
        assert_eq!(error.code().as_str(), "invalid_project_slug");
        assert_eq!(
            error.context.as_ref().and_then(|c| c["slug"].as_str()),
            Some("bad")
        );
    }

    #[test]
    fn transport_failures_split_network_from_api() {
        let network = WorkspaceError::from_api(ApiError::Request {
            message: "connection refused".to_string(),
        });
        assert_eq!(network.code(), WorkspaceErrorCode::NetworkError);

        let api = WorkspaceError::from_api(ApiError::from_response(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            b"boom",
        ));
        assert_eq!(api.code(), WorkspaceErrorCode::ApiFailure);
        assert!(api.source.is_some());
    }

    #[test]
    fn forbidden_responses_classify_as_no_access() {
        let denied = WorkspaceError::from_api(ApiError::from_response(
            reqwest::StatusCode::FORBIDDEN,
            br#"{"error":{"code":"insufficient_role","message":"admin required"}}"#,
        ));
        assert_eq!(denied.code(), WorkspaceErrorCode::NoAccess);
        assert_eq!(denied.user_message, "You don't have permission to do that.");
    }

    #[test]
    fn wrapping_preserves_the_code() {
        let error = WorkspaceError::not_found(SlugKind::Organization, "o1a2b3c4d")
            .with_context(serde_json::json!({ "attempt": 2 }));
        assert_eq!(error.code(), WorkspaceErrorCode::OrgNotFound);
    }

    #[test]
    fn user_messages_are_presentable() {
        let error = WorkspaceError::not_found(SlugKind::Project, "p7f3ka92x");
        assert_eq!(
            error.user_message,
            "This project doesn't exist or you don't have access to it."
        );
    }
}

//! Wire shapes shared by the authentication and workspace APIs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Membership role inside an organization, ordered weakest to strongest.
///
/// The derived `Ord` gives the strict hierarchy
/// `Viewer < Developer < Admin < Owner`; a stronger role satisfies any
/// weaker requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    Viewer,
    Developer,
    Admin,
    Owner,
}

impl OrgRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Developer => "developer",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "viewer" => Some(Self::Viewer),
            "developer" => Some(Self::Developer),
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }
}

/// Billing plan of an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Pro,
    Enterprise,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub organization_id: String,
}

/// An organization the user belongs to, with nested project summaries.
///
/// Immutable from the client's perspective: mutations happen server-side
/// and are observed via refetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub plan: PlanTier,
    /// The caller's role in this organization.
    pub role: OrgRole,
    #[serde(default)]
    pub projects: Vec<Project>,
}

/// The authenticated user snapshot.
///
/// Created on login/signup, replaced wholesale on profile update, cleared
/// on logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_organization_id: Option<String>,
    #[serde(default)]
    pub organizations: Vec<Organization>,
}

/// An access/refresh token pair with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthTokens {
    /// Build a pair expiring `expires_in_secs` seconds from now.
    #[must_use]
    pub fn expires_in_secs(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_secs: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    /// Whether the access token is inside `threshold` of its expiry.
    #[must_use]
    pub fn is_expired(&self, threshold: Duration) -> bool {
        Utc::now() >= self.expires_at - threshold
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: AuthTokens,
}

/// One fetch of "current user + organizations + nested projects".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub user: User,
    pub organizations: Vec<Organization>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_organization_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_hierarchy_is_strict() {
        assert!(OrgRole::Owner > OrgRole::Admin);
        assert!(OrgRole::Admin > OrgRole::Developer);
        assert!(OrgRole::Developer > OrgRole::Viewer);
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in [
            OrgRole::Viewer,
            OrgRole::Developer,
            OrgRole::Admin,
            OrgRole::Owner,
        ] {
            assert_eq!(OrgRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(OrgRole::parse("  Admin "), Some(OrgRole::Admin));
        assert_eq!(OrgRole::parse("superuser"), None);
    }

    #[test]
    fn tokens_expire_inside_threshold() {
        let fresh = AuthTokens::expires_in_secs("a", "r", 3600);
        assert!(!fresh.is_expired(Duration::seconds(30)));

        let nearly = AuthTokens::expires_in_secs("a", "r", 10);
        assert!(nearly.is_expired(Duration::seconds(30)));
    }

    #[test]
    fn user_deserializes_with_missing_optionals() {
        let user: User = serde_json::from_str(
            r#"{"id":"u1","email":"a@b.co","name":"A"}"#,
        )
        .expect("minimal user should deserialize");
        assert!(!user.email_verified);
        assert!(user.default_organization_id.is_none());
        assert!(user.organizations.is_empty());
    }
}

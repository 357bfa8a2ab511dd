//! Declarative auth/role gating, as pure functions over snapshots.
//!
//! A surface evaluates the guard on every render and maps the outcome to
//! a placeholder, its children, a redirect, or a dedicated denial screen.

use gatewatch_api::types::OrgRole;
use gatewatch_session::manager::{sign_in_redirect, SessionState, SessionStatus};

/// What a gated surface requires before its children may render.
#[derive(Debug, Clone, Default)]
pub struct GuardRequirements {
    pub require_verified_email: bool,
    /// Membership roles that satisfy the gate; empty means any role.
    pub required_roles: Vec<OrgRole>,
    /// Whether every listed role must be satisfied, or any one suffices.
    pub require_all: bool,
}

impl GuardRequirements {
    /// Signed-in, nothing more.
    #[must_use]
    pub fn authenticated() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn role(role: OrgRole) -> Self {
        Self {
            required_roles: vec![role],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn verified_email(mut self) -> Self {
        self.require_verified_email = true;
        self
    }
}

/// The guard's verdict, ordered by fallback specificity: a role failure
/// outranks an unverified email, which outranks the generic sign-in
/// redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Session still initializing; render a placeholder, decide nothing.
    Loading,
    Allow,
    RedirectToSignIn { return_to: String },
    Forbidden { required: Vec<OrgRole> },
    EmailUnverified,
}

/// Whether `actual` satisfies the role requirement. A stronger role
/// satisfies any weaker one (`Owner > Admin > Developer > Viewer`).
#[must_use]
pub fn role_satisfied(actual: Option<OrgRole>, required: &[OrgRole], require_all: bool) -> bool {
    if required.is_empty() {
        return true;
    }
    let Some(actual) = actual else {
        return false;
    };
    if require_all {
        required.iter().all(|&role| actual >= role)
    } else {
        required.iter().any(|&role| actual >= role)
    }
}

/// Evaluate the gate against the session snapshot and the caller's role
/// in the resolved organization.
#[must_use]
pub fn evaluate_auth_guard(
    session: &SessionState,
    role: Option<OrgRole>,
    current_path: &str,
    requirements: &GuardRequirements,
) -> GuardOutcome {
    match session.status {
        SessionStatus::Initializing => GuardOutcome::Loading,
        SessionStatus::Unauthenticated => GuardOutcome::RedirectToSignIn {
            return_to: sign_in_redirect(current_path),
        },
        SessionStatus::Authenticated => {
            let Some(user) = session.user.as_ref() else {
                // Authenticated without a user snapshot should not happen;
                // treat it as signed out rather than leaking children.
                return GuardOutcome::RedirectToSignIn {
                    return_to: sign_in_redirect(current_path),
                };
            };
            if !role_satisfied(role, &requirements.required_roles, requirements.require_all) {
                return GuardOutcome::Forbidden {
                    required: requirements.required_roles.clone(),
                };
            }
            if requirements.require_verified_email && !user.email_verified {
                return GuardOutcome::EmailUnverified;
            }
            GuardOutcome::Allow
        }
    }
}

#[cfg(test)]
mod tests {
    use gatewatch_api::types::User;

    use super::*;

    fn user(verified: bool) -> User {
        User {
            id: "u1".to_string(),
            email: "dev@example.com".to_string(),
            name: "Dev".to_string(),
            email_verified: verified,
            default_organization_id: None,
            organizations: Vec::new(),
        }
    }

    fn session(status: SessionStatus, user: Option<User>) -> SessionState {
        SessionState {
            user,
            status,
            last_error: None,
        }
    }

    #[test]
    fn stronger_roles_satisfy_weaker_requirements() {
        assert!(role_satisfied(
            Some(OrgRole::Owner),
            &[OrgRole::Developer],
            false
        ));
        assert!(!role_satisfied(
            Some(OrgRole::Viewer),
            &[OrgRole::Admin],
            false
        ));
        assert!(role_satisfied(None, &[], false));
        assert!(!role_satisfied(None, &[OrgRole::Viewer], false));
    }

    #[test]
    fn require_all_vs_any() {
        let required = [OrgRole::Developer, OrgRole::Admin];
        // Developer satisfies one of the two.
        assert!(role_satisfied(Some(OrgRole::Developer), &required, false));
        assert!(!role_satisfied(Some(OrgRole::Developer), &required, true));
        assert!(role_satisfied(Some(OrgRole::Admin), &required, true));
    }

    #[test]
    fn initializing_session_stays_loading() {
        let outcome = evaluate_auth_guard(
            &session(SessionStatus::Initializing, None),
            None,
            "/projects/p1",
            &GuardRequirements::authenticated(),
        );
        assert_eq!(outcome, GuardOutcome::Loading);
    }

    #[test]
    fn signed_out_redirects_with_the_return_path() {
        let outcome = evaluate_auth_guard(
            &session(SessionStatus::Unauthenticated, None),
            None,
            "/orgs/acme-o1aaaaaa",
            &GuardRequirements::authenticated(),
        );
        assert_eq!(
            outcome,
            GuardOutcome::RedirectToSignIn {
                return_to: "/signin?return_to=/orgs/acme-o1aaaaaa".to_string()
            }
        );
    }

    #[test]
    fn forbidden_outranks_unverified_email() {
        let requirements = GuardRequirements::role(OrgRole::Admin).verified_email();
        let outcome = evaluate_auth_guard(
            &session(SessionStatus::Authenticated, Some(user(false))),
            Some(OrgRole::Viewer),
            "/",
            &requirements,
        );
        // Both gates fail; the role failure is the more specific verdict.
        assert_eq!(
            outcome,
            GuardOutcome::Forbidden {
                required: vec![OrgRole::Admin]
            }
        );
    }

    #[test]
    fn unverified_email_blocks_after_roles_pass() {
        let requirements = GuardRequirements::authenticated().verified_email();
        let outcome = evaluate_auth_guard(
            &session(SessionStatus::Authenticated, Some(user(false))),
            Some(OrgRole::Owner),
            "/",
            &requirements,
        );
        assert_eq!(outcome, GuardOutcome::EmailUnverified);
    }

    #[test]
    fn satisfied_requirements_allow() {
        let requirements = GuardRequirements::role(OrgRole::Developer).verified_email();
        let outcome = evaluate_auth_guard(
            &session(SessionStatus::Authenticated, Some(user(true))),
            Some(OrgRole::Admin),
            "/",
            &requirements,
        );
        assert_eq!(outcome, GuardOutcome::Allow);
    }
}

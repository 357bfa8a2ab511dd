//! Pure workspace resolution from `(organizations, url path)`.
//!
//! No I/O, no mutation: repeated calls with identical inputs return
//! structurally equal results. Network fetching of the organization list
//! happens elsewhere ([`crate::service::WorkspaceService`]); this module
//! only derives the current org/project pointers from data already held.

use gatewatch_api::types::{Organization, Project};

use crate::error::WorkspaceError;
use crate::slug::{decode_slug, SlugKind};

/// The derived workspace pointers for one `(organizations, path)` input.
///
/// `error` and the pointers are not mutually exclusive in the type, but
/// resolution only ever produces one of: both pointers from a project
/// match, an organization alone, neither (with or without an error).
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWorkspace {
    pub organization: Option<Organization>,
    pub project: Option<Project>,
    pub error: Option<WorkspaceError>,
    /// True when a stored default organization id did not resolve to a
    /// membership and resolution silently fell back to the first one.
    pub used_default_fallback: bool,
}

impl ResolvedWorkspace {
    fn empty() -> Self {
        Self {
            organization: None,
            project: None,
            error: None,
            used_default_fallback: false,
        }
    }

    fn failed(error: WorkspaceError) -> Self {
        Self {
            error: Some(error),
            ..Self::empty()
        }
    }
}

/// Compute the current organization/project from the path, in priority
/// order:
///
/// 1. A `/projects/<slug>` segment pair: malformed slug classifies as
///    invalid before any lookup; a decoded id is searched across every
///    organization's projects (ids are globally unique, first match is
///    the only match); no match classifies as not-found with both
///    pointers empty.
/// 2. An `/orgs/<slug>` segment pair resolves the organization the same
///    way.
/// 3. No workspace context in the path: pick the stored default
///    organization when it resolves to a membership, else the first
///    membership, else none. Never an error — zero memberships is a
///    valid account state.
#[must_use]
pub fn resolve_workspace(
    organizations: &[Organization],
    default_organization_id: Option<&str>,
    path: &str,
) -> ResolvedWorkspace {
    if let Some(slug) = path_segment_after(path, "projects") {
        return resolve_project(organizations, slug);
    }
    if let Some(slug) = path_segment_after(path, "orgs") {
        return resolve_organization(organizations, slug);
    }
    resolve_default(organizations, default_organization_id)
}

fn resolve_project(organizations: &[Organization], slug: &str) -> ResolvedWorkspace {
    let decoded = match decode_slug(slug, SlugKind::Project) {
        Ok(decoded) => decoded,
        Err(cause) => {
            return ResolvedWorkspace::failed(WorkspaceError::invalid_slug(
                SlugKind::Project,
                slug,
                &cause,
            ))
        }
    };

    for organization in organizations {
        if let Some(project) = organization
            .projects
            .iter()
            .find(|project| project.id == decoded.id)
        {
            return ResolvedWorkspace {
                organization: Some(organization.clone()),
                project: Some(project.clone()),
                error: None,
                used_default_fallback: false,
            };
        }
    }
    ResolvedWorkspace::failed(WorkspaceError::not_found(SlugKind::Project, &decoded.id))
}

fn resolve_organization(organizations: &[Organization], slug: &str) -> ResolvedWorkspace {
    let decoded = match decode_slug(slug, SlugKind::Organization) {
        Ok(decoded) => decoded,
        Err(cause) => {
            return ResolvedWorkspace::failed(WorkspaceError::invalid_slug(
                SlugKind::Organization,
                slug,
                &cause,
            ))
        }
    };

    match organizations
        .iter()
        .find(|organization| organization.id == decoded.id)
    {
        Some(organization) => ResolvedWorkspace {
            organization: Some(organization.clone()),
            project: None,
            error: None,
            used_default_fallback: false,
        },
        None => {
            ResolvedWorkspace::failed(WorkspaceError::not_found(SlugKind::Organization, &decoded.id))
        }
    }
}

fn resolve_default(
    organizations: &[Organization],
    default_organization_id: Option<&str>,
) -> ResolvedWorkspace {
    if let Some(default_id) = default_organization_id {
        if let Some(organization) = organizations
            .iter()
            .find(|organization| organization.id == default_id)
        {
            return ResolvedWorkspace {
                organization: Some(organization.clone()),
                project: None,
                error: None,
                used_default_fallback: false,
            };
        }
    }
    // Stored default missing or unresolvable; first membership, if any.
    ResolvedWorkspace {
        used_default_fallback: default_organization_id.is_some() && !organizations.is_empty(),
        organization: organizations.first().cloned(),
        project: None,
        error: None,
    }
}

/// The path segment immediately following `marker`, ignoring query and
/// fragment parts. `/a/projects/x-p123/settings` with marker `projects`
/// yields `x-p123`.
fn path_segment_after<'a>(path: &'a str, marker: &str) -> Option<&'a str> {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let mut segments = path.split('/').filter(|segment| !segment.is_empty());
    while let Some(segment) = segments.next() {
        if segment == marker {
            return segments.next();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use gatewatch_api::types::{OrgRole, PlanTier};

    use super::*;
    use crate::error::WorkspaceErrorCode;

    fn project(id: &str, org_id: &str) -> Project {
        Project {
            id: id.to_string(),
            name: id.to_uppercase(),
            organization_id: org_id.to_string(),
        }
    }

    fn organization(id: &str, projects: Vec<Project>) -> Organization {
        Organization {
            id: id.to_string(),
            name: id.to_uppercase(),
            plan: PlanTier::Pro,
            role: OrgRole::Developer,
            projects,
        }
    }

    fn fixture() -> Vec<Organization> {
        vec![
            organization("o1aaaaaa", vec![project("p1aaaaaa", "o1aaaaaa")]),
            organization(
                "o2bbbbbb",
                vec![
                    project("p2bbbbbb", "o2bbbbbb"),
                    project("p3cccccc", "o2bbbbbb"),
                ],
            ),
            organization("o3dddddd", Vec::new()),
        ]
    }

    #[test]
    fn project_slug_sets_both_pointers() {
        let orgs = fixture();
        let resolved =
            resolve_workspace(&orgs, Some("o1aaaaaa"), "/projects/beta-p3cccccc/usage");
        assert_eq!(
            resolved.organization.as_ref().map(|o| o.id.as_str()),
            Some("o2bbbbbb")
        );
        assert_eq!(
            resolved.project.as_ref().map(|p| p.id.as_str()),
            Some("p3cccccc")
        );
        assert!(resolved.error.is_none());
    }

    #[test]
    fn unknown_project_is_not_found_with_empty_pointers() {
        let orgs = fixture();
        let resolved = resolve_workspace(&orgs, None, "/projects/ghost-p9zzzzzz");
        assert!(resolved.organization.is_none());
        assert!(resolved.project.is_none());
        assert_eq!(
            resolved.error.as_ref().map(WorkspaceError::code),
            Some(WorkspaceErrorCode::ProjectNotFound)
        );
    }

    #[test]
    fn malformed_project_slug_never_reaches_lookup_or_fallback() {
        let orgs = fixture();
        let resolved = resolve_workspace(&orgs, Some("o1aaaaaa"), "/projects/NOT-A-SLUG");
        assert_eq!(
            resolved.error.as_ref().map(WorkspaceError::code),
            Some(WorkspaceErrorCode::InvalidProjectSlug)
        );
        // Invalid slug must not silently fall through to the default org.
        assert!(resolved.organization.is_none());
    }

    #[test]
    fn org_slug_resolves_the_organization_alone() {
        let orgs = fixture();
        let resolved = resolve_workspace(&orgs, None, "/orgs/third-o3dddddd/members");
        assert_eq!(
            resolved.organization.as_ref().map(|o| o.id.as_str()),
            Some("o3dddddd")
        );
        assert!(resolved.project.is_none());

        let missing = resolve_workspace(&orgs, None, "/orgs/o9missing");
        assert_eq!(
            missing.error.as_ref().map(WorkspaceError::code),
            Some(WorkspaceErrorCode::OrgNotFound)
        );
    }

    #[test]
    fn default_org_priority_chain() {
        let orgs = fixture();

        // Stored default resolves.
        let stored = resolve_workspace(&orgs, Some("o2bbbbbb"), "/settings");
        assert_eq!(
            stored.organization.as_ref().map(|o| o.id.as_str()),
            Some("o2bbbbbb")
        );
        assert!(!stored.used_default_fallback);

        // Stored default does not resolve: first membership, flagged.
        let fallback = resolve_workspace(&orgs, Some("o9removed"), "/settings");
        assert_eq!(
            fallback.organization.as_ref().map(|o| o.id.as_str()),
            Some("o1aaaaaa")
        );
        assert!(fallback.used_default_fallback);

        // No stored default at all: first membership, not flagged.
        let first = resolve_workspace(&orgs, None, "/");
        assert_eq!(
            first.organization.as_ref().map(|o| o.id.as_str()),
            Some("o1aaaaaa")
        );
        assert!(!first.used_default_fallback);

        // Zero memberships is a valid state, never an error.
        let empty = resolve_workspace(&[], Some("o1aaaaaa"), "/");
        assert!(empty.organization.is_none());
        assert!(empty.error.is_none());
    }

    #[test]
    fn resolution_is_pure_and_reentrant() {
        let orgs = fixture();
        let first = resolve_workspace(&orgs, Some("o1aaaaaa"), "/projects/beta-p2bbbbbb");
        let second = resolve_workspace(&orgs, Some("o1aaaaaa"), "/projects/beta-p2bbbbbb");
        assert_eq!(first, second);
    }

    #[test]
    fn query_and_fragment_are_ignored() {
        let orgs = fixture();
        let resolved = resolve_workspace(&orgs, None, "/projects/p2bbbbbb?tab=keys#top");
        assert_eq!(
            resolved.project.as_ref().map(|p| p.id.as_str()),
            Some("p2bbbbbb")
        );
    }
}

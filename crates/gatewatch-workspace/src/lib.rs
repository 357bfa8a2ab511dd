#![cfg_attr(test, allow(clippy::expect_used, clippy::panic))]

//! Workspace resolution for the Gatewatch dashboard.
//!
//! Derives "which organization and project am I looking at" from the
//! authenticated user's memberships plus the current URL, with a typed
//! error taxonomy instead of silent fallbacks:
//!
//! - [`slug`] — composite `<kebab-name>-<id>` URL slugs.
//! - [`error`] — the classified [`WorkspaceError`] every failure maps to.
//! - [`resolve`] — pure `(organizations, path) -> pointers` resolution.
//! - [`service`] — cached workspace data, backoff fetch, org/project
//!   switching.
//! - [`guard`] — auth/role gating as pure functions over snapshots.

pub mod error;
pub mod guard;
pub mod resolve;
pub mod service;
pub mod slug;

pub use error::{WorkspaceError, WorkspaceErrorCode};
pub use guard::{evaluate_auth_guard, role_satisfied, GuardOutcome, GuardRequirements};
pub use resolve::{resolve_workspace, ResolvedWorkspace};
pub use service::{
    route_after_org_switch, LoadingFlags, OrgSwitch, ProjectSwitch, TokenSource, WorkspacePhase,
    WorkspaceService,
};
pub use slug::{decode_slug, encode_slug, DecodedSlug, SlugError, SlugKind, MIN_ID_LEN};

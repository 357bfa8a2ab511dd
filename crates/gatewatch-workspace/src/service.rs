//! Cached workspace data and the org/project switch operations.
//!
//! The service owns one [`WorkspaceSnapshot`] plus an interaction phase;
//! resolution over that snapshot stays pure ([`crate::resolve`]). Every
//! failure leaving this module is a classified [`WorkspaceError`].

use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use gatewatch_api::client::AuthApi;
use gatewatch_api::error::ApiError;
use gatewatch_api::types::{Organization, Project, WorkspaceSnapshot};
use gatewatch_session::SessionManager;
use tracing::{debug, warn};

use crate::error::WorkspaceError;
use crate::resolve::{resolve_workspace, ResolvedWorkspace};
use crate::slug::{decode_slug, encode_slug, SlugKind};

const FETCH_ATTEMPTS: u32 = 3;
const FETCH_BACKOFF_BASE_MS: u64 = 100;

/// Where a fresh access token comes from. The session crate's manager is
/// the production source; tests supply a fixed token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Option<String>;
}

#[async_trait]
impl TokenSource for SessionManager {
    async fn access_token(&self) -> Option<String> {
        self.get_valid_access_token().await
    }
}

/// Interaction phase of the workspace service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspacePhase {
    /// No data yet; first load in flight or not started.
    Initializing,
    Ready,
    /// Background refetch; the stale snapshot keeps being served.
    Refreshing,
    SwitchingOrg,
    SwitchingProject,
}

/// Flattened phase view for surfaces that render loading affordances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadingFlags {
    pub is_initializing: bool,
    pub is_refreshing: bool,
    pub is_switching_org: bool,
    pub is_switching_project: bool,
}

impl LoadingFlags {
    #[must_use]
    pub fn can_interact(&self) -> bool {
        !(self.is_initializing
            || self.is_switching_org
            || self.is_switching_project)
    }
}

/// Outcome of [`WorkspaceService::switch_organization`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgSwitch {
    pub organization_id: String,
    /// Path to land on after the switch; an org with zero projects routes
    /// to the organization root, never a stale project path.
    pub route: String,
}

/// Outcome of [`WorkspaceService::switch_project`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSwitch {
    pub project_id: String,
    pub route: String,
}

struct WorkspaceState {
    snapshot: Option<WorkspaceSnapshot>,
    phase: WorkspacePhase,
    last_error: Option<WorkspaceError>,
}

struct ServiceInner {
    api: Arc<dyn AuthApi>,
    tokens: Arc<dyn TokenSource>,
    state: RwLock<WorkspaceState>,
}

/// Owns the cached "user + organizations + projects" snapshot.
///
/// Cheap to clone; clones share the same cache and phase.
#[derive(Clone)]
pub struct WorkspaceService {
    inner: Arc<ServiceInner>,
}

impl WorkspaceService {
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                api,
                tokens,
                state: RwLock::new(WorkspaceState {
                    snapshot: None,
                    phase: WorkspacePhase::Initializing,
                    last_error: None,
                }),
            }),
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, WorkspaceState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[must_use]
    pub fn phase(&self) -> WorkspacePhase {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .phase
    }

    #[must_use]
    pub fn flags(&self) -> LoadingFlags {
        let phase = self.phase();
        LoadingFlags {
            is_initializing: phase == WorkspacePhase::Initializing,
            is_refreshing: phase == WorkspacePhase::Refreshing,
            is_switching_org: phase == WorkspacePhase::SwitchingOrg,
            is_switching_project: phase == WorkspacePhase::SwitchingProject,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<WorkspaceSnapshot> {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .snapshot
            .clone()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<WorkspaceError> {
        self.inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last_error
            .clone()
    }

    /// Resolve the current org/project pointers for `path` against the
    /// cached snapshot. Pure over the snapshot; no data means no pointers.
    #[must_use]
    pub fn resolve(&self, path: &str) -> ResolvedWorkspace {
        let state = self
            .inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match state.snapshot.as_ref() {
            Some(snapshot) => resolve_workspace(
                &snapshot.organizations,
                snapshot.user.default_organization_id.as_deref(),
                path,
            ),
            None => resolve_workspace(&[], None, path),
        }
    }

    /// Initial fetch with exponential backoff: up to 3 attempts, 100 ms
    /// base delay doubling, transport errors only. Non-network failures
    /// surface immediately.
    ///
    /// A failed first load still settles on `Ready` (so retry affordances
    /// are interactive) with no snapshot and `last_error()` set: a caller
    /// seeing `Ready` without data must branch on `last_error()` rather
    /// than `is_initializing`.
    pub async fn load(&self) -> Result<WorkspaceSnapshot, WorkspaceError> {
        match self.fetch_with_backoff().await {
            Ok(snapshot) => {
                let mut state = self.write_state();
                state.snapshot = Some(snapshot.clone());
                state.phase = WorkspacePhase::Ready;
                state.last_error = None;
                Ok(snapshot)
            }
            Err(error) => {
                let mut state = self.write_state();
                state.phase = WorkspacePhase::Ready;
                state.last_error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Background refetch for window-focus / reconnect hooks. Failures
    /// keep serving the stale snapshot.
    pub async fn revalidate(&self) {
        {
            let mut state = self.write_state();
            if state.snapshot.is_none() {
                // Nothing cached yet; this is a first load, not a refresh.
                drop(state);
                let _ = self.load().await;
                return;
            }
            state.phase = WorkspacePhase::Refreshing;
        }
        match self.fetch_once().await {
            Ok(snapshot) => {
                let mut state = self.write_state();
                state.snapshot = Some(snapshot);
                state.phase = WorkspacePhase::Ready;
                state.last_error = None;
            }
            Err(error) => {
                warn!(code = error.code().as_str(), "revalidation failed; keeping stale snapshot");
                let mut state = self.write_state();
                state.phase = WorkspacePhase::Ready;
            }
        }
    }

    /// Switch the active organization: decode the slug, validate the
    /// membership, persist it as the server-side default, refetch, and
    /// return the landing route.
    pub async fn switch_organization(&self, slug: &str) -> Result<OrgSwitch, WorkspaceError> {
        let decoded = decode_slug(slug, SlugKind::Organization)
            .map_err(|cause| WorkspaceError::invalid_slug(SlugKind::Organization, slug, &cause))?;

        let target = self
            .find_organization(&decoded.id)
            .ok_or_else(|| WorkspaceError::not_found(SlugKind::Organization, &decoded.id))?;

        {
            let mut state = self.write_state();
            state.phase = WorkspacePhase::SwitchingOrg;
        }
        let result = self.perform_org_switch(&target).await;
        {
            let mut state = self.write_state();
            state.phase = WorkspacePhase::Ready;
            if let Err(error) = &result {
                state.last_error = Some(error.clone());
            }
        }
        result
    }

    async fn perform_org_switch(
        &self,
        target: &Organization,
    ) -> Result<OrgSwitch, WorkspaceError> {
        let token = self
            .inner
            .tokens
            .access_token()
            .await
            .ok_or_else(|| WorkspaceError::from_api(ApiError::NotAuthenticated))?;
        self.inner
            .api
            .set_default_organization(&token, &target.id)
            .await
            .map_err(WorkspaceError::from_api)?;

        // Refetch so the snapshot reflects the new default; the membership
        // we already validated is the routing source of truth either way.
        match self.fetch_with_backoff().await {
            Ok(snapshot) => {
                let mut state = self.write_state();
                state.snapshot = Some(snapshot);
            }
            Err(error) => {
                warn!(code = error.code().as_str(), "post-switch refetch failed; keeping stale snapshot");
            }
        }

        Ok(OrgSwitch {
            organization_id: target.id.clone(),
            route: route_after_org_switch(target),
        })
    }

    /// Switch the active project: decode, validate, return the new route.
    /// Purely local; project selection has no server-side side effect.
    pub async fn switch_project(&self, slug: &str) -> Result<ProjectSwitch, WorkspaceError> {
        let decoded = decode_slug(slug, SlugKind::Project)
            .map_err(|cause| WorkspaceError::invalid_slug(SlugKind::Project, slug, &cause))?;

        {
            let mut state = self.write_state();
            state.phase = WorkspacePhase::SwitchingProject;
        }
        let result = self
            .find_project(&decoded.id)
            .map(|project| ProjectSwitch {
                route: project_route(&project),
                project_id: project.id,
            })
            .ok_or_else(|| WorkspaceError::not_found(SlugKind::Project, &decoded.id));
        {
            let mut state = self.write_state();
            state.phase = WorkspacePhase::Ready;
            if let Err(error) = &result {
                state.last_error = Some(error.clone());
            }
        }
        result
    }

    fn find_organization(&self, id: &str) -> Option<Organization> {
        let state = self
            .inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state
            .snapshot
            .as_ref()?
            .organizations
            .iter()
            .find(|organization| organization.id == id)
            .cloned()
    }

    fn find_project(&self, id: &str) -> Option<Project> {
        let state = self
            .inner
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state
            .snapshot
            .as_ref()?
            .organizations
            .iter()
            .flat_map(|organization| organization.projects.iter())
            .find(|project| project.id == id)
            .cloned()
    }

    async fn fetch_once(&self) -> Result<WorkspaceSnapshot, WorkspaceError> {
        let token = self
            .inner
            .tokens
            .access_token()
            .await
            .ok_or_else(|| WorkspaceError::from_api(ApiError::NotAuthenticated))?;
        self.inner
            .api
            .fetch_workspace(&token)
            .await
            .map_err(WorkspaceError::from_api)
    }

    async fn fetch_with_backoff(&self) -> Result<WorkspaceSnapshot, WorkspaceError> {
        let mut delay = Duration::from_millis(FETCH_BACKOFF_BASE_MS);
        let mut last_error = None;
        for attempt in 1..=FETCH_ATTEMPTS {
            match self.fetch_once().await {
                Ok(snapshot) => return Ok(snapshot),
                Err(error) => {
                    let retryable = error.code() == crate::error::WorkspaceErrorCode::NetworkError
                        && attempt < FETCH_ATTEMPTS;
                    if !retryable {
                        return Err(error);
                    }
                    debug!(attempt, "workspace fetch failed on a transport error; retrying");
                    last_error = Some(error);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
        Err(last_error.unwrap_or_else(|| WorkspaceError::unknown("fetch retries exhausted")))
    }
}

/// Landing path after an organization switch.
#[must_use]
pub fn route_after_org_switch(organization: &Organization) -> String {
    match organization.projects.first() {
        Some(project) => project_route(project),
        None => format!(
            "/orgs/{}",
            encode_slug(&organization.name, &organization.id)
        ),
    }
}

fn project_route(project: &Project) -> String {
    format!("/projects/{}", encode_slug(&project.name, &project.id))
}

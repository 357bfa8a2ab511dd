#![cfg_attr(test, allow(clippy::expect_used, clippy::panic))]

//! Typed HTTP boundary for the Gatewatch authentication and workspace APIs.
//!
//! The rest of the client never talks to `reqwest` directly: it depends on
//! the [`AuthApi`] trait and receives discriminated [`ApiError`] values
//! instead of sniffing opaque exception shapes.

pub mod client;
pub mod error;
pub mod types;

pub use client::{AuthApi, GatewayAuthClient, GatewayClientConfig};
pub use error::ApiError;
pub use types::{
    AuthResponse, AuthTokens, ChangePasswordRequest, LoginRequest, OrgRole, Organization,
    PlanTier, Project, SignupRequest, UpdateProfileRequest, User, WorkspaceSnapshot,
};

//! Reqwest-backed implementation of the gateway's auth/workspace API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::ApiError;
use crate::types::{
    AuthResponse, AuthTokens, ChangePasswordRequest, LoginRequest, SignupRequest,
    UpdateProfileRequest, User, WorkspaceSnapshot,
};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REQUEST_ATTEMPTS: usize = 2;

/// Everything the session and workspace layers need from the gateway.
///
/// Mock implementations back the unit tests; [`GatewayAuthClient`] is the
/// production transport.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ApiError>;
    async fn signup(&self, request: SignupRequest) -> Result<AuthResponse, ApiError>;
    async fn logout(&self, access_token: &str) -> Result<(), ApiError>;
    async fn current_user(&self, access_token: &str) -> Result<User, ApiError>;
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<AuthTokens, ApiError>;
    async fn update_profile(
        &self,
        access_token: &str,
        request: UpdateProfileRequest,
    ) -> Result<User, ApiError>;
    async fn change_password(
        &self,
        access_token: &str,
        request: ChangePasswordRequest,
    ) -> Result<(), ApiError>;
    async fn set_default_organization(
        &self,
        access_token: &str,
        organization_id: &str,
    ) -> Result<(), ApiError>;
    /// Current user + organizations + nested projects in one response.
    async fn fetch_workspace(&self, access_token: &str) -> Result<WorkspaceSnapshot, ApiError>;
}

#[derive(Debug, Clone)]
pub struct GatewayClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub request_attempts: usize,
}

impl GatewayClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_attempts: DEFAULT_REQUEST_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayAuthClient {
    base_url: String,
    timeout: Duration,
    request_attempts: usize,
    http: reqwest::Client,
}

#[derive(serde::Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(serde::Serialize)]
struct SetDefaultOrganizationRequest<'a> {
    organization_id: &'a str,
}

impl GatewayAuthClient {
    pub fn new(config: GatewayClientConfig) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(config.timeout_ms.max(250)),
            request_attempts: config.request_attempts.max(1),
            http: reqwest::Client::new(),
        })
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    async fn get_json<T>(&self, path: &str, bearer: Option<&str>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(path).ok_or(ApiError::InvalidPath)?;
        let mut last_error: Option<String> = None;

        for attempt in 0..self.request_attempts {
            let mut request = self
                .http
                .get(url.as_str())
                .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
                .timeout(self.timeout);
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) => return decode_json_response(response).await,
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt + 1 >= self.request_attempts {
                        break;
                    }
                }
            }
        }

        Err(ApiError::Request {
            message: last_error.unwrap_or_else(|| "unknown".to_string()),
        })
    }

    async fn post_json<Req, Res>(
        &self,
        path: &str,
        bearer: Option<&str>,
        payload: &Req,
    ) -> Result<Res, ApiError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let url = self.endpoint(path).ok_or(ApiError::InvalidPath)?;
        let mut last_error: Option<String> = None;

        for attempt in 0..self.request_attempts {
            let mut request = self
                .http
                .post(url.as_str())
                .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
                .timeout(self.timeout)
                .json(payload);
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) => return decode_json_response(response).await,
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt + 1 >= self.request_attempts {
                        break;
                    }
                }
            }
        }

        Err(ApiError::Request {
            message: last_error.unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// POST where the success body is empty or irrelevant.
    async fn post_unit<Req>(
        &self,
        path: &str,
        bearer: Option<&str>,
        payload: &Req,
    ) -> Result<(), ApiError>
    where
        Req: Serialize + ?Sized,
    {
        let url = self.endpoint(path).ok_or(ApiError::InvalidPath)?;
        let mut request = self
            .http
            .post(url.as_str())
            .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
            .timeout(self.timeout)
            .json(payload);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|error| ApiError::Request {
            message: error.to_string(),
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let bytes = response.bytes().await.map_err(|error| ApiError::Read {
            message: error.to_string(),
        })?;
        Err(ApiError::from_response(status, &bytes))
    }
}

#[async_trait]
impl AuthApi for GatewayAuthClient {
    async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ApiError> {
        self.post_json("/v1/auth/login", None, &request).await
    }

    async fn signup(&self, request: SignupRequest) -> Result<AuthResponse, ApiError> {
        self.post_json("/v1/auth/signup", None, &request).await
    }

    async fn logout(&self, access_token: &str) -> Result<(), ApiError> {
        self.post_unit("/v1/auth/logout", Some(access_token), &serde_json::json!({}))
            .await
    }

    async fn current_user(&self, access_token: &str) -> Result<User, ApiError> {
        self.get_json("/v1/auth/me", Some(access_token)).await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<AuthTokens, ApiError> {
        self.post_json("/v1/auth/refresh", None, &RefreshRequest { refresh_token })
            .await
    }

    async fn update_profile(
        &self,
        access_token: &str,
        request: UpdateProfileRequest,
    ) -> Result<User, ApiError> {
        self.post_json("/v1/auth/profile", Some(access_token), &request)
            .await
    }

    async fn change_password(
        &self,
        access_token: &str,
        request: ChangePasswordRequest,
    ) -> Result<(), ApiError> {
        self.post_unit("/v1/auth/password", Some(access_token), &request)
            .await
    }

    async fn set_default_organization(
        &self,
        access_token: &str,
        organization_id: &str,
    ) -> Result<(), ApiError> {
        self.post_unit(
            "/v1/auth/default-organization",
            Some(access_token),
            &SetDefaultOrganizationRequest { organization_id },
        )
        .await
    }

    async fn fetch_workspace(&self, access_token: &str) -> Result<WorkspaceSnapshot, ApiError> {
        self.get_json("/v1/workspace", Some(access_token)).await
    }
}

fn normalize_base_url(base_url: &str) -> Result<String, ApiError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BaseUrlMissing);
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, ApiError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let bytes = response.bytes().await.map_err(|error| ApiError::Read {
        message: error.to_string(),
    })?;

    if !status.is_success() {
        return Err(ApiError::from_response(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| ApiError::Decode {
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_builder_normalizes_paths() {
        let client =
            GatewayAuthClient::new(GatewayClientConfig::new("https://gateway.example.com/"))
                .expect("gateway client");

        assert_eq!(
            client.endpoint("/v1/auth/login"),
            Some("https://gateway.example.com/v1/auth/login".to_string())
        );
        assert_eq!(
            client.endpoint("v1/auth/login"),
            Some("https://gateway.example.com/v1/auth/login".to_string())
        );
        assert_eq!(client.endpoint(""), None);
    }

    #[test]
    fn base_url_missing_is_rejected() {
        let result = GatewayAuthClient::new(GatewayClientConfig::new("   "));
        assert!(matches!(result, Err(ApiError::BaseUrlMissing)));
    }

    #[test]
    fn config_floors_timeout_and_attempts() {
        let client = GatewayAuthClient::new(GatewayClientConfig {
            base_url: "https://gateway.example.com".to_string(),
            timeout_ms: 1,
            request_attempts: 0,
        })
        .expect("gateway client");
        assert_eq!(client.timeout, Duration::from_millis(250));
        assert_eq!(client.request_attempts, 1);
    }
}

use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_core::{
    auth::{AUTH_COOKIE_NAME, ClientMetadata, LoginResponse},
    user::User,
};

use crate::{
    auth::role::CurrentUser,
    errors::{AppError, AppResult},
    infra::app_state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

impl From<LoginResponse> for TokenResponse {
    fn from(response: LoginResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: "Bearer",
            expires_at: response.expires_at,
            user: response.user,
        }
    }
}

/// User agent and peer address of the caller, recorded on issued refresh
/// tokens.
#[derive(Debug, Clone, Default)]
pub struct ClientContext(pub ClientMetadata);

impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let client_info = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .or_else(|| forwarded_for(&parts.headers));

        Ok(Self(ClientMetadata { client_info, ip }))
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .map(str::to_string)
}

fn auth_cookie(token: &str, max_age_secs: u64) -> AppResult<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{AUTH_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}"
    ))
    .map_err(|_| AppError::internal("failed to build auth cookie"))
}

fn with_auth_cookie(state: &AppState, response: LoginResponse) -> AppResult<Response> {
    let cookie = auth_cookie(
        &response.access_token,
        state.config.access_token_ttl.as_secs(),
    )?;
    let mut http = Json(TokenResponse::from(response)).into_response();
    http.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(http)
}

pub async fn login(
    State(state): State<AppState>,
    ClientContext(client): ClientContext,
    Json(request): Json<LoginRequest>,
) -> AppResult<Response> {
    if request.username.trim().is_empty() || request.password.is_empty() {
        return Err(AppError::bad_request("username and password are required"));
    }

    let response = state
        .sessions
        .login_with_client(&request.username, &request.password, client)
        .await?;

    with_auth_cookie(&state, response)
}

pub async fn refresh(
    State(state): State<AppState>,
    ClientContext(client): ClientContext,
    Json(request): Json<RefreshRequest>,
) -> AppResult<Response> {
    let response = state
        .sessions
        .refresh_token_with_client(&request.refresh_token, client)
        .await?;

    with_auth_cookie(&state, response)
}

/// Revokes the refresh token and clears the auth cookie. Succeeds for tokens
/// that are unknown or already revoked.
pub async fn logout(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> AppResult<Response> {
    state.sessions.logout(&request.refresh_token).await?;

    let mut response = StatusCode::NO_CONTENT.into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, auth_cookie("", 0)?);
    Ok(response)
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

#[derive(Debug, Serialize)]
pub struct AdminOverview {
    pub user: User,
    pub active_refresh_tokens: Option<usize>,
}

/// Admin-only view of the caller's own session count. The count is absent
/// when refresh tokens are stateless.
pub async fn admin(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<AdminOverview>> {
    let active_refresh_tokens = match &state.refresh_tokens {
        Some(store) => Some(store.count(&user.id).await?),
        None => None,
    };

    Ok(Json(AdminOverview {
        user,
        active_refresh_tokens,
    }))
}

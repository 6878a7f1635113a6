use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use tessera_core::auth::{AUTH_COOKIE_NAME, AuthInfo};
use tracing::debug;

use crate::infra::app_state::AppState;

/// Attach an [`AuthInfo`] to every request.
///
/// A missing or invalid credential never rejects the request here; the
/// request simply continues unauthenticated and the route's own checks
/// decide.
pub async fn auth_context_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let info = match extract_token(request.headers()) {
        Some(token) => match state.sessions.validate_token(&token).await {
            Ok(user) => AuthInfo::authenticated(user),
            Err(err) => {
                debug!(error = %err, "credential rejected; continuing unauthenticated");
                AuthInfo::anonymous()
            }
        },
        None => AuthInfo::anonymous(),
    };

    request.extensions_mut().insert(info);
    next.run(request).await
}

/// The `Authorization: Bearer` header wins over the auth cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_token(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;

    let mut parts = value.split(' ');
    let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };

    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_COOKIE_NAME)
        .map(|(_, value)| value.to_string())
}

use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::future::Future;
use std::pin::Pin;
use tessera_core::{auth::AuthInfo, user::User};
use tracing::debug;

use crate::errors::AppError;

/// Route layer admitting only users whose role name equals `role` exactly.
/// Must run after [`auth_context_middleware`](super::middleware::auth_context_middleware).
///
/// Anonymous requests get 401, authenticated users with another role 403.
pub fn require_role(
    role: &'static str,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>>
+ Clone
+ Send
+ Sync
+ 'static {
    move |request: Request, next: Next| Box::pin(check_role_async(request, next, role))
}

async fn check_role_async(request: Request, next: Next, role: &'static str) -> Response {
    let Some(info) = request.extensions().get::<AuthInfo>() else {
        return AppError::unauthorized("authentication required").into_response();
    };

    let Some(user) = info.user() else {
        return AppError::unauthorized("authentication required").into_response();
    };

    if !info.has_role(role) {
        debug!(
            user_id = %user.id,
            required_role = role,
            user_role = %user.role,
            "role check failed"
        );
        return AppError::forbidden(format!("role '{role}' required")).into_response();
    }

    next.run(request).await
}

/// Extractor for handlers that need a signed-in user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthInfo>()
            .and_then(AuthInfo::user)
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::unauthorized("authentication required"))
    }
}

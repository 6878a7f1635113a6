use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    auth::{handlers, middleware::auth_context_middleware, role::require_role},
    infra::app_state::AppState,
};

/// Build the full application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/me", get(handlers::me))
        .merge(create_admin_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn create_admin_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/admin", get(handlers::admin))
        .route_layer(middleware::from_fn(require_role("Admin")))
}

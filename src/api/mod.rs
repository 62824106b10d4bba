//! HTTP surface: route table, endpoint policies and the layer stack.

pub mod routes;

use crate::auth::{
    api as auth_api, auth_middleware, authorization_gate, AccessPolicy, AuthState, Authenticator,
    PolicyTable, Role,
};
use crate::middleware::request_logging;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Endpoint policies for the routes built by [`router`].
///
/// Anything not listed requires an authenticated principal.
pub fn default_policies() -> PolicyTable {
    PolicyTable::new(AccessPolicy::AuthenticatedOnly)
        .rule("/health", AccessPolicy::Public)
        .rule("/api/auth/me", AccessPolicy::AuthenticatedOnly)
        .rule("/api/auth/*", AccessPolicy::Public)
        .rule("/api/public*", AccessPolicy::Public)
        .rule("/api/protected", AccessPolicy::AuthenticatedOnly)
        .rule("/api/admin", AccessPolicy::RoleRequired(Role::Admin))
}

/// Build the application router.
///
/// Layer order, outermost first: CORS, authentication, request logging,
/// authorization gate, handler.
pub fn router(state: AuthState, authenticator: Authenticator, policies: PolicyTable) -> Router {
    let auth_routes = Router::new()
        .route("/auth/register", post(auth_api::register))
        .route("/auth/login", post(auth_api::login))
        .route("/auth/logout", post(auth_api::logout))
        .route("/auth/me", get(auth_api::me))
        .with_state(state);

    let demo_routes = Router::new()
        .route("/public", get(routes::public))
        .route("/protected", get(routes::protected))
        .route("/admin", get(routes::admin));

    Router::new()
        .route("/health", get(routes::health_check))
        .nest("/api", auth_routes.merge(demo_routes))
        .layer(middleware::from_fn_with_state(
            Arc::new(policies),
            authorization_gate,
        ))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn_with_state(authenticator, auth_middleware))
        .layer(CorsLayer::permissive())
}

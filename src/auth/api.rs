//! Authentication API Endpoints
//! Mission: Register, login, logout and introspect the current principal

use crate::auth::{
    jwt::{JwtHandler, TokenError},
    middleware::CurrentPrincipal,
    models::{CredentialsRequest, LoginResponse, Principal, UserResponse},
    revocation::RevocationStore,
    user_store::{CredentialVerifier, RegisterError, UserStore},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Minimum accepted password length at registration
pub const MIN_PASSWORD_LEN: usize = 6;

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<UserStore>,
    pub jwt_handler: Arc<JwtHandler>,
    pub revocations: Arc<RevocationStore>,
}

impl AuthState {
    pub fn new(
        user_store: Arc<UserStore>,
        jwt_handler: Arc<JwtHandler>,
        revocations: Arc<RevocationStore>,
    ) -> Self {
        Self {
            user_store,
            jwt_handler,
            revocations,
        }
    }
}

/// Register endpoint - POST /api/auth/register
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<UserResponse>, AuthApiError> {
    let username = payload.username.trim();
    if username.is_empty() || username.contains(char::is_whitespace) {
        return Err(AuthApiError::InvalidRequest(
            "Username must be non-empty and contain no spaces",
        ));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AuthApiError::InvalidRequest(
            "Password must be at least 6 characters",
        ));
    }

    let store = state.user_store.clone();
    let username_owned = username.to_string();
    let password = payload.password;
    let user = tokio::task::spawn_blocking(move || store.register(&username_owned, &password))
        .await
        .map_err(|e| {
            error!("Registration task failed: {}", e);
            AuthApiError::Internal
        })?
        .map_err(|e| match e {
            RegisterError::UsernameTaken(name) => {
                warn!("Registration rejected, username taken: {}", name);
                AuthApiError::UsernameTaken
            }
            RegisterError::Storage(e) => {
                error!("Failed to register {}: {:#}", username, e);
                AuthApiError::Internal
            }
        })?;

    Ok(Json(UserResponse::from_user(&user)))
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<LoginResponse>, AuthApiError> {
    info!("🔐 Login attempt: {}", payload.username);

    let valid = state
        .user_store
        .verify_password(&payload.username, &payload.password)
        .await
        .map_err(|e| {
            error!("Credential check failed for {}: {:#}", payload.username, e);
            AuthApiError::Internal
        })?;

    if !valid {
        warn!("❌ Failed login attempt: {}", payload.username);
        return Err(AuthApiError::InvalidCredentials);
    }

    let issued = state
        .jwt_handler
        .issue(&payload.username)
        .map_err(|e| {
            error!("Failed to issue token for {}: {:#}", payload.username, e);
            AuthApiError::Internal
        })?;

    info!("✅ Login successful: {}", payload.username);

    Ok(Json(LoginResponse {
        username: payload.username,
        token: issued.token,
        token_type: "Bearer".to_string(),
        expires_in: (issued.expires_at - issued.issued_at).num_seconds(),
    }))
}

/// Logout endpoint - POST /api/auth/logout
///
/// Revokes the presented token until its natural expiry. Logging out twice
/// with the same token succeeds both times.
pub async fn logout(
    State(state): State<AuthState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<&'static str, AuthApiError> {
    let TypedHeader(authorization) = bearer.ok_or(AuthApiError::MissingBearerToken)?;
    let token = authorization.token();

    let decoded = state.jwt_handler.verify(token).map_err(|e| {
        match e {
            TokenError::Malformed => warn!("Logout with malformed token"),
            TokenError::Expired => info!("Logout with already expired token"),
        }
        AuthApiError::InvalidToken
    })?;

    if state.revocations.revoke(token, decoded.expires_at) {
        info!(
            "👋 Token revoked for {} (until {})",
            decoded.username,
            decoded.expires_at.to_rfc3339()
        );
    }

    Ok("Token revoked successfully")
}

/// Get current principal - GET /api/auth/me
pub async fn me(CurrentPrincipal(principal): CurrentPrincipal) -> Json<Principal> {
    Json(principal)
}

/// Auth API errors
#[derive(Debug)]
pub enum AuthApiError {
    InvalidCredentials,
    UsernameTaken,
    MissingBearerToken,
    InvalidToken,
    InvalidRequest(&'static str),
    Internal,
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthApiError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid username or password")
            }
            AuthApiError::UsernameTaken => (StatusCode::CONFLICT, "Username is already taken"),
            AuthApiError::MissingBearerToken => {
                (StatusCode::BAD_REQUEST, "No Bearer token found in request")
            }
            AuthApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthApiError::InvalidRequest(message) => (StatusCode::BAD_REQUEST, message),
            AuthApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        (status, message).into_response()
    }
}

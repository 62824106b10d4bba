//! Authentication Middleware
//! Mission: Turn a bearer token into a request principal, or leave it absent

use crate::auth::{
    gate::AccessDenied,
    jwt::{JwtHandler, TokenError},
    models::Principal,
    revocation::RevocationStore,
    user_store::UserLookup,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Why a request ended up unauthenticated.
///
/// Callers only ever see a generic 401; the variant is for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("no bearer token")]
    MissingToken,
    #[error("malformed token")]
    MalformedToken,
    #[error("expired token")]
    ExpiredToken,
    #[error("revoked token")]
    RevokedToken,
    #[error("principal {0} not found")]
    PrincipalNotFound(String),
    #[error("user lookup failed")]
    LookupFailed,
    #[error("user lookup timed out")]
    LookupTimedOut,
}

impl From<TokenError> for AuthFailure {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => AuthFailure::MalformedToken,
            TokenError::Expired => AuthFailure::ExpiredToken,
        }
    }
}

/// Everything the middleware needs to authenticate one request
#[derive(Clone)]
pub struct Authenticator {
    jwt: Arc<JwtHandler>,
    revocations: Arc<RevocationStore>,
    users: Arc<dyn UserLookup>,
    lookup_timeout: Duration,
}

impl Authenticator {
    pub fn new(
        jwt: Arc<JwtHandler>,
        revocations: Arc<RevocationStore>,
        users: Arc<dyn UserLookup>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            jwt,
            revocations,
            users,
            lookup_timeout,
        }
    }

    /// Authenticate from request headers
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthFailure> {
        let token = bearer_token(headers).ok_or(AuthFailure::MissingToken)?;
        self.authenticate_token(&token).await
    }

    /// Decode, then revocation, then expiry, then principal lookup.
    ///
    /// Revocation is consulted before expiry so a logged-out token is refused
    /// for the whole of its remaining lifetime.
    pub async fn authenticate_token(&self, token: &str) -> Result<Principal, AuthFailure> {
        let decoded = self.jwt.decode(token)?;

        if self.revocations.is_revoked(token) {
            return Err(AuthFailure::RevokedToken);
        }

        if !self.jwt.is_live_at(&decoded, Utc::now()) {
            return Err(AuthFailure::ExpiredToken);
        }

        let lookup = self.users.find_principal(&decoded.username);
        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(Some(principal))) => Ok(principal),
            Ok(Ok(None)) => Err(AuthFailure::PrincipalNotFound(decoded.username)),
            Ok(Err(e)) => {
                warn!("User lookup for {} failed: {:#}", decoded.username, e);
                Err(AuthFailure::LookupFailed)
            }
            Err(_) => {
                warn!(
                    "User lookup for {} timed out after {:?}",
                    decoded.username, self.lookup_timeout
                );
                Err(AuthFailure::LookupTimedOut)
            }
        }
    }
}

/// Auth middleware that attaches a [`Principal`] when the bearer token checks out.
///
/// It never rejects on its own; the authorization gate decides what an
/// anonymous request may reach.
pub async fn auth_middleware(
    State(authenticator): State<Authenticator>,
    mut req: Request,
    next: Next,
) -> Response {
    // A principal can only come from this middleware.
    req.extensions_mut().remove::<Principal>();

    match authenticator.authenticate(req.headers()).await {
        Ok(principal) => {
            debug!("Authenticated {} for {}", principal.username(), req.uri().path());
            req.extensions_mut().insert(principal);
        }
        Err(AuthFailure::MissingToken) => {}
        Err(failure) => {
            debug!(path = %req.uri().path(), reason = %failure, "Request left unauthenticated");
        }
    }

    next.run(req).await
}

/// Extract the token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .filter(|token| !token.is_empty())
}

/// Extract principal from request (use after auth middleware)
pub fn extract_principal(req: &Request) -> Option<&Principal> {
    req.extensions().get::<Principal>()
}

/// Handler extractor for the authenticated principal; 401 when absent
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = AccessDenied;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or(AccessDenied::Unauthorized)
    }
}

//! Authorization Gate
//! Mission: Map each endpoint to an access policy and enforce it per request

use crate::auth::models::{Principal, Role};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Who may reach an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPolicy {
    /// No check at all
    Public,
    /// Any authenticated principal
    AuthenticatedOnly,
    /// Authenticated and holding the role
    RoleRequired(Role),
}

/// Gate outcome for a refused request
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    /// No principal where one is required
    #[error("authentication required")]
    Unauthorized,
    /// Principal present, role missing
    #[error("insufficient permissions")]
    Forbidden,
}

impl IntoResponse for AccessDenied {
    fn into_response(self) -> Response {
        match self {
            AccessDenied::Unauthorized => {
                let mut response =
                    (StatusCode::UNAUTHORIZED, "Authentication required").into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            AccessDenied::Forbidden => {
                (StatusCode::FORBIDDEN, "Insufficient permissions").into_response()
            }
        }
    }
}

/// Evaluate `policy` against the request's principal, if any
pub fn authorize(policy: &AccessPolicy, principal: Option<&Principal>) -> Result<(), AccessDenied> {
    match policy {
        AccessPolicy::Public => Ok(()),
        AccessPolicy::AuthenticatedOnly => principal.map(|_| ()).ok_or(AccessDenied::Unauthorized),
        AccessPolicy::RoleRequired(role) => {
            let principal = principal.ok_or(AccessDenied::Unauthorized)?;
            if principal.has_role(*role) {
                Ok(())
            } else {
                Err(AccessDenied::Forbidden)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathPattern {
    Exact(String),
    Prefix(String),
}

impl PathPattern {
    /// `"/api/public*"` matches by prefix, anything else must match exactly
    fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => PathPattern::Prefix(prefix.to_string()),
            None => PathPattern::Exact(pattern.to_string()),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(exact) => path == exact,
            PathPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

/// Ordered endpoint policy rules; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    rules: Vec<(PathPattern, AccessPolicy)>,
    fallback: AccessPolicy,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new(AccessPolicy::AuthenticatedOnly)
    }
}

impl PolicyTable {
    /// Empty table answering `fallback` for every path
    pub fn new(fallback: AccessPolicy) -> Self {
        Self {
            rules: Vec::new(),
            fallback,
        }
    }

    pub fn rule(mut self, pattern: &str, policy: AccessPolicy) -> Self {
        self.rules.push((PathPattern::parse(pattern), policy));
        self
    }

    pub fn policy_for(&self, path: &str) -> &AccessPolicy {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, policy)| policy)
            .unwrap_or(&self.fallback)
    }
}

/// Gate middleware; must run after [`crate::auth::auth_middleware`].
pub async fn authorization_gate(
    State(policies): State<Arc<PolicyTable>>,
    req: Request,
    next: Next,
) -> Result<Response, AccessDenied> {
    let path = req.uri().path();
    let policy = policies.policy_for(path);
    let principal = req.extensions().get::<Principal>();

    if let Err(denied) = authorize(policy, principal) {
        match (denied, principal) {
            (AccessDenied::Forbidden, Some(principal)) => warn!(
                path = %path,
                username = %principal.username(),
                policy = ?policy,
                "Access forbidden"
            ),
            _ => debug!(path = %path, policy = ?policy, "Access denied: not authenticated"),
        }
        return Err(denied);
    }

    Ok(next.run(req).await)
}

//! Authentication Models
//! Mission: Define principals, roles, token claims and the auth wire types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Roles understood by the authorization gate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    #[serde(rename = "USER")]
    User, // Any registered account
    #[serde(rename = "ADMIN")]
    Admin, // Administrative endpoints
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let name = trimmed.strip_prefix("ROLE_").unwrap_or(trimmed);
        match name.to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0:?}")]
pub struct UnknownRole(pub String);

/// Set of roles held by a principal
pub type RoleSet = BTreeSet<Role>;

/// Parse a comma-delimited role column into a role set.
///
/// Unknown names are returned separately so the caller can decide how loudly
/// to complain; they never end up in the set.
pub fn parse_role_list(raw: &str) -> (RoleSet, Vec<String>) {
    let mut roles = RoleSet::new();
    let mut unknown = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        match part.parse::<Role>() {
            Ok(role) => {
                roles.insert(role);
            }
            Err(UnknownRole(name)) => unknown.push(name.trim().to_string()),
        }
    }
    (roles, unknown)
}

/// Inverse of [`parse_role_list`]
pub fn format_role_list(roles: &RoleSet) -> String {
    roles
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Authenticated identity attached to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    username: String,
    roles: RoleSet,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPrincipal {
    #[error("principal username is empty")]
    EmptyUsername,
    #[error("principal {0} has no roles")]
    NoRoles(String),
}

impl Principal {
    pub fn new(
        username: impl Into<String>,
        roles: impl IntoIterator<Item = Role>,
    ) -> Result<Self, InvalidPrincipal> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(InvalidPrincipal::EmptyUsername);
        }
        let roles: RoleSet = roles.into_iter().collect();
        if roles.is_empty() {
            return Err(InvalidPrincipal::NoRoles(username));
        }
        Ok(Self { username, roles })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// JWT Claims payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String, // username
    pub iat: i64,    // issued at, unix seconds
    pub exp: i64,    // expiration, unix seconds
    pub jti: String, // unique token id
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Claim names owned by the issuer; extra claims may not shadow them
pub const RESERVED_CLAIMS: [&str; 4] = ["sub", "iat", "exp", "jti"];

/// Persisted credential record
#[derive(Debug, Clone, Serialize)]
pub struct StoredUser {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub roles: RoleSet,
    pub created_at: String,
}

impl StoredUser {
    pub fn principal(&self) -> Result<Principal, InvalidPrincipal> {
        Principal::new(self.username.clone(), self.roles.iter().copied())
    }
}

/// Login / register request body
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub username: String,
    pub token: String,
    pub token_type: String, // always "Bearer"
    pub expires_in: i64,    // seconds until expiration
}

/// User response (sanitized)
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub roles: RoleSet,
    pub created_at: String,
}

impl UserResponse {
    pub fn from_user(user: &StoredUser) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            roles: user.roles.clone(),
            created_at: user.created_at.clone(),
        }
    }
}

//! User Storage
//! Mission: Resolve usernames to principals and check credentials with SQLite

use crate::auth::models::{
    format_role_list, parse_role_list, Principal, Role, RoleSet, StoredUser,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{info, warn};
use uuid::Uuid;

/// Resolves a username to its current principal
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn find_principal(&self, username: &str) -> Result<Option<Principal>>;
}

/// One-way credential comparison
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `Ok(false)` for an unknown user as well as a wrong password.
    async fn verify_password(&self, username: &str, password: &str) -> Result<bool>;
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("username {0:?} is already taken")]
    UsernameTaken(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// User storage with SQLite backend
#[derive(Clone)]
pub struct UserStore {
    db_path: String,
    bcrypt_cost: u32,
}

impl UserStore {
    /// Create a new user store and initialize database
    pub fn new(db_path: &str) -> Result<Self> {
        Self::with_cost(db_path, DEFAULT_COST)
    }

    /// Same as [`UserStore::new`] with an explicit bcrypt work factor
    pub fn with_cost(db_path: &str, bcrypt_cost: u32) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            bcrypt_cost,
        };
        store.init_db()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open user database at {}", self.db_path))
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                roles TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Seed an admin account unless one already exists.
    ///
    /// Returns whether an account was created.
    pub fn ensure_admin(&self, username: &str, password: &str) -> Result<bool> {
        let conn = self.connect()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE ',' || roles || ',' LIKE '%,ADMIN,%'",
                [],
                |row| row.get(0),
            )
            .context("Failed to check for admin users")?;

        if count > 0 {
            return Ok(false);
        }

        match self.create_user(username, password, RoleSet::from([Role::User, Role::Admin])) {
            Ok(_) => {
                info!("🔐 Bootstrap admin user created (username: {})", username);
                Ok(true)
            }
            Err(RegisterError::UsernameTaken(name)) => {
                warn!("⚠️  Bootstrap admin {} already exists without ADMIN role", name);
                Ok(false)
            }
            Err(RegisterError::Storage(e)) => Err(e),
        }
    }

    /// Get user by username
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<StoredUser>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, roles, created_at
             FROM users WHERE username = ?1",
        )?;

        let user = stmt
            .query_row(params![username], map_user_row)
            .optional()
            .context("Failed to load user")?;
        Ok(user)
    }

    /// Load a user and turn it into a principal (blocking).
    ///
    /// A record whose roles are all unrecognised resolves to `None`.
    pub fn resolve_principal(&self, username: &str) -> Result<Option<Principal>> {
        let Some(user) = self.get_user_by_username(username)? else {
            return Ok(None);
        };

        match user.principal() {
            Ok(principal) => Ok(Some(principal)),
            Err(e) => {
                warn!("User {} is not resolvable: {}", username, e);
                Ok(None)
            }
        }
    }

    /// Verify username and password (blocking)
    pub fn check_password(&self, username: &str, password: &str) -> Result<bool> {
        match self.get_user_by_username(username)? {
            Some(user) => {
                let valid =
                    verify(password, &user.password_hash).context("Failed to verify password")?;
                Ok(valid)
            }
            None => Ok(false),
        }
    }

    /// Register a new account with the default `USER` role
    pub fn register(&self, username: &str, password: &str) -> Result<StoredUser, RegisterError> {
        self.create_user(username, password, RoleSet::from([Role::User]))
    }

    /// Create a new user
    pub fn create_user(
        &self,
        username: &str,
        password: &str,
        roles: RoleSet,
    ) -> Result<StoredUser, RegisterError> {
        if self.get_user_by_username(username)?.is_some() {
            return Err(RegisterError::UsernameTaken(username.to_string()));
        }

        let password_hash =
            hash(password, self.bcrypt_cost).context("Failed to hash password")?;

        let user = StoredUser {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash,
            roles,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = self.connect()?;
        let inserted = conn.execute(
            "INSERT INTO users (id, username, password_hash, roles, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.to_string(),
                user.username,
                user.password_hash,
                format_role_list(&user.roles),
                user.created_at,
            ],
        );

        match inserted {
            Ok(_) => {}
            // Lost a race with a concurrent registration of the same name.
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Err(RegisterError::UsernameTaken(username.to_string()));
            }
            Err(e) => {
                return Err(RegisterError::Storage(
                    anyhow::Error::new(e).context("Failed to insert user"),
                ))
            }
        }

        info!(
            "✅ Created user: {} ({})",
            user.username,
            format_role_list(&user.roles)
        );

        Ok(user)
    }

    /// Delete a user by username
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        let conn = self.connect()?;
        let rows_affected =
            conn.execute("DELETE FROM users WHERE username = ?1", params![username])?;

        if rows_affected > 0 {
            info!("🗑️  Deleted user: {}", username);
        }
        Ok(rows_affected > 0)
    }
}

fn map_user_row(row: &Row<'_>) -> rusqlite::Result<StoredUser> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let username: String = row.get(1)?;
    let raw_roles: String = row.get(3)?;

    let (roles, unknown) = parse_role_list(&raw_roles);
    if !unknown.is_empty() {
        warn!(username = %username, unknown = ?unknown, "Ignoring unknown roles on user record");
    }

    Ok(StoredUser {
        id,
        username,
        password_hash: row.get(2)?,
        roles,
        created_at: row.get(4)?,
    })
}

#[async_trait]
impl UserLookup for UserStore {
    async fn find_principal(&self, username: &str) -> Result<Option<Principal>> {
        // SQLite may sit in its busy handler; a caller's timeout must still win.
        let store = self.clone();
        let username = username.to_string();
        tokio::task::spawn_blocking(move || store.resolve_principal(&username))
            .await
            .context("User lookup task failed")?
    }
}

#[async_trait]
impl CredentialVerifier for UserStore {
    async fn verify_password(&self, username: &str, password: &str) -> Result<bool> {
        // bcrypt is deliberately slow; keep it off the async workers.
        let store = self.clone();
        let username = username.to_string();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || store.check_password(&username, &password))
            .await
            .context("Password verification task failed")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    // bcrypt's minimum cost keeps the tests fast
    const TEST_COST: u32 = 4;

    fn create_test_store() -> (UserStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = UserStore::with_cost(db_path, TEST_COST).unwrap();
        (store, temp_file)
    }

    #[test]
    fn test_register_and_retrieve_user() {
        let (store, _temp) = create_test_store();

        let bob = store.register("bob", "secret").unwrap();
        assert_eq!(bob.username, "bob");
        assert_eq!(bob.roles, RoleSet::from([Role::User]));
        assert_ne!(bob.password_hash, "secret");

        let retrieved = store.get_user_by_username("bob").unwrap().unwrap();
        assert_eq!(retrieved.id, bob.id);
        assert_eq!(retrieved.roles, RoleSet::from([Role::User]));
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let (store, _temp) = create_test_store();

        store.register("bob", "secret").unwrap();
        let err = store.register("bob", "other").unwrap_err();
        assert!(matches!(err, RegisterError::UsernameTaken(name) if name == "bob"));
    }

    #[tokio::test]
    async fn test_password_verification() {
        let (store, _temp) = create_test_store();
        store.register("bob", "secret").unwrap();

        assert!(store.verify_password("bob", "secret").await.unwrap());
        assert!(!store.verify_password("bob", "wrongpassword").await.unwrap());
        assert!(!store.verify_password("nobody", "secret").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_principal() {
        let (store, _temp) = create_test_store();
        store.register("bob", "secret").unwrap();

        let bob = store.find_principal("bob").await.unwrap().unwrap();
        assert_eq!(bob.username(), "bob");
        assert!(bob.has_role(Role::User));
        assert!(!bob.has_role(Role::Admin));

        assert!(store.find_principal("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_roles_validated_at_boundary() {
        let (store, temp) = create_test_store();
        store.register("bob", "secret").unwrap();
        store.register("eve", "secret").unwrap();

        let conn = Connection::open(temp.path()).unwrap();
        conn.execute(
            "UPDATE users SET roles = 'USER,auditor' WHERE username = 'bob'",
            [],
        )
        .unwrap();
        conn.execute("UPDATE users SET roles = 'auditor' WHERE username = 'eve'", [])
            .unwrap();

        let bob = store.find_principal("bob").await.unwrap().unwrap();
        assert_eq!(bob.roles(), &RoleSet::from([Role::User]));

        // No recognised roles left: not a valid principal.
        assert!(store.find_principal("eve").await.unwrap().is_none());
    }

    #[test]
    fn test_ensure_admin_seeds_once() {
        let (store, _temp) = create_test_store();

        assert!(store.ensure_admin("admin", "admin123").unwrap());
        assert!(!store.ensure_admin("admin2", "admin123").unwrap());

        let admin = store.get_user_by_username("admin").unwrap().unwrap();
        assert!(admin.roles.contains(&Role::Admin));
        assert!(store.get_user_by_username("admin2").unwrap().is_none());
    }

    #[test]
    fn test_delete_user() {
        let (store, _temp) = create_test_store();
        store.register("tempuser", "pass").unwrap();

        assert!(store.delete_user("tempuser").unwrap());
        assert!(store.get_user_by_username("tempuser").unwrap().is_none());
        assert!(!store.delete_user("tempuser").unwrap());
    }
}

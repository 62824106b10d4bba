//! Runtime configuration
//!
//! Every option is a flag with an environment fallback, so a `.env` file is
//! enough to run the server:
//!   JWT_SECRET              - HS256 signing secret (required)
//!   JWT_EXPIRATION_MINUTES  - token lifetime (default: 60)
//!   JWT_CLOCK_SKEW_SECS     - tolerance on expiry checks (default: 0)
//!   REVOCATION_SWEEP_SECS   - revocation purge interval (default: 10)
//!   USER_LOOKUP_TIMEOUT_MS  - per-request principal lookup budget (default: 2000)
//!   AUTH_DB_PATH            - SQLite user database (default: tokengate_auth.db)

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "tokengate")]
#[command(about = "Bearer-token authentication server with role-based access and logout")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// HS256 signing secret
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Token lifetime in minutes
    #[arg(long, env = "JWT_EXPIRATION_MINUTES", default_value = "60")]
    pub jwt_expiration_minutes: i64,

    /// Seconds of clock skew tolerated when checking expiry
    #[arg(long, env = "JWT_CLOCK_SKEW_SECS", default_value = "0")]
    pub jwt_clock_skew_secs: i64,

    /// Interval between revocation sweeps, in seconds
    #[arg(long, env = "REVOCATION_SWEEP_SECS", default_value = "10")]
    pub revocation_sweep_secs: u64,

    /// Timeout for resolving a token subject to a principal, in milliseconds
    #[arg(long, env = "USER_LOOKUP_TIMEOUT_MS", default_value = "2000")]
    pub user_lookup_timeout_ms: u64,

    /// SQLite user database path
    #[arg(long, env = "AUTH_DB_PATH", default_value = "tokengate_auth.db")]
    pub auth_db_path: String,

    /// bcrypt work factor for new passwords
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// Admin account created at startup when no admin exists
    #[arg(long, env = "BOOTSTRAP_ADMIN_USERNAME", requires = "bootstrap_admin_password")]
    pub bootstrap_admin_username: Option<String>,

    #[arg(long, env = "BOOTSTRAP_ADMIN_PASSWORD", hide_env_values = true)]
    pub bootstrap_admin_password: Option<String>,
}

/// Validated authentication settings
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_lifetime: chrono::Duration,
    pub clock_skew: chrono::Duration,
    pub sweep_interval: Duration,
    pub lookup_timeout: Duration,
    pub bcrypt_cost: u32,
}

impl Config {
    /// Reject configurations that cannot serve requests safely
    pub fn auth_settings(&self) -> Result<AuthSettings> {
        if self.jwt_secret.trim().is_empty() {
            bail!("JWT_SECRET must be set to a non-empty value");
        }
        if self.jwt_expiration_minutes <= 0 {
            bail!(
                "JWT_EXPIRATION_MINUTES must be positive, got {}",
                self.jwt_expiration_minutes
            );
        }
        if self.jwt_clock_skew_secs < 0 {
            bail!("JWT_CLOCK_SKEW_SECS must not be negative");
        }
        if self.revocation_sweep_secs == 0 {
            bail!("REVOCATION_SWEEP_SECS must be at least 1");
        }
        if self.user_lookup_timeout_ms == 0 {
            bail!("USER_LOOKUP_TIMEOUT_MS must be at least 1");
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            bail!("BCRYPT_COST must be between 4 and 31, got {}", self.bcrypt_cost);
        }

        let token_lifetime = chrono::Duration::try_minutes(self.jwt_expiration_minutes)
            .context("JWT_EXPIRATION_MINUTES is out of range")?;
        let clock_skew = chrono::Duration::try_seconds(self.jwt_clock_skew_secs)
            .context("JWT_CLOCK_SKEW_SECS is out of range")?;

        Ok(AuthSettings {
            jwt_secret: self.jwt_secret.clone(),
            token_lifetime,
            clock_skew,
            sweep_interval: Duration::from_secs(self.revocation_sweep_secs),
            lookup_timeout: Duration::from_millis(self.user_lookup_timeout_ms),
            bcrypt_cost: self.bcrypt_cost,
        })
    }

    /// Both bootstrap admin credentials, when configured
    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        match (&self.bootstrap_admin_username, &self.bootstrap_admin_password) {
            (Some(username), Some(password)) if !username.trim().is_empty() => {
                Some((username.as_str(), password.as_str()))
            }
            _ => None,
        }
    }
}

/// Load `.env` from the working directory (and parents), then the crate root.
pub fn load_env() {
    let _ = dotenv::dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["tokengate"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--jwt-secret", "s3cret", "--auth-db-path", "x.db"]);
        let settings = config.auth_settings().unwrap();

        assert_eq!(settings.token_lifetime, chrono::Duration::minutes(60));
        assert_eq!(settings.clock_skew, chrono::Duration::zero());
        assert_eq!(settings.sweep_interval, Duration::from_secs(10));
        assert_eq!(settings.lookup_timeout, Duration::from_millis(2000));
        assert!(config.bootstrap_admin().is_none());
    }

    #[test]
    fn test_blank_secret_rejected() {
        let config = parse(&["--jwt-secret", "   "]);
        assert!(config.auth_settings().is_err());
    }

    #[test]
    fn test_non_positive_lifetime_rejected() {
        let config = parse(&["--jwt-secret", "s3cret", "--jwt-expiration-minutes", "0"]);
        assert!(config.auth_settings().is_err());

        let config = parse(&["--jwt-secret", "s3cret", "--revocation-sweep-secs", "0"]);
        assert!(config.auth_settings().is_err());
    }

    #[test]
    fn test_bootstrap_admin_pair() {
        let config = parse(&[
            "--jwt-secret",
            "s3cret",
            "--bootstrap-admin-username",
            "root",
            "--bootstrap-admin-password",
            "hunter22",
        ]);
        assert_eq!(config.bootstrap_admin(), Some(("root", "hunter22")));
    }
}

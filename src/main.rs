//! TokenGate - bearer-token authentication server
//! Mission: Authenticate every request, authorize every endpoint, honour logout

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tokengate::{
    auth::{RevocationStore, UserStore},
    config::{self, Config},
    App,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    config::load_env();
    init_tracing();

    let config = Config::parse();
    let settings = config.auth_settings().context("Invalid configuration")?;

    info!("🚀 TokenGate starting");

    let user_store = Arc::new(
        UserStore::with_cost(&config.auth_db_path, settings.bcrypt_cost)
            .context("Failed to open user store")?,
    );
    info!("🔐 User store initialized at: {}", config.auth_db_path);

    if let Some((username, password)) = config.bootstrap_admin() {
        if user_store.ensure_admin(username, password)? {
            warn!("⚠️  Bootstrap admin created; rotate its password in production");
        }
    }

    let app = App::new(&settings, user_store)?;
    info!(
        "🎟️  Tokens live for {}m (clock skew tolerance {}s)",
        app.jwt_handler.lifetime().num_minutes(),
        app.jwt_handler.clock_skew().num_seconds()
    );

    // Runs until the process exits.
    RevocationStore::spawn_sweeper(app.revocations.clone(), settings.sweep_interval);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(listener, app.router)
        .await
        .context("Server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tokengate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

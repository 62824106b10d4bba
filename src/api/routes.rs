//! Demo endpoints guarded by the default policy table

use crate::auth::CurrentPrincipal;
use tracing::debug;

/// GET /api/public
pub async fn public() -> &'static str {
    "This is a public endpoint. Anyone can access this."
}

/// GET /api/protected
pub async fn protected() -> &'static str {
    "This is a protected endpoint. You are authenticated!"
}

/// GET /api/admin
pub async fn admin(CurrentPrincipal(principal): CurrentPrincipal) -> &'static str {
    debug!("Admin endpoint served to {}", principal.username());
    "This is an admin-only endpoint. You are an admin!"
}

/// GET /health
pub async fn health_check() -> &'static str {
    "🚀 TokenGate Operational"
}

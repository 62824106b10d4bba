//! TokenGate
//!
//! Bearer-token authentication for HTTP services: token issuance and
//! validation, logout through a revocation list, and per-endpoint
//! role-based access control.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod middleware;

pub use app::App;
pub use config::{AuthSettings, Config};

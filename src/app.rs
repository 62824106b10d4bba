//! Application wiring: one place that turns settings into a router.

use crate::api;
use crate::auth::{AuthState, Authenticator, JwtHandler, RevocationStore, UserLookup, UserStore};
use crate::config::AuthSettings;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;

/// Shared components behind the router
pub struct App {
    pub router: Router,
    pub jwt_handler: Arc<JwtHandler>,
    pub revocations: Arc<RevocationStore>,
    pub user_store: Arc<UserStore>,
}

impl App {
    pub fn new(settings: &AuthSettings, user_store: Arc<UserStore>) -> Result<Self> {
        let jwt_handler = Arc::new(
            JwtHandler::new(&settings.jwt_secret, settings.token_lifetime)?
                .with_clock_skew(settings.clock_skew),
        );
        let revocations = Arc::new(RevocationStore::new());

        let lookup: Arc<dyn UserLookup> = user_store.clone();
        let authenticator = Authenticator::new(
            jwt_handler.clone(),
            revocations.clone(),
            lookup,
            settings.lookup_timeout,
        );
        let state = AuthState::new(user_store.clone(), jwt_handler.clone(), revocations.clone());

        Ok(Self {
            router: api::router(state, authenticator, api::default_policies()),
            jwt_handler,
            revocations,
            user_store,
        })
    }
}

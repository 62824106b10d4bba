//! Access log for the API.
//!
//! Runs inside the authentication layer, so each line names the principal
//! the request was served as.

use crate::auth::{extract_principal, Principal};
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

const ANONYMOUS: &str = "-";

/// Log method, path, principal, status and latency for every request except `/health`.
///
/// 5xx goes out at WARN. 401/403 are ordinary gate outcomes and stay at INFO.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let user = principal_label(extract_principal(&request));

    let start = Instant::now();
    let response = next.run(request).await;
    let latency_ms = start.elapsed().as_millis();
    let status = response.status();

    if status.is_server_error() {
        warn!(%method, %path, %user, status = status.as_u16(), latency_ms, "Request failed");
    } else {
        info!(%method, %path, %user, status = status.as_u16(), latency_ms, "Request served");
    }

    response
}

fn principal_label(principal: Option<&Principal>) -> String {
    principal
        .map(|p| p.username().to_string())
        .unwrap_or_else(|| ANONYMOUS.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    #[test]
    fn test_principal_label() {
        let bob = Principal::new("bob", [Role::User]).unwrap();
        assert_eq!(principal_label(Some(&bob)), "bob");
        assert_eq!(principal_label(None), "-");
    }
}

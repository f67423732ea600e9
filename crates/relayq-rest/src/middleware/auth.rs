//! API-key middleware.

use crate::{responses::AppError, state::AppState};
use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use relayq_core::RelayError;
use subtle::ConstantTimeEq;
use tracing::debug;

/// Header carrying the producer credential.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Rejects requests whose `x-api-key` header does not match the
/// configured key.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    match presented {
        Some(key) if key_matches(key, &state.api_key) => Ok(next.run(request).await),
        Some(_) => {
            debug!(path = %request.uri().path(), "Rejected request with wrong API key");
            Err(RelayError::unauthorized("invalid API key").into())
        }
        None => Err(RelayError::unauthorized("missing x-api-key header").into()),
    }
}

/// Compares without short-circuiting on the first differing byte.
fn key_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

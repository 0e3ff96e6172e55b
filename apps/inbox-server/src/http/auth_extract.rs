use axum::http::HeaderMap;
use inbox_types::entities::AgentIdentity;
use inbox_types::{AppError, AppResult};

use crate::state::AppState;

/// Pulls the bearer token out of `Authorization` and verifies it. A small
/// helper rather than a full `FromRequestParts` impl, since every handler
/// already takes `State<AppState>` and this keeps the signature plain.
pub fn identity_from_headers(state: &AppState, headers: &HeaderMap) -> AppResult<AgentIdentity> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Authn)?;

    let token = header.strip_prefix("Bearer ").ok_or(AppError::Authn)?;
    state.auth.verify(token)
}

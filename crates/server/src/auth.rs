use axum::http::{HeaderMap, StatusCode};
use clinicdesk_core::domain::audit::RequestMeta;
use clinicdesk_core::domain::model::{Role, TenantContext};
use clinicdesk_core::ports::repo::TenantRepo;
use sha2::{Digest, Sha256};

use crate::app_state::AppState;
use crate::errors::ServerError;

/// Resolves the bearer token to the calling user and clinic.
pub async fn tenant(state: &AppState, headers: &HeaderMap) -> Result<TenantContext, ServerError> {
    let token = bearer_token(headers)?;
    let token_hash = hash_token(&token);

    state
        .repo
        .resolve_token(&token_hash, state.now_ms())
        .await?
        .ok_or_else(|| ServerError::new(StatusCode::UNAUTHORIZED, "invalid token"))
}

pub fn bearer_token(headers: &HeaderMap) -> Result<String, ServerError> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let token = value.strip_prefix("Bearer ").unwrap_or("").trim();
    if token.is_empty() {
        return Err(ServerError::new(
            StatusCode::UNAUTHORIZED,
            "missing bearer token",
        ));
    }
    Ok(token.to_string())
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Owners and admins.
pub fn require_manager(ctx: &TenantContext) -> Result<(), ServerError> {
    if ctx.role.is_manager() {
        return Ok(());
    }
    Err(ServerError::forbidden("owner or admin role required"))
}

pub fn require_owner(ctx: &TenantContext) -> Result<(), ServerError> {
    if ctx.role == Role::Owner {
        return Ok(());
    }
    Err(ServerError::forbidden("owner role required"))
}

/// First `X-Forwarded-For` hop and the `User-Agent`, for the audit trail.
pub fn request_meta(headers: &HeaderMap) -> RequestMeta {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    RequestMeta {
        ip_address: header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()),
        user_agent: header("user-agent").map(str::to_string),
    }
}

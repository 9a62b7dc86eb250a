//! Role gate for routes.
//!
//! The role always comes from the server-side session behind the bearer
//! token, never from anything the client declares.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use chrono::Utc;

use crate::{
    db::models::{Role, User},
    error::AppError,
    services::auth,
    state::AppState,
};

/// Any signed-in account.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

/// An account with at least counter rights.
pub struct CounterStaff(pub User);

/// An admin account.
pub struct Admin(pub User);

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

async fn authorize(
    parts: &Parts,
    state: &AppState,
    required: Role,
) -> Result<AuthUser, AppError> {
    let token = bearer_token(&parts.headers)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    let user = auth::resolve_session(&state.pool, token, Utc::now())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired session".to_string()))?;

    if !user.role.satisfies(required) {
        log::warn!(
            "{} ({}) denied access to {}",
            user.email,
            user.role,
            parts.uri.path()
        );
        return Err(AppError::Forbidden(format!("{required} access required")));
    }

    Ok(AuthUser {
        user,
        token: token.to_string(),
    })
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authorize(parts, state, Role::User).await
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CounterStaff {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authorize(parts, state, Role::Counter)
            .await
            .map(|auth| CounterStaff(auth.user))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Admin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authorize(parts, state, Role::Admin)
            .await
            .map(|auth| Admin(auth.user))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn parses_bearer_tokens() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}

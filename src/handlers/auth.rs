use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    db::models::{Role, User},
    error::{AppResult, ValidJson},
    gate::AuthUser,
    services::auth,
    state::AppState,
};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// Self-service sign-up always yields a plain `user` account.
pub async fn register(
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = auth::create_user(
        &state.pool,
        &payload.name,
        &payload.email,
        &payload.password,
        Role::User,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let ttl = state.config.session_ttl();
    let (token, user) = auth::login(&state.pool, &payload.email, &payload.password, ttl).await?;

    Ok(Json(LoginResponse { token, user }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    current: AuthUser,
) -> AppResult<Json<Value>> {
    auth::logout(&state.pool, &current.token).await?;
    log::info!("Closed session for {}", current.user.email);

    Ok(Json(json!({ "message": "Logged out" })))
}

pub async fn verify(current: AuthUser) -> Json<Value> {
    Json(json!({ "success": true, "user": current.user }))
}

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppResult, ValidJson},
    services::otp,
    state::AppState,
};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendOtpRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub otp: String,
}

pub async fn send_otp(
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<SendOtpRequest>,
) -> AppResult<Json<Value>> {
    let ttl = state.config.otp_ttl();
    otp::send_otp(&state.pool, state.mailer.as_ref(), &payload.email, ttl).await?;

    Ok(Json(json!({ "message": "OTP sent to email" })))
}

pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    ValidJson(payload): ValidJson<VerifyOtpRequest>,
) -> AppResult<Json<Value>> {
    otp::verify_otp(&state.pool, &payload.email, &payload.otp, Utc::now()).await?;

    Ok(Json(json!({ "message": "OTP verified" })))
}

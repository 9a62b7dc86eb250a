use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{
    db::models::User,
    error::{AppError, AppResult, ValidPath},
    gate::Admin,
    state::AppState,
};

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
) -> AppResult<Json<Vec<User>>> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC, id DESC")
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(users))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Admin(admin): Admin,
    ValidPath(id): ValidPath<i64>,
) -> AppResult<Json<Value>> {
    if admin.id == id {
        return Err(AppError::validation("You cannot delete yourself"));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("User not found"));
    }

    log::info!("{} deleted user {}", admin.email, id);
    Ok(Json(json!({ "message": "User deleted successfully" })))
}

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    db::models::{Order, OrderStatus},
    error::{AppError, AppResult, ValidJson, ValidPath},
    gate::{Admin, AuthUser},
    services::{
        orders::{self, CreateOrderRequest, CreateOutcome},
        reports::{self, CounterStats},
    },
    state::AppState,
};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

/// Creates the order for a confirmed payment.
///
/// A repeated call for the same payment answers 409 with the stored order
/// instead of creating a second one.
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    current: AuthUser,
    ValidJson(payload): ValidJson<CreateOrderRequest>,
) -> AppResult<Json<Order>> {
    let new = payload.normalize()?;
    log::debug!("{} checking out payment {}", current.user.email, new.payment_id);

    match orders::create_order(&state.pool, new).await? {
        CreateOutcome::Created(order) => Ok(Json(order)),
        CreateOutcome::Existing(order) => Err(AppError::conflict_with(
            "Order already exists for this payment",
            json!({ "order": order }),
        )),
    }
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(orders::list_orders(&state.pool).await?))
}

pub async fn get_order(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    ValidPath(id): ValidPath<i64>,
) -> AppResult<Json<Order>> {
    let order = orders::find_order(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Order not found"))?;

    Ok(Json(order))
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Admin(admin): Admin,
    ValidPath(id): ValidPath<i64>,
    ValidJson(update): ValidJson<StatusUpdate>,
) -> AppResult<Json<Order>> {
    let order = orders::set_status(&state.pool, &state.locks, id, update.status).await?;
    log::info!("{} set order {} to {:?}", admin.email, id, order.status);

    Ok(Json(order))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
) -> AppResult<Json<CounterStats>> {
    let all = orders::list_orders(&state.pool).await?;
    Ok(Json(reports::counter_stats(&all, Utc::now().date_naive())))
}

use std::sync::Arc;

use axum::{body::Bytes, extract::State, Json};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    db::models::{Order, OrderStatus},
    error::{AppError, AppResult, ValidPath},
    gate::CounterStaff,
    services::{
        orders,
        reports::{self, CounterStats},
    },
    state::AppState,
    utils::lenient_number,
};

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ServeRequest {
    #[serde(default, deserialize_with = "lenient_number")]
    pub qty: Option<f64>,
}

impl ServeRequest {
    /// An empty body is the same as `{}`.
    fn parse(body: &[u8]) -> AppResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| AppError::validation(e.to_string()))
    }

    /// Missing quantity means one unit; fractions are not servable.
    fn quantity(&self) -> AppResult<i64> {
        match self.qty {
            None => Ok(1),
            Some(q) if q.fract() == 0.0 && q >= 1.0 => Ok(q as i64),
            Some(_) => Err(AppError::validation("Invalid serve quantity")),
        }
    }
}

pub async fn pending(
    State(state): State<Arc<AppState>>,
    _staff: CounterStaff,
) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(
        orders::list_by_status(&state.pool, OrderStatus::Pending).await?,
    ))
}

pub async fn delivered(
    State(state): State<Arc<AppState>>,
    _staff: CounterStaff,
) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(
        orders::list_by_status(&state.pool, OrderStatus::Completed).await?,
    ))
}

pub async fn scan(
    State(state): State<Arc<AppState>>,
    _staff: CounterStaff,
    ValidPath(code): ValidPath<String>,
) -> AppResult<Json<Order>> {
    let order = orders::scan(&state.pool, &state.config.scan_prefix, &code).await?;
    Ok(Json(order))
}

pub async fn serve_item(
    State(state): State<Arc<AppState>>,
    CounterStaff(staff): CounterStaff,
    ValidPath((order_id, index)): ValidPath<(i64, usize)>,
    body: Bytes,
) -> AppResult<Json<Order>> {
    let qty = ServeRequest::parse(&body)?.quantity()?;
    let order = orders::serve_item(&state.pool, &state.locks, order_id, index, qty).await?;
    log::debug!("{} served order {} item {}", staff.email, order_id, index);

    Ok(Json(order))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    _staff: CounterStaff,
) -> AppResult<Json<CounterStats>> {
    let all = orders::list_orders(&state.pool).await?;
    Ok(Json(reports::counter_stats(&all, Utc::now().date_naive())))
}

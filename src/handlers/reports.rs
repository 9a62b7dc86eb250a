use std::sync::Arc;

use axum::{extract::State, Json};

use crate::{
    db::models::Order,
    error::{AppResult, ValidQuery},
    gate::Admin,
    services::{
        orders,
        reports::{self, CategoryRevenue, DateRange, DayBreakdown, Kpis},
    },
    state::AppState,
};

async fn orders_in(state: &AppState, range: DateRange) -> AppResult<Vec<Order>> {
    let all = orders::list_orders(&state.pool).await?;
    Ok(range.apply(all))
}

pub async fn kpis(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    ValidQuery(range): ValidQuery<DateRange>,
) -> AppResult<Json<Kpis>> {
    let orders = orders_in(&state, range).await?;
    Ok(Json(reports::kpis(&orders)))
}

pub async fn overview(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    ValidQuery(range): ValidQuery<DateRange>,
) -> AppResult<Json<Vec<CategoryRevenue>>> {
    let orders = orders_in(&state, range).await?;
    Ok(Json(reports::overview(&orders)))
}

pub async fn breakdown(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    ValidQuery(range): ValidQuery<DateRange>,
) -> AppResult<Json<Vec<DayBreakdown>>> {
    let orders = orders_in(&state, range).await?;
    Ok(Json(reports::breakdown(&orders)))
}

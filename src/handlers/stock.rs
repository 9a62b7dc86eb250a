use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    db::models::StockItem,
    error::{AppError, AppResult, ValidJson, ValidPath},
    gate::{Admin, AuthUser},
    state::AppState,
    utils::lenient_number,
};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateStockItem {
    #[serde(default)]
    pub item_name: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub quantity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub price: Option<f64>,
}

impl CreateStockItem {
    fn validate(self) -> AppResult<(String, i64, f64)> {
        let item_name = self.item_name.trim().to_string();
        if item_name.is_empty() {
            return Err(AppError::validation("itemName is required"));
        }

        let quantity = self
            .quantity
            .ok_or_else(|| AppError::validation("quantity is required"))?;
        if quantity.fract() != 0.0 || quantity < 0.0 {
            return Err(AppError::validation(
                "quantity must be a non-negative whole number",
            ));
        }

        let price = self
            .price
            .ok_or_else(|| AppError::validation("price is required"))?;
        if !price.is_finite() || price < 0.0 {
            return Err(AppError::validation("price must not be negative"));
        }

        Ok((item_name, quantity as i64, price))
    }
}

pub async fn list_stock(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> AppResult<Json<Vec<StockItem>>> {
    let items = sqlx::query_as::<_, StockItem>("SELECT * FROM stock ORDER BY item_name ASC, id ASC")
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(items))
}

pub async fn create_stock_item(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    ValidJson(payload): ValidJson<CreateStockItem>,
) -> AppResult<(StatusCode, Json<StockItem>)> {
    let (item_name, quantity, price) = payload.validate()?;

    let item = sqlx::query_as::<_, StockItem>(
        "INSERT INTO stock (item_name, quantity, price, created_at) VALUES (?, ?, ?, ?) RETURNING *",
    )
    .bind(&item_name)
    .bind(quantity)
    .bind(price)
    .bind(Utc::now())
    .fetch_one(&state.pool)
    .await?;

    log::info!("Stocked {} x {}", item.quantity, item.item_name);
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn delete_stock_item(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    ValidPath(id): ValidPath<i64>,
) -> AppResult<Json<Value>> {
    let result = sqlx::query("DELETE FROM stock WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Stock item not found"));
    }

    Ok(Json(json!({ "message": "Stock item deleted" })))
}

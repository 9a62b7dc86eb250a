use std::{io::ErrorKind, path::Path, sync::Arc};

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::{
    db::models::{Day, MealSlot, MenuItem},
    error::{AppError, AppResult, ValidJson, ValidPath},
    gate::Admin,
    state::AppState,
    utils::lenient_number,
};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateMenuItem {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub price: Option<f64>,
    #[serde(default)]
    pub category: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub day: Day,
    pub meal_slot: MealSlot,
    pub is_available: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateMenuItem {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub price: Option<f64>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub day: Option<Day>,
    pub meal_slot: Option<MealSlot>,
    pub is_available: Option<bool>,
}

fn validate_price(price: f64) -> AppResult<f64> {
    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(AppError::validation("Price must not be negative"))
    }
}

fn required(value: &str, field: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn find_menu_item(pool: &SqlitePool, id: i64) -> AppResult<MenuItem> {
    sqlx::query_as::<_, MenuItem>("SELECT * FROM menu_items WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Menu item not found"))
}

pub async fn list_menu(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<MenuItem>>> {
    let items = sqlx::query_as::<_, MenuItem>(
        "SELECT * FROM menu_items ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(items))
}

pub async fn get_menu_item(
    State(state): State<Arc<AppState>>,
    ValidPath(id): ValidPath<i64>,
) -> AppResult<Json<MenuItem>> {
    Ok(Json(find_menu_item(&state.pool, id).await?))
}

pub async fn create_menu_item(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    ValidJson(payload): ValidJson<CreateMenuItem>,
) -> AppResult<(StatusCode, Json<MenuItem>)> {
    let name = required(&payload.name, "Name")?;
    let category = required(&payload.category, "Category")?;
    let price = validate_price(
        payload
            .price
            .ok_or_else(|| AppError::validation("Price is required"))?,
    )?;
    let now = Utc::now();

    let item = sqlx::query_as::<_, MenuItem>(
        "INSERT INTO menu_items \
         (name, price, category, description, image, day, meal_slot, is_available, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(name)
    .bind(price)
    .bind(category)
    .bind(optional_text(payload.description))
    .bind(optional_text(payload.image))
    .bind(payload.day)
    .bind(payload.meal_slot)
    .bind(payload.is_available.unwrap_or(true))
    .bind(now)
    .bind(now)
    .fetch_one(&state.pool)
    .await?;

    log::info!("Menu item {} created: {}", item.id, item.name);
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_menu_item(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    ValidPath(id): ValidPath<i64>,
    ValidJson(patch): ValidJson<UpdateMenuItem>,
) -> AppResult<Json<MenuItem>> {
    let mut item = find_menu_item(&state.pool, id).await?;

    if let Some(name) = patch.name {
        item.name = required(&name, "Name")?;
    }
    if let Some(price) = patch.price {
        item.price = validate_price(price)?;
    }
    if let Some(category) = patch.category {
        item.category = required(&category, "Category")?;
    }
    if patch.description.is_some() {
        item.description = optional_text(patch.description);
    }
    if patch.image.is_some() {
        item.image = optional_text(patch.image);
    }
    if let Some(day) = patch.day {
        item.day = day;
    }
    if let Some(meal_slot) = patch.meal_slot {
        item.meal_slot = meal_slot;
    }
    if let Some(is_available) = patch.is_available {
        item.is_available = is_available;
    }

    let item = sqlx::query_as::<_, MenuItem>(
        "UPDATE menu_items SET name = ?, price = ?, category = ?, description = ?, image = ?, \
         day = ?, meal_slot = ?, is_available = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(&item.name)
    .bind(item.price)
    .bind(&item.category)
    .bind(&item.description)
    .bind(&item.image)
    .bind(item.day)
    .bind(item.meal_slot)
    .bind(item.is_available)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("Menu item not found"))?;

    log::info!("Menu item {} updated", item.id);
    Ok(Json(item))
}

pub async fn delete_menu_item(
    State(state): State<Arc<AppState>>,
    _admin: Admin,
    ValidPath(id): ValidPath<i64>,
) -> AppResult<Json<Value>> {
    let item = find_menu_item(&state.pool, id).await?;

    sqlx::query("DELETE FROM menu_items WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if let Some(image) = &item.image {
        remove_uploaded_image(&state.config.uploads_dir, image).await;
    }

    log::info!("Menu item {} deleted", id);
    Ok(Json(json!({ "message": "Menu item deleted" })))
}

/// Deletes the stored file behind an `/uploads/...` image path.
///
/// Only the final path component is used, so a crafted path cannot reach
/// outside the uploads directory. Images hosted elsewhere are left alone.
async fn remove_uploaded_image(uploads_dir: &str, image: &str) {
    let Some(relative) = image.strip_prefix("/uploads/") else {
        return;
    };
    let Some(file_name) = Path::new(relative).file_name() else {
        return;
    };

    let path = Path::new(uploads_dir).join(file_name);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => log::info!("Removed image {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove image {}: {}", path.display(), e),
    }
}

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::{types::Json, SqlitePool};

use crate::{
    db::models::{MealSlot, Order, OrderItem, OrderStatus},
    error::{AppError, AppResult},
    services::serving::OrderLocks,
    utils::{lenient_number, strip_scan_prefix},
};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateOrderRequest {
    pub payment_id: Option<String>,
    pub items: Option<Vec<CartItem>>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_amount: Option<f64>,
    pub user_name: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CartItem {
    #[serde(default, alias = "_id", deserialize_with = "lenient_number")]
    pub id: Option<f64>,
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub quantity: Option<f64>,
    pub image: Option<String>,
    pub category: Option<String>,
    pub meal_slot: Option<MealSlot>,
}

/// A validated order ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_name: String,
    pub payment_id: String,
    pub items: Vec<OrderItem>,
    pub total_amount: f64,
}

pub enum CreateOutcome {
    Created(Order),
    Existing(Order),
}

impl CreateOrderRequest {
    pub fn normalize(self) -> AppResult<NewOrder> {
        let payment_id = self
            .payment_id
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::validation("paymentId is required"))?;

        let items = self
            .items
            .filter(|items| !items.is_empty())
            .ok_or_else(|| AppError::validation("items must be a non-empty list"))?
            .into_iter()
            .enumerate()
            .map(|(index, item)| item.normalize(index))
            .collect::<AppResult<Vec<_>>>()?;

        let total_amount = self.total_amount.unwrap_or(0.0);
        if !total_amount.is_finite() || total_amount < 0.0 {
            return Err(AppError::validation("totalAmount must not be negative"));
        }

        let user_name = self
            .user_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Customer".to_string());

        Ok(NewOrder {
            user_name,
            payment_id,
            items,
            total_amount,
        })
    }
}

impl CartItem {
    fn normalize(self, index: usize) -> AppResult<OrderItem> {
        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::validation(format!("items[{index}].name is required")))?;

        let price = self.price.unwrap_or(0.0);
        if !price.is_finite() || price < 0.0 {
            return Err(AppError::validation(format!(
                "items[{index}].price must not be negative"
            )));
        }

        // A zero quantity falls back to one, like a missing one.
        let quantity = match self.quantity {
            None => 1.0,
            Some(q) if q == 0.0 => 1.0,
            Some(q) => q,
        };
        if quantity.fract() != 0.0 || quantity < 1.0 {
            return Err(AppError::validation(format!(
                "items[{index}].quantity must be a positive whole number"
            )));
        }

        let category = self
            .category
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .or_else(|| {
                self.meal_slot
                    .and_then(|slot| serde_json::to_value(slot).ok())
                    .and_then(|v| v.as_str().map(str::to_string))
            });

        Ok(OrderItem {
            id: self.id.filter(|id| id.fract() == 0.0).map(|id| id as i64),
            name,
            price,
            quantity: quantity as i64,
            image: self.image.filter(|i| !i.trim().is_empty()),
            category,
            served: false,
            served_qty: 0,
        })
    }
}

/// Stores a new order unless one already exists for the payment id.
///
/// The unique index on `payment_id` settles concurrent callbacks for the
/// same payment: the losing insert returns no row and the winner is read back.
///
/// Parameters:
/// - `pool`: The SQLite connection pool.
/// - `new`: A normalized order, see [`CreateOrderRequest::normalize`].
///
/// Returns:
/// - `Ok(CreateOutcome::Created)` with the stored row for a new payment.
/// - `Ok(CreateOutcome::Existing)` with the earlier order for a repeated one.
/// - `Err(AppError::Database)` if the insert or read-back fails.
pub async fn create_order(pool: &SqlitePool, new: NewOrder) -> AppResult<CreateOutcome> {
    let now = Utc::now();

    let inserted = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (user_name, payment_id, items, total_amount, status, version, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, 0, ?, ?) \
         ON CONFLICT(payment_id) DO NOTHING \
         RETURNING *",
    )
    .bind(&new.user_name)
    .bind(&new.payment_id)
    .bind(Json(&new.items))
    .bind(new.total_amount)
    .bind(OrderStatus::Pending)
    .bind(now)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    if let Some(order) = inserted {
        log::info!(
            "Created order {} for payment {}",
            order.id,
            order.payment_id
        );
        return Ok(CreateOutcome::Created(order));
    }

    let existing = find_by_payment_id(pool, &new.payment_id)
        .await?
        .ok_or_else(|| AppError::Internal("conflicting order vanished".to_string()))?;

    log::info!(
        "Order {} already exists for payment {}",
        existing.id,
        existing.payment_id
    );
    Ok(CreateOutcome::Existing(existing))
}

pub async fn find_order(pool: &SqlitePool, id: i64) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_payment_id(
    pool: &SqlitePool,
    payment_id: &str,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE payment_id = ?")
        .bind(payment_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_orders(pool: &SqlitePool) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders ORDER BY created_at DESC, id DESC")
        .fetch_all(pool)
        .await
}

/// Pending orders come back oldest first (serving queue), completed newest first.
pub async fn list_by_status(
    pool: &SqlitePool,
    status: OrderStatus,
) -> Result<Vec<Order>, sqlx::Error> {
    let sql = match status {
        OrderStatus::Pending => {
            "SELECT * FROM orders WHERE status = ? ORDER BY created_at ASC, id ASC"
        }
        OrderStatus::Completed => {
            "SELECT * FROM orders WHERE status = ? ORDER BY updated_at DESC, id DESC"
        }
    };

    sqlx::query_as::<_, Order>(sql)
        .bind(status)
        .fetch_all(pool)
        .await
}

/// Writes back the item array and status if nobody else wrote since `order` was read.
async fn save_if_unchanged(pool: &SqlitePool, order: &mut Order) -> AppResult<()> {
    let now = Utc::now();

    let result = sqlx::query(
        "UPDATE orders SET items = ?, status = ?, version = version + 1, updated_at = ? \
         WHERE id = ? AND version = ?",
    )
    .bind(Json(&order.items))
    .bind(order.status)
    .bind(now)
    .bind(order.id)
    .bind(order.version)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        log::warn!("Lost version race on order {}", order.id);
        return Err(AppError::conflict(
            "Order was modified concurrently, please retry",
        ));
    }

    order.version += 1;
    order.updated_at = now;
    Ok(())
}

/// Serves `qty` units of one line item and persists the result.
///
/// Runs under the order's entry in `locks`, then writes with a version
/// check so a writer in another process cannot be overwritten.
///
/// Parameters:
/// - `pool`: The SQLite connection pool.
/// - `locks`: Per-order lock registry shared by this process.
/// - `order_id`: Order to serve from.
/// - `index`: Position of the item in the order's item list.
/// - `qty`: Units handed over, at least one.
///
/// Returns:
/// - `Ok(Order)` with the updated order, completed once every item is served.
/// - `Err(AppError::NotFound)` if there is no such order.
/// - `Err(AppError::Conflict)` if the order is already completed or was
///   modified concurrently.
/// - `Err(AppError::Validation)` for a bad index, quantity or an over-serve.
pub async fn serve_item(
    pool: &SqlitePool,
    locks: &OrderLocks,
    order_id: i64,
    index: usize,
    qty: i64,
) -> AppResult<Order> {
    let _guard = locks.acquire(order_id).await;

    let mut order = find_order(pool, order_id)
        .await?
        .ok_or_else(|| AppError::not_found("Order not found"))?;

    order.serve_item(index, qty)?;
    save_if_unchanged(pool, &mut order).await?;

    log::info!(
        "Served {} of item {} on order {} ({:?})",
        qty,
        index,
        order.id,
        order.status
    );
    Ok(order)
}

/// Admin override of an order's status.
///
/// Parameters:
/// - `pool`: The SQLite connection pool.
/// - `locks`: Per-order lock registry shared by this process.
/// - `order_id`: Order to update.
/// - `status`: Target status.
///
/// Returns:
/// - `Ok(Order)` unchanged when the status already matches, or force-served
///   and completed when `status` is `Completed`.
/// - `Err(AppError::Conflict)` when reopening a completed order or when
///   another writer got there first.
/// - `Err(AppError::NotFound)` if there is no such order.
pub async fn set_status(
    pool: &SqlitePool,
    locks: &OrderLocks,
    order_id: i64,
    status: OrderStatus,
) -> AppResult<Order> {
    let _guard = locks.acquire(order_id).await;

    let mut order = find_order(pool, order_id)
        .await?
        .ok_or_else(|| AppError::not_found("Order not found"))?;

    match (order.status, status) {
        (current, target) if current == target => Ok(order),
        (OrderStatus::Completed, OrderStatus::Pending) => {
            Err(AppError::conflict("Order already completed"))
        }
        _ => {
            order.force_complete();
            save_if_unchanged(pool, &mut order).await?;
            log::info!("Order {} marked completed by admin", order.id);
            Ok(order)
        }
    }
}

/// Looks up the order behind a scanned QR code.
///
/// A completed order is reported as a conflict that still carries the
/// order, so the counter can show it with a warning.
///
/// Parameters:
/// - `pool`: The SQLite connection pool.
/// - `prefix`: Scan prefix to strip, e.g. `ORDER-`.
/// - `raw`: The scanned text; a bare payment id works too.
///
/// Returns:
/// - `Ok(Order)` for a pending order.
/// - `Err(AppError::Conflict)` carrying `alreadyServed` and the order when it
///   was already delivered.
/// - `Err(AppError::NotFound)` if no order has that payment id.
pub async fn scan(pool: &SqlitePool, prefix: &str, raw: &str) -> AppResult<Order> {
    let payment_id = strip_scan_prefix(raw, prefix);
    if payment_id.is_empty() {
        return Err(AppError::validation("paymentId is required"));
    }

    let order = find_by_payment_id(pool, payment_id)
        .await?
        .ok_or_else(|| AppError::not_found("Order not found"))?;

    if order.status == OrderStatus::Completed {
        return Err(AppError::conflict_with(
            "Order already delivered",
            json!({ "alreadyServed": true, "order": order }),
        ));
    }

    Ok(order)
}

//! Counter-side serving rules for a single order.
//!
//! An order is `pending` until every line item has been handed over, at
//! which point it becomes `completed` and accepts no further serves.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    db::models::{Order, OrderStatus},
    error::AppError,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ServeError {
    #[error("Order already completed")]
    AlreadyCompleted,
    #[error("Invalid item index")]
    InvalidIndex,
    #[error("Invalid serve quantity")]
    InvalidQuantity,
    #[error("Only {remaining} remaining for {name}")]
    ExceedsRemaining { remaining: i64, name: String },
}

impl From<ServeError> for AppError {
    fn from(e: ServeError) -> Self {
        match e {
            ServeError::AlreadyCompleted => AppError::conflict(e.to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl Order {
    pub fn is_fully_served(&self) -> bool {
        self.items.iter().all(|item| item.served)
    }

    /// Hands over `qty` units of the item at `index`.
    ///
    /// Nothing is mutated when an error is returned.
    pub fn serve_item(&mut self, index: usize, qty: i64) -> Result<(), ServeError> {
        if self.status == OrderStatus::Completed {
            return Err(ServeError::AlreadyCompleted);
        }

        if qty < 1 {
            return Err(ServeError::InvalidQuantity);
        }

        let item = self.items.get_mut(index).ok_or(ServeError::InvalidIndex)?;

        let remaining = item.remaining();
        if qty > remaining {
            return Err(ServeError::ExceedsRemaining {
                remaining,
                name: item.name.clone(),
            });
        }

        item.served_qty += qty;
        if item.served_qty >= item.quantity {
            item.served_qty = item.quantity;
            item.served = true;
        }

        if self.is_fully_served() {
            self.status = OrderStatus::Completed;
        }

        Ok(())
    }

    /// Marks every item as fully handed over and completes the order.
    pub fn force_complete(&mut self) {
        for item in &mut self.items {
            item.served_qty = item.quantity;
            item.served = true;
        }
        self.status = OrderStatus::Completed;
    }
}

/// Registry of per-order async locks so serves on one order run one at a time.
#[derive(Default)]
pub struct OrderLocks {
    inner: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

pub struct OrderGuard<'a> {
    locks: &'a OrderLocks,
    order_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, order_id: i64) -> OrderGuard<'_> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(order_id).or_default().clone()
        };

        OrderGuard {
            locks: self,
            order_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for OrderGuard<'_> {
    fn drop(&mut self) {
        let mut map = self
            .locks
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Clones are only taken under the map lock, so a count of two
        // (map + this guard) means nobody else is waiting on this order.
        if let Some(guard) = &self.guard {
            if Arc::strong_count(OwnedMutexGuard::mutex(guard)) == 2 {
                map.remove(&self.order_id);
            }
        }

        self.guard.take();
    }
}

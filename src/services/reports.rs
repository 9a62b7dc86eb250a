//! Reporting figures derived from raw orders on every request.
//!
//! Nothing here is persisted; all figures are recomputed from the order
//! rows, which is fine at canteen scale.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db::models::{MealSlot, Order, OrderItem, OrderStatus},
    utils::format_date,
};

/// Inclusive range of UTC creation dates; open ends are unbounded.
#[derive(Deserialize, Debug, Default, Clone, Copy)]
#[serde(deny_unknown_fields)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.from.map_or(true, |from| day >= from) && self.to.map_or(true, |to| day <= to)
    }

    pub fn apply(&self, orders: Vec<Order>) -> Vec<Order> {
        orders
            .into_iter()
            .filter(|o| self.contains(o.created_at))
            .collect()
    }
}

#[derive(Serialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Kpis {
    pub total_orders: usize,
    pub total_revenue: f64,
    pub breakfast_orders: usize,
    pub lunch_orders: usize,
    pub snacks_orders: usize,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct CategoryRevenue {
    pub category: String,
    pub revenue: f64,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct DayBreakdown {
    pub date: String,
    pub breakfast: u32,
    pub lunch: u32,
    pub snacks: u32,
    pub revenue: f64,
}

#[derive(Serialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CounterStats {
    pub pending: usize,
    pub served_today: usize,
    pub revenue_today: f64,
}

fn item_slot(item: &OrderItem) -> Option<MealSlot> {
    item.category.as_deref().and_then(|c| c.parse().ok())
}

fn has_slot(order: &Order, slot: MealSlot) -> bool {
    order.items.iter().any(|item| item_slot(item) == Some(slot))
}

/// An order counts toward every meal slot one of its items belongs to.
pub fn kpis(orders: &[Order]) -> Kpis {
    Kpis {
        total_orders: orders.len(),
        total_revenue: orders.iter().map(|o| o.total_amount).sum(),
        breakfast_orders: orders
            .iter()
            .filter(|o| has_slot(o, MealSlot::Breakfast))
            .count(),
        lunch_orders: orders
            .iter()
            .filter(|o| has_slot(o, MealSlot::Lunch))
            .count(),
        snacks_orders: orders
            .iter()
            .filter(|o| has_slot(o, MealSlot::Snacks))
            .count(),
    }
}

pub fn overview(orders: &[Order]) -> Vec<CategoryRevenue> {
    let mut by_category: BTreeMap<String, f64> = BTreeMap::new();

    for item in orders.iter().flat_map(|o| &o.items) {
        let category = item.category.clone().unwrap_or_else(|| "other".to_string());
        *by_category.entry(category).or_default() += item.line_total();
    }

    by_category
        .into_iter()
        .map(|(category, revenue)| CategoryRevenue { category, revenue })
        .collect()
}

/// Per-day counters of items by meal slot plus item revenue.
///
/// Items without a category count as snacks; categories outside the three
/// meal slots contribute revenue only.
pub fn breakdown(orders: &[Order]) -> Vec<DayBreakdown> {
    let mut by_day: BTreeMap<NaiveDate, DayBreakdown> = BTreeMap::new();

    for order in orders {
        let day = order.created_at.date_naive();
        let row = by_day.entry(day).or_insert_with(|| DayBreakdown {
            date: format_date(day),
            breakfast: 0,
            lunch: 0,
            snacks: 0,
            revenue: 0.0,
        });

        for item in &order.items {
            let slot = match &item.category {
                None => Some(MealSlot::Snacks),
                Some(_) => item_slot(item),
            };

            match slot {
                Some(MealSlot::Breakfast) => row.breakfast += 1,
                Some(MealSlot::Lunch) => row.lunch += 1,
                Some(MealSlot::Snacks) => row.snacks += 1,
                None => {}
            }
            row.revenue += item.line_total();
        }
    }

    by_day.into_values().collect()
}

pub fn counter_stats(orders: &[Order], today: NaiveDate) -> CounterStats {
    CounterStats {
        pending: orders
            .iter()
            .filter(|o| o.status == OrderStatus::Pending)
            .count(),
        served_today: orders
            .iter()
            .filter(|o| o.status == OrderStatus::Completed && o.updated_at.date_naive() == today)
            .count(),
        revenue_today: orders
            .iter()
            .filter(|o| o.created_at.date_naive() == today)
            .map(|o| o.total_amount)
            .sum(),
    }
}

use anyhow::{bail, Result};
use serde_json::{json, Value};
use std::collections::HashMap;

use super::{months_covered, parse_amount, parse_date, round2, window, Pipeline};
use crate::cohort::{derive_cohort_id, normalize_component};
use crate::models::{
    AudienceSegment, DataCoverage, DataQuality, DataType, GeoData, SellableRecord,
};

/// Food-delivery order history
pub struct ZomatoPipeline;

fn spend_tier(avg_order_value: f64) -> &'static str {
    if avg_order_value < 300.0 {
        "budget"
    } else if avg_order_value < 700.0 {
        "mid"
    } else {
        "premium"
    }
}

fn frequency_tier(orders_per_month: f64) -> &'static str {
    if orders_per_month >= 12.0 {
        "heavy"
    } else if orders_per_month >= 4.0 {
        "weekly"
    } else if orders_per_month >= 1.0 {
        "monthly"
    } else {
        "occasional"
    }
}

fn order_amount(order: &Value) -> Option<f64> {
    order
        .get("amount")
        .or_else(|| order.get("total_cost"))
        .or_else(|| order.get("totalCost"))
        .and_then(parse_amount)
}

/// Most frequent non-empty value, ties broken alphabetically
fn most_common<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in values {
        let value = value.trim();
        if !value.is_empty() {
            *counts.entry(value.to_string()).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .max_by(|(a_name, a_count), (b_name, b_count)| {
            a_count.cmp(b_count).then_with(|| b_name.cmp(a_name))
        })
        .map(|(name, _)| name)
}

#[async_trait::async_trait]
impl Pipeline for ZomatoPipeline {
    fn data_type(&self) -> DataType {
        DataType::ZomatoOrderHistory
    }

    async fn transform(&self, payload: &Value) -> Result<SellableRecord> {
        let Some(orders) = payload.get("orders").and_then(Value::as_array) else {
            bail!("payload has no orders array");
        };
        if orders.is_empty() {
            bail!("no orders to process");
        }

        let amounts: Vec<f64> = orders.iter().filter_map(order_amount).collect();
        let dates: Vec<_> = orders
            .iter()
            .filter_map(|order| order.get("date").and_then(parse_date))
            .collect();

        let total_orders = orders.len() as u64;
        let total_spend: f64 = amounts.iter().sum();
        let avg_order_value = if amounts.is_empty() {
            0.0
        } else {
            total_spend / amounts.len() as f64
        };

        let (start, end) = window(&dates);
        let orders_per_month = total_orders as f64 / months_covered(start, end);

        let city = most_common(
            orders
                .iter()
                .filter_map(|order| order.get("city").and_then(Value::as_str)),
        )
        .or_else(|| {
            payload
                .get("city")
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        let completeness = orders
            .iter()
            .filter(|order| order_amount(order).is_some() && order.get("date").and_then(parse_date).is_some())
            .count() as f64
            / total_orders as f64;
        let depth = (total_orders as f64 / 10.0).min(1.0);
        let score = round2(0.6 * completeness + 0.4 * depth);

        let spend = spend_tier(avg_order_value);
        let frequency = frequency_tier(orders_per_month);
        let segment_id = derive_cohort_id(
            Some(DataType::ZomatoOrderHistory.provider()),
            city.as_deref(),
            Some(spend),
            Some(frequency),
        );

        let geo_data = city.map(|city| GeoData {
            city_cluster: normalize_component(Some(&city)),
        });

        let data = json!({
            "transaction_data": {
                "summary": {
                    "total_orders": total_orders,
                    "total_spend": round2(total_spend),
                    "avg_order_value": round2(avg_order_value),
                    "data_window_start": start,
                    "data_window_end": end,
                }
            },
            "behavior": {
                "orders_per_month": round2(orders_per_month),
            }
        });

        Ok(SellableRecord::new(
            DataType::ZomatoOrderHistory,
            AudienceSegment {
                segment_id,
                platform: DataType::ZomatoOrderHistory.provider().to_string(),
                spend_tier: spend.to_string(),
                frequency_tier: frequency.to_string(),
            },
            geo_data,
            DataCoverage {
                record_count: total_orders,
                data_window_start: start,
                data_window_end: end,
            },
            DataQuality {
                score,
                completeness: round2(completeness),
            },
            data,
        ))
    }
}

//! # Order Selector
//!
//! Loads the active orders of an entity, ascending by priority rank, each
//! enriched with client deliverability and the weekly counters derived
//! from sent deliveries since the most recent Monday 00:00 in the
//! configured reference offset. Orders whose client is inactive or missing
//! from the directory are excluded entirely.

use chrono::{DateTime, Datelike, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::models::{ActiveOrder, BusinessEntity};
use crate::storage::{enrich_order, ClientDirectory, DeliveryStore, OrderStore, StorageResult};

/// Most recent Monday 00:00 at a fixed UTC offset, expressed in UTC.
pub fn week_start(now: DateTime<Utc>, offset_hours: i32) -> DateTime<Utc> {
    let offset = Duration::hours(i64::from(offset_hours));
    let local = now + offset;
    let days_from_monday = i64::from(local.weekday().num_days_from_monday());
    let monday_midnight = (local.date_naive() - Duration::days(days_from_monday))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time");
    DateTime::from_naive_utc_and_offset(monday_midnight, Utc) - offset
}

pub struct OrderSelector {
    orders: Arc<dyn OrderStore>,
    deliveries: Arc<dyn DeliveryStore>,
    clients: Arc<dyn ClientDirectory>,
    week_anchor_offset_hours: i32,
}

impl OrderSelector {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        deliveries: Arc<dyn DeliveryStore>,
        clients: Arc<dyn ClientDirectory>,
        week_anchor_offset_hours: i32,
    ) -> Self {
        Self {
            orders,
            deliveries,
            clients,
            week_anchor_offset_hours,
        }
    }

    /// Active, deliverable orders of the entity in priority order, with
    /// this week's consumption computed.
    pub async fn active_orders(
        &self,
        entity: BusinessEntity,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<ActiveOrder>> {
        let since = week_start(now, self.week_anchor_offset_hours);
        let raw = self.orders.active_orders(entity).await?;

        let mut enriched = Vec::with_capacity(raw.len());
        for order in raw {
            let order_id = order.order_id;
            match enrich_order(self.deliveries.as_ref(), self.clients.as_ref(), order, since)
                .await?
            {
                Some(active) => enriched.push(active),
                None => {
                    debug!(order_id = %order_id, "order excluded: client inactive or unknown");
                }
            }
        }
        Ok(enriched)
    }
}

//! # Duplicate Oracle
//!
//! Answers whether delivering a phone/product to a client would repeat a
//! delivery made within the trailing 30 days. Scope is strictly per client
//! id: the same phone/product may go to a different client concurrently,
//! and each client carries its own independent window regardless of
//! business entity.
//!
//! Storage failures propagate as errors; the allocation engine treats an
//! errored lookup as blocked (fail-closed) so contractual over-delivery
//! cannot slip through an outage.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::constants::duplicate_window;
use crate::storage::{DeliveryStore, StorageResult};

pub struct DuplicateOracle {
    deliveries: Arc<dyn DeliveryStore>,
}

impl DuplicateOracle {
    pub fn new(deliveries: Arc<dyn DeliveryStore>) -> Self {
        Self { deliveries }
    }

    /// True iff a sent delivery of this phone/product to this client exists
    /// strictly inside the trailing 30-day window. At exactly 30 days the
    /// block expires (the lead stays Backlog regardless).
    pub async fn is_duplicate(
        &self,
        phone: &str,
        product: &str,
        client_id: Uuid,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let last = self
            .deliveries
            .last_delivered_at(phone, product, client_id)
            .await?;
        Ok(match last {
            Some(delivered_at) => now - delivered_at < duplicate_window(),
            None => false,
        })
    }
}

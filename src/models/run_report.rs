//! Per-run observability record: one row per entity per day, doubling as
//! the run lock that keeps the daily trigger idempotent.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::BusinessEntity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub entity: BusinessEntity,
    pub run_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub promoted_aged: u64,
    pub promoted_delivered: u64,
    pub non_routable: u64,
    /// Leads skipped this run because their creation timestamp is missing.
    /// Their status is untouched; they re-enter once the data is corrected.
    pub missing_timestamp: u64,
    pub orders_processed: u64,
    pub orders_skipped_quota_full: u64,
    pub leads_matched_fresh: u64,
    pub leads_matched_backlog: u64,
    pub deliveries_sent: u64,
    pub deliveries_failed: u64,
    pub fallback_matched: u64,
    /// Per-order errors captured without aborting the run.
    pub errors: Vec<String>,
}

impl RunReport {
    pub fn start(entity: BusinessEntity, run_date: NaiveDate, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            entity,
            run_date,
            started_at,
            finished_at: None,
            promoted_aged: 0,
            promoted_delivered: 0,
            non_routable: 0,
            missing_timestamp: 0,
            orders_processed: 0,
            orders_skipped_quota_full: 0,
            leads_matched_fresh: 0,
            leads_matched_backlog: 0,
            deliveries_sent: 0,
            deliveries_failed: 0,
            fallback_matched: 0,
            errors: Vec::new(),
        }
    }

    pub fn record_error(&mut self, context: &str, error: impl std::fmt::Display) {
        self.errors.push(format!("{context}: {error}"));
    }
}

//! # Lead Classifier
//!
//! Single source of truth for the Fresh/Backlog freshness tier. A lead is
//! Fresh iff it has never been delivered, is strictly younger than 8 days,
//! and is not already tagged Backlog. Everything else is Backlog, except
//! leads with a missing creation timestamp, which are excluded from both
//! pools until the data is corrected.
//!
//! The promotion sweep runs at the start of every allocation run and is
//! idempotent: already-tagged leads are untouched.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::constants::freshness_window;
use crate::models::{FreshnessTag, Lead, LeadStatus};
use crate::storage::{LeadStore, StorageResult};

/// Which allocation pool a lead belongs to for the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolAssignment {
    Fresh,
    Backlog,
    /// Missing/unparseable creation timestamp: excluded from both pools,
    /// never silently matched.
    Excluded,
}

/// Classify a lead at `now`. Never fails.
pub fn classify(lead: &Lead, now: DateTime<Utc>) -> PoolAssignment {
    if lead.freshness == FreshnessTag::Backlog {
        return PoolAssignment::Backlog;
    }
    if lead.has_delivery_linkage() || lead.status == LeadStatus::Delivered {
        return PoolAssignment::Backlog;
    }
    match lead.created_at {
        None => PoolAssignment::Excluded,
        Some(created) if now - created < freshness_window() => PoolAssignment::Fresh,
        Some(_) => PoolAssignment::Backlog,
    }
}

/// Counts reported by the promotion sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionCounts {
    pub aged: u64,
    pub delivered: u64,
}

/// Owns the scheduled promotion sweep.
pub struct LeadClassifier {
    leads: Arc<dyn LeadStore>,
}

impl LeadClassifier {
    pub fn new(leads: Arc<dyn LeadStore>) -> Self {
        Self { leads }
    }

    /// Promote aged and already-delivered leads to Backlog.
    ///
    /// Routable leads (status `new` or `non_delivered`) aged 8 days or more
    /// are tagged with reason `age_8_days`; delivered leads still tagged
    /// Fresh are tagged with reason `already_delivered`, their status left
    /// `delivered` to preserve delivery history.
    pub async fn promote_aged_and_delivered(
        &self,
        now: DateTime<Utc>,
    ) -> StorageResult<PromotionCounts> {
        let cutoff = now - freshness_window();
        let aged = self.leads.promote_aged(cutoff, now).await?;
        let delivered = self.leads.promote_delivered(now).await?;

        if aged > 0 || delivered > 0 {
            info!(
                promoted_aged = aged,
                promoted_delivered = delivered,
                "promotion sweep tagged leads backlog"
            );
        }

        Ok(PromotionCounts { aged, delivered })
    }
}

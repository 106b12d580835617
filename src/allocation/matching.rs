//! Shared eligibility predicates for the three matching passes. Used by
//! the batch engine, the cross-entity fallback resolver, and the real-time
//! routing path so the rules cannot drift apart.

use chrono::{DateTime, Utc};

use crate::dedup::DuplicateOracle;
use crate::models::{ActiveOrder, Lead};
use crate::storage::{DeliveryStore, StorageResult};

/// The three passes, in the order an allocation run tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    /// Pass 1: Fresh pool.
    Fresh,
    /// Pass 2: Backlog leads never delivered to this client.
    BacklogNeverDelivered,
    /// Pass 3 (last resort): Backlog leads previously delivered to this
    /// client whose 30-day window has expired.
    BacklogExpiredWindow,
}

/// Why a candidate was (or was not) eligible for an order on one pass.
/// The suppression case is kept distinct so the run can park leads the
/// oracle blocked with status `duplicate` instead of `non_delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Order does not cover the lead's department/product.
    NotCovered,
    /// Delivery history puts the lead in a different pass for this client.
    WrongPass,
    /// Blocked by the 30-day per-(phone, product, client) window.
    DuplicateBlocked,
}

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        self == Self::Eligible
    }
}

/// Department and product filters common to every pass.
pub fn covers_lead(order: &ActiveOrder, lead: &Lead) -> bool {
    order.order.product == lead.product && order.order.coverage.covers(&lead.department)
}

/// Full eligibility check for one candidate on one pass. Storage failures
/// propagate as errors; the caller must treat an errored lookup as blocked
/// (fail-closed), never as eligible.
pub async fn pass_eligible(
    lead: &Lead,
    order: &ActiveOrder,
    pass: MatchPass,
    oracle: &DuplicateOracle,
    deliveries: &dyn DeliveryStore,
    now: DateTime<Utc>,
) -> StorageResult<Eligibility> {
    if !covers_lead(order, lead) {
        return Ok(Eligibility::NotCovered);
    }

    let client_id = order.order.client_id;
    match pass {
        MatchPass::Fresh => {}
        MatchPass::BacklogNeverDelivered => {
            // Any prior delivery to this client reserves the lead for the
            // expired-window pass, even outside the duplicate window.
            if deliveries
                .lead_delivered_to_client(lead.lead_id, client_id)
                .await?
            {
                return Ok(Eligibility::WrongPass);
            }
        }
        MatchPass::BacklogExpiredWindow => {
            if !deliveries
                .lead_delivered_to_client(lead.lead_id, client_id)
                .await?
            {
                return Ok(Eligibility::WrongPass);
            }
        }
    }

    // The per-client 30-day window applies on every pass: the same phone
    // may be blocked through a different lead's delivery.
    if oracle
        .is_duplicate(&lead.phone, &lead.product, client_id, now)
        .await?
    {
        return Ok(Eligibility::DuplicateBlocked);
    }
    Ok(Eligibility::Eligible)
}

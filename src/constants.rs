//! # System Constants
//!
//! Central definitions for allocation windows, status groupings, skip
//! reasons, and lifecycle event names. Keeping these in one place prevents
//! the 8-day / 30-day windows from drifting between the classifier, the
//! duplicate oracle, and the tests that pin their boundary behavior.

use chrono::Duration;

/// Age at which a never-delivered lead stops being Fresh and is promoted
/// to the backlog pool. The comparison is strict: a lead is Fresh only
/// while `now - created_at < FRESHNESS_WINDOW_DAYS`.
pub const FRESHNESS_WINDOW_DAYS: i64 = 8;

/// Per-(phone, product, client) suppression window. A delivery inside this
/// trailing window blocks re-delivery of the same phone/product to the same
/// client; at exactly 30 days the block expires.
pub const DUPLICATE_WINDOW_DAYS: i64 = 30;

/// Freshness window as a chrono duration.
pub fn freshness_window() -> Duration {
    Duration::days(FRESHNESS_WINDOW_DAYS)
}

/// Duplicate suppression window as a chrono duration.
pub fn duplicate_window() -> Duration {
    Duration::days(DUPLICATE_WINDOW_DAYS)
}

/// Reasons an order is skipped during an allocation run.
pub mod skip_reasons {
    /// The order's weekly quota is already consumed.
    pub const QUOTA_FULL: &str = "quota_full";
    /// No eligible order exists for the lead, in its home entity or
    /// (when permitted) the sibling entity.
    pub const NO_OPEN_ORDERS: &str = "no_open_orders";
}

/// Lifecycle event names published on the event channel.
pub mod events {
    pub const LEAD_PROMOTED: &str = "lead.promoted";
    pub const LEAD_ROUTED: &str = "lead.routed";
    pub const LEAD_NON_ROUTABLE: &str = "lead.non_routable";
    pub const ORDER_SKIPPED: &str = "order.skipped";
    pub const DELIVERY_SENT: &str = "delivery.sent";
    pub const DELIVERY_FAILED: &str = "delivery.failed";
    pub const DELIVERY_REJECTED: &str = "delivery.rejected";
    pub const DELIVERY_REMOVED: &str = "delivery.removed";
    pub const RUN_COMPLETED: &str = "allocation.run_completed";
    pub const FALLBACK_MATCHED: &str = "allocation.fallback_matched";
    /// Transport succeeded but the `sent` write failed. Requires manual
    /// reconciliation; never swallowed.
    pub const DELIVERY_INCONSISTENT: &str = "delivery.inconsistent";
}

/// Status string groups used by storage query filters.
pub mod status_groups {
    /// Lead statuses eligible for allocation runs. `duplicate` is parked,
    /// not terminal: the 30-day window expires on its own.
    pub const ROUTABLE: &[&str] = &["new", "non_delivered", "duplicate"];
    /// Delivery statuses counted against weekly quotas.
    pub const QUOTA_COUNTED: &[&str] = &["sent"];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_match_contractual_values() {
        assert_eq!(freshness_window(), Duration::days(8));
        assert_eq!(duplicate_window(), Duration::days(30));
    }

    #[test]
    fn skip_reasons_are_stable() {
        assert_eq!(skip_reasons::QUOTA_FULL, "quota_full");
        assert_eq!(skip_reasons::NO_OPEN_ORDERS, "no_open_orders");
    }

    #[test]
    fn routable_group_agrees_with_lead_status() {
        use crate::models::LeadStatus;

        for status in status_groups::ROUTABLE {
            let parsed: LeadStatus = status.parse().unwrap();
            assert!(parsed.is_routable(), "{status} must be routable");
        }
        assert!(!status_groups::ROUTABLE.contains(&"delivered"));
        assert!(!status_groups::ROUTABLE.contains(&"routed"));
    }
}

//! # Order (Commande) Model
//!
//! A client's standing weekly purchase contract. Orders are created by the
//! client-management collaborator and are read-only to the allocation
//! engine, which only derives weekly counters from delivery history.
//!
//! Quota semantics: `weekly_quota == 0` means unlimited for the current
//! run; `backlog_cap_percent == 0` means the order accepts zero backlog
//! units (Fresh-only).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::BusinessEntity;

/// Departments an order covers: an explicit list or the wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "departments")]
pub enum DepartmentCoverage {
    Nationwide,
    Departments(Vec<String>),
}

impl DepartmentCoverage {
    pub fn covers(&self, department: &str) -> bool {
        match self {
            Self::Nationwide => true,
            Self::Departments(list) => list.iter().any(|d| d == department),
        }
    }
}

/// A standing weekly purchase contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub entity: BusinessEntity,
    pub client_id: Uuid,
    pub product: String,
    pub coverage: DepartmentCoverage,
    /// Units per week; 0 = unlimited.
    pub weekly_quota: i32,
    /// Maximum percentage of the quota fillable with backlog units;
    /// 0 = Fresh-only.
    pub backlog_cap_percent: i32,
    /// Lower rank is served first.
    pub priority: i32,
    pub active: bool,
    pub auto_renew: bool,
    pub created_at: DateTime<Utc>,
}

/// Client enrichment from the client directory collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: Uuid,
    pub name: String,
    pub delivery_emails: Vec<String>,
    pub active: bool,
}

/// An order enriched for one allocation run: client deliverability and the
/// weekly counters derived from delivery history since the most recent
/// Monday 00:00.
#[derive(Debug, Clone)]
pub struct ActiveOrder {
    pub order: Order,
    pub client: ClientInfo,
    pub units_delivered_this_week: i64,
    pub backlog_units_delivered_this_week: i64,
}

impl ActiveOrder {
    /// Remaining weekly quota. None means unlimited (quota = 0).
    pub fn quota_remaining(&self) -> Option<i64> {
        if self.order.weekly_quota > 0 {
            Some(i64::from(self.order.weekly_quota) - self.units_delivered_this_week)
        } else {
            None
        }
    }

    /// Remaining backlog units this week:
    /// `floor(quota * cap / 100) - backlog_delivered`. A cap of 0 admits no
    /// backlog at all. The ceiling derives from the quota, so an unlimited
    /// order (quota 0) has no backlog headroom either; unlimited contracts
    /// are fresh-only.
    pub fn backlog_remaining(&self) -> i64 {
        if self.order.backlog_cap_percent <= 0 {
            return 0;
        }
        let ceiling = i64::from(self.order.weekly_quota)
            * i64::from(self.order.backlog_cap_percent)
            / 100;
        ceiling - self.backlog_units_delivered_this_week
    }

    /// Whether the order can take one more unit of the given freshness.
    pub fn can_accept(&self, backlog: bool, matched_total: i64, matched_backlog: i64) -> bool {
        if let Some(remaining) = self.quota_remaining() {
            if remaining - matched_total <= 0 {
                return false;
            }
        }
        if backlog {
            return self.backlog_remaining() - matched_backlog > 0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn order(quota: i32, cap: i32) -> ActiveOrder {
        ActiveOrder {
            order: Order {
                order_id: Uuid::new_v4(),
                entity: BusinessEntity::EntityA,
                client_id: Uuid::new_v4(),
                product: "pv".to_string(),
                coverage: DepartmentCoverage::Departments(vec!["75".to_string()]),
                weekly_quota: quota,
                backlog_cap_percent: cap,
                priority: 1,
                active: true,
                auto_renew: true,
                created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            },
            client: ClientInfo {
                client_id: Uuid::new_v4(),
                name: "Acme".to_string(),
                delivery_emails: vec!["leads@acme.example".to_string()],
                active: true,
            },
            units_delivered_this_week: 0,
            backlog_units_delivered_this_week: 0,
        }
    }

    #[test]
    fn coverage_matching() {
        let explicit = DepartmentCoverage::Departments(vec!["75".into(), "92".into()]);
        assert!(explicit.covers("75"));
        assert!(!explicit.covers("13"));
        assert!(DepartmentCoverage::Nationwide.covers("13"));
    }

    #[test]
    fn quota_zero_is_unlimited_and_fresh_only() {
        let o = order(0, 20);
        assert_eq!(o.quota_remaining(), None);
        assert!(o.can_accept(false, 1_000_000, 0));
        // backlog ceiling derives from the quota, so unlimited orders
        // have no backlog headroom
        assert_eq!(o.backlog_remaining(), 0);
        assert!(!o.can_accept(true, 0, 0));
    }

    #[test]
    fn backlog_cap_arithmetic() {
        // quota 10, cap 25% -> floor(10 * 25 / 100) = 2 backlog units
        let mut o = order(10, 25);
        assert_eq!(o.backlog_remaining(), 2);

        o.backlog_units_delivered_this_week = 2;
        assert_eq!(o.backlog_remaining(), 0);
        assert!(!o.can_accept(true, 0, 0));
        assert!(o.can_accept(false, 0, 0));
    }

    #[test]
    fn cap_zero_is_fresh_only() {
        let o = order(10, 0);
        assert_eq!(o.backlog_remaining(), 0);
        assert!(!o.can_accept(true, 0, 0));
        assert!(o.can_accept(false, 0, 0));
    }

    #[test]
    fn quota_consumed_within_run_counts() {
        let o = order(3, 100);
        assert!(o.can_accept(false, 2, 0));
        assert!(!o.can_accept(false, 3, 0));
    }
}

//! # Lead Model
//!
//! A lead identifies a prospective customer moving through the allocation
//! pipeline. Leads are created once at ingestion and mutated only by the
//! allocation engine (status, freshness tag) and the delivery state machine
//! (delivery linkage). They are never hard-deleted; rejection or removal of
//! a delivery resets the lead to a re-routable state.
//!
//! ## Invariants
//!
//! - Once tagged [`FreshnessTag::Backlog`], a lead is never retagged Fresh.
//!   The tag only moves in one direction; expiry of a duplicate window does
//!   not restore Fresh status.
//! - `delivered_to_client` / `delivered_at` / `delivery_id` are written only
//!   when the owning delivery reaches `sent`, and cleared only by the
//!   rejected/removed outcome transitions.
//! - A missing or unparseable creation timestamp excludes the lead from both
//!   the Fresh and Backlog pools until the data is corrected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::entity::BusinessEntity;

/// Freshness tier of a lead. Monotonic: Fresh may become Backlog, never
/// the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessTag {
    Fresh,
    Backlog,
}

impl fmt::Display for FreshnessTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Backlog => write!(f, "backlog"),
        }
    }
}

impl std::str::FromStr for FreshnessTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fresh" => Ok(Self::Fresh),
            "backlog" => Ok(Self::Backlog),
            _ => Err(format!("Invalid freshness tag: {s}")),
        }
    }
}

/// Why a lead was promoted to the backlog pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogReason {
    Age8Days,
    AlreadyDelivered,
}

impl BacklogReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Age8Days => "age_8_days",
            Self::AlreadyDelivered => "already_delivered",
        }
    }
}

/// Delivery status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Ingested, never routed.
    New,
    /// Went through at least one run without being absorbed.
    NonDelivered,
    /// Claimed by the real-time path, delivery in flight.
    Routed,
    /// Attributed to a sent delivery.
    Delivered,
    /// Blocked everywhere by duplicate suppression during the last run.
    /// Still routable: the 30-day window expires on its own.
    Duplicate,
    /// Failed data-quality checks (missing phone/department/name).
    NonRoutable,
}

impl LeadStatus {
    /// Whether the lead may enter an allocation run.
    pub fn is_routable(self) -> bool {
        matches!(self, Self::New | Self::NonDelivered | Self::Duplicate)
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::NonDelivered => write!(f, "non_delivered"),
            Self::Routed => write!(f, "routed"),
            Self::Delivered => write!(f, "delivered"),
            Self::Duplicate => write!(f, "duplicate"),
            Self::NonRoutable => write!(f, "non_routable"),
        }
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "non_delivered" => Ok(Self::NonDelivered),
            "routed" => Ok(Self::Routed),
            "delivered" => Ok(Self::Delivered),
            "duplicate" => Ok(Self::Duplicate),
            "non_routable" => Ok(Self::NonRoutable),
            _ => Err(format!("Invalid lead status: {s}")),
        }
    }
}

/// Where the lead was ingested from. Partner-channel leads are bound to
/// their home entity and never eligible for cross-entity fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Web,
    Api,
    Partner,
}

impl LeadSource {
    /// Entity-locked sources always resolve a failed home-entity match to
    /// "no_open_orders", never a cross-entity match.
    pub fn is_entity_locked(self) -> bool {
        matches!(self, Self::Partner)
    }
}

/// A prospective customer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub lead_id: Uuid,
    /// Normalized phone number; part of the duplicate suppression key.
    pub phone: String,
    pub name: String,
    /// Two-digit department code, e.g. "75".
    pub department: String,
    /// Product type code, e.g. "pv".
    pub product: String,
    pub entity: BusinessEntity,
    pub source: LeadSource,
    /// None when the ingested timestamp was missing or unparseable; such
    /// leads are excluded from both allocation pools.
    pub created_at: Option<DateTime<Utc>>,
    pub freshness: FreshnessTag,
    pub backlog_reason: Option<BacklogReason>,
    pub status: LeadStatus,
    pub delivered_to_client: Option<Uuid>,
    pub delivered_to_client_name: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivery_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Age of the lead at `now`. None when the creation timestamp is
    /// missing.
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.created_at.map(|created| now - created)
    }

    /// Whether the lead has ever been attributed to a delivery. Any of the
    /// three linkage fields counts; full per-client history lives in the
    /// delivery store.
    pub fn has_delivery_linkage(&self) -> bool {
        self.delivered_to_client.is_some()
            || self.delivered_at.is_some()
            || self.delivery_id.is_some()
    }
}

/// Lead at ingestion time, before validation and id assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLead {
    pub phone: String,
    pub name: String,
    pub department: String,
    pub product: String,
    pub entity: BusinessEntity,
    pub source: LeadSource,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewLead {
    /// Data-quality check applied at the storage boundary. Leads failing it
    /// are persisted as non-routable and surfaced in the run report, never
    /// silently matched.
    pub fn is_routable_quality(&self) -> bool {
        !self.phone.trim().is_empty()
            && !self.name.trim().is_empty()
            && !self.department.trim().is_empty()
            && !self.product.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_new_lead() -> NewLead {
        NewLead {
            phone: "+33612345678".to_string(),
            name: "Dupont".to_string(),
            department: "75".to_string(),
            product: "pv".to_string(),
            entity: BusinessEntity::EntityA,
            source: LeadSource::Web,
            created_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()),
        }
    }

    #[test]
    fn quality_check_rejects_missing_fields() {
        assert!(sample_new_lead().is_routable_quality());

        let mut missing_phone = sample_new_lead();
        missing_phone.phone = "  ".to_string();
        assert!(!missing_phone.is_routable_quality());

        let mut missing_department = sample_new_lead();
        missing_department.department = String::new();
        assert!(!missing_department.is_routable_quality());
    }

    #[test]
    fn status_string_round_trip() {
        assert_eq!(LeadStatus::NonDelivered.to_string(), "non_delivered");
        assert_eq!(
            "non_routable".parse::<LeadStatus>().unwrap(),
            LeadStatus::NonRoutable
        );
        assert!(LeadStatus::New.is_routable());
        assert!(LeadStatus::Duplicate.is_routable());
        assert!(!LeadStatus::Delivered.is_routable());
    }

    #[test]
    fn any_linkage_field_alone_counts_as_delivered() {
        let base = Lead {
            lead_id: Uuid::new_v4(),
            phone: "+33612345678".to_string(),
            name: "Dupont".to_string(),
            department: "75".to_string(),
            product: "pv".to_string(),
            entity: BusinessEntity::EntityA,
            source: LeadSource::Web,
            created_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()),
            freshness: FreshnessTag::Fresh,
            backlog_reason: None,
            status: LeadStatus::New,
            delivered_to_client: None,
            delivered_to_client_name: None,
            delivered_at: None,
            delivery_id: None,
            updated_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
        };
        assert!(!base.has_delivery_linkage());

        let mut by_client = base.clone();
        by_client.delivered_to_client = Some(Uuid::new_v4());
        assert!(by_client.has_delivery_linkage());

        let mut by_timestamp = base.clone();
        by_timestamp.delivered_at = Some(Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap());
        assert!(by_timestamp.has_delivery_linkage());

        let mut by_delivery = base;
        by_delivery.delivery_id = Some(Uuid::new_v4());
        assert!(by_delivery.has_delivery_linkage());
    }

    #[test]
    fn backlog_reason_strings() {
        assert_eq!(BacklogReason::Age8Days.as_str(), "age_8_days");
        assert_eq!(
            BacklogReason::AlreadyDelivered.as_str(),
            "already_delivered"
        );
    }

    #[test]
    fn partner_leads_are_entity_locked() {
        assert!(LeadSource::Partner.is_entity_locked());
        assert!(!LeadSource::Web.is_entity_locked());
        assert!(!LeadSource::Api.is_entity_locked());
    }
}

//! # Delivery Model
//!
//! One packaging event binding one or more leads to one order/client for
//! one send. A delivery is created by the allocation engine via the
//! packager and mutated exclusively by the delivery state machine; once
//! `sent` it is immutable history except for the post-send outcome field.
//!
//! ## Status vs outcome
//!
//! Status (`pending_csv → ready_to_send → sending → sent | failed`, with
//! `failed → sending` retries) tracks the physical send. The outcome
//! (`accepted`, optionally once `rejected` or `removed`) is an orthogonal
//! post-send annotation. Billable is defined as
//! `status == sent && outcome == accepted`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::entity::BusinessEntity;

/// Lifecycle status of a delivery. Only the delivery state machine writes
/// this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Created, export not yet built.
    PendingCsv,
    /// Export built, waiting for transport.
    ReadyToSend,
    /// Hand-off to the transport collaborator in flight.
    Sending,
    /// Transport confirmed; terminal for the status dimension.
    Sent,
    /// Transport failed; retryable via `failed -> sending`.
    Failed,
}

impl DeliveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PendingCsv => write!(f, "pending_csv"),
            Self::ReadyToSend => write!(f, "ready_to_send"),
            Self::Sending => write!(f, "sending"),
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_csv" => Ok(Self::PendingCsv),
            "ready_to_send" => Ok(Self::ReadyToSend),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid delivery status: {s}")),
        }
    }
}

/// Post-send annotation, orthogonal to [`DeliveryStatus`]. Starts at
/// `accepted` and may transition once to `rejected` or `removed`; the two
/// are mutually exclusive terminal outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Accepted,
    Rejected,
    Removed,
}

impl DeliveryOutcome {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Removed)
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

impl std::str::FromStr for DeliveryOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "removed" => Ok(Self::Removed),
            _ => Err(format!("Invalid delivery outcome: {s}")),
        }
    }
}

/// How the packaged batch reaches the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    /// CSV export handed to the transport collaborator.
    CsvExport,
}

/// One packaged send of one or more leads to one client/order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub delivery_id: Uuid,
    pub entity: BusinessEntity,
    pub order_id: Uuid,
    pub client_id: Uuid,
    pub client_name: String,
    pub product: String,
    pub method: DeliveryMethod,
    pub lead_ids: Vec<Uuid>,
    pub fresh_count: i32,
    pub backlog_count: i32,
    pub status: DeliveryStatus,
    pub outcome: DeliveryOutcome,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub packaged_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub outcome_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    /// Billable unit definition: sent and still accepted. Rejected and
    /// removed deliveries are never billable, without changing `status`.
    pub fn is_billable(&self) -> bool {
        self.status == DeliveryStatus::Sent && self.outcome == DeliveryOutcome::Accepted
    }

    pub fn unit_count(&self) -> i64 {
        self.lead_ids.len() as i64
    }
}

/// Delivery at creation time, before the state machine takes ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDelivery {
    pub entity: BusinessEntity,
    pub order_id: Uuid,
    pub client_id: Uuid,
    pub client_name: String,
    pub product: String,
    pub method: DeliveryMethod,
    pub lead_ids: Vec<Uuid>,
    pub fresh_count: i32,
    pub backlog_count: i32,
}

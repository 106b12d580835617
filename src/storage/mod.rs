//! # Storage Contracts
//!
//! The allocation core consumes persistence through these traits (query by
//! field, timestamp ranges, atomic conditional updates, bulk updates, and
//! counting), never through a concrete store. [`postgres`] provides the
//! production implementation; [`memory`] provides an in-process one used by
//! the integration tests and by embedders that bring their own persistence.
//!
//! All timestamps are passed in explicitly by callers (who hold the
//! injected clock); implementations never reach for the wall clock.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ActiveOrder, BusinessEntity, ClientInfo, Delivery, DeliveryOutcome,
    DeliveryStatus, Lead, LeadStatus, NewDelivery, NewLead, Order, RunReport,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Structured storage errors, kept distinct from constraint violations so
/// the engine can fail closed on I/O without misreporting business errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage connection error: {message}")]
    Connection { message: String },

    #[error("storage query error: {operation}: {message}")]
    Query { operation: String, message: String },

    #[error("record not found: {record} {id}")]
    NotFound { record: &'static str, id: Uuid },

    #[error("storage serialization error: {message}")]
    Serialization { message: String },
}

impl StorageError {
    pub fn query(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Query {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn serialization(message: impl std::fmt::Display) -> Self {
        Self::Serialization {
            message: message.to_string(),
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection {
                    message: err.to_string(),
                }
            }
            other => Self::Query {
                operation: "sqlx".to_string(),
                message: other.to_string(),
            },
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Lead persistence surface owned by the allocation core.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Persist an ingested lead. Data-quality validation happens here:
    /// leads missing phone/name/department/product are stored with status
    /// `non_routable` instead of being silently accepted.
    async fn create_lead(&self, new_lead: NewLead, now: DateTime<Utc>) -> StorageResult<Lead>;

    async fn get_lead(&self, lead_id: Uuid) -> StorageResult<Option<Lead>>;

    /// All leads of the entity with a routable status (`new`,
    /// `non_delivered`, `duplicate`), ordered by creation time ascending;
    /// leads with a missing creation timestamp sort last.
    async fn find_routable(&self, entity: BusinessEntity) -> StorageResult<Vec<Lead>>;

    /// Bulk-promote routable, still-Fresh leads created at or before
    /// `cutoff` to Backlog with reason `age_8_days`. Idempotent: already
    /// tagged leads are untouched. Returns the number promoted.
    async fn promote_aged(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>)
        -> StorageResult<u64>;

    /// Bulk-promote delivered, still-Fresh leads to Backlog with reason
    /// `already_delivered`, leaving their status `delivered` to preserve
    /// history. Idempotent. Returns the number promoted.
    async fn promote_delivered(&self, now: DateTime<Utc>) -> StorageResult<u64>;

    /// Atomic conditional status update ("set status=next where
    /// status=expected"). Returns false when the precondition did not hold.
    async fn update_status_if(
        &self,
        lead_id: Uuid,
        expected: LeadStatus,
        next: LeadStatus,
        now: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Bulk mark leads non-routable (data-quality failures found mid-run).
    async fn mark_non_routable(&self, lead_ids: &[Uuid], now: DateTime<Utc>)
        -> StorageResult<u64>;

    /// Write delivery attribution: status `delivered` plus linkage fields.
    /// Called only by the delivery state machine on the `sent` transition.
    async fn attach_delivery(
        &self,
        lead_id: Uuid,
        client_id: Uuid,
        client_name: &str,
        delivery_id: Uuid,
        delivered_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Reset a lead to the re-routable `new` state, clearing delivery
    /// linkage. The freshness tag is left untouched (monotonic).
    async fn reset_to_new(&self, lead_id: Uuid, now: DateTime<Utc>) -> StorageResult<()>;
}

/// Read-only order surface; orders are owned by the client-management
/// collaborator.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Active orders of the entity, ascending by priority rank.
    async fn active_orders(&self, entity: BusinessEntity) -> StorageResult<Vec<Order>>;
}

/// Read-only client enrichment lookup.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn client(&self, client_id: Uuid) -> StorageResult<Option<ClientInfo>>;
}

/// Delivery persistence plus the history queries the duplicate oracle and
/// quota tracking derive from.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn create_delivery(
        &self,
        new_delivery: NewDelivery,
        now: DateTime<Utc>,
    ) -> StorageResult<Delivery>;

    async fn get_delivery(&self, delivery_id: Uuid) -> StorageResult<Option<Delivery>>;

    /// Optimistic status transition: applies `next` only when the persisted
    /// status still equals `expected`. Sets the per-state timestamp, stores
    /// the error detail on `failed`, and increments the attempt counter on
    /// `sending`. Returns false when the precondition did not hold.
    async fn transition_status(
        &self,
        delivery_id: Uuid,
        expected: DeliveryStatus,
        next: DeliveryStatus,
        at: DateTime<Utc>,
        error: Option<&str>,
    ) -> StorageResult<bool>;

    /// Conditional outcome write: applies only when status is `sent` and
    /// the persisted outcome is still `accepted`. Returns false otherwise.
    async fn apply_outcome(
        &self,
        delivery_id: Uuid,
        outcome: DeliveryOutcome,
        at: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Units (lead count) of sent deliveries attributed to the order since
    /// `since`. Rejected/removed outcomes still count: quota is consumed at
    /// send time and conservative counting keeps the accepted subset inside
    /// the contractual bound.
    async fn units_sent_for_order_since(
        &self,
        order_id: Uuid,
        since: DateTime<Utc>,
    ) -> StorageResult<i64>;

    /// Backlog units of sent deliveries attributed to the order since
    /// `since`.
    async fn backlog_units_sent_for_order_since(
        &self,
        order_id: Uuid,
        since: DateTime<Utc>,
    ) -> StorageResult<i64>;

    /// Most recent time a lead with this phone/product was part of a sent,
    /// not-rejected/removed delivery to this client. The duplicate window
    /// derives from this; rejected and removed deliveries do not block,
    /// since their leads were reset to re-routable.
    async fn last_delivered_at(
        &self,
        phone: &str,
        product: &str,
        client_id: Uuid,
    ) -> StorageResult<Option<DateTime<Utc>>>;

    /// Whether this lead was ever part of a sent, not-rejected/removed
    /// delivery to this client. Splits Pass 2 from Pass 3.
    async fn lead_delivered_to_client(
        &self,
        lead_id: Uuid,
        client_id: Uuid,
    ) -> StorageResult<bool>;
}

/// Run report persistence; the (entity, date) uniqueness doubles as the
/// run lock serializing the daily trigger.
#[async_trait]
pub trait RunReportStore: Send + Sync {
    /// Try to claim the run slot for entity+date. Returns false when a
    /// report already exists (another trigger fired first).
    async fn acquire_run_lock(
        &self,
        entity: BusinessEntity,
        run_date: NaiveDate,
        started_at: DateTime<Utc>,
    ) -> StorageResult<bool>;

    async fn save_report(&self, report: &RunReport) -> StorageResult<()>;

    async fn get_report(
        &self,
        entity: BusinessEntity,
        run_date: NaiveDate,
    ) -> StorageResult<Option<RunReport>>;
}

/// Convenience bundle implemented by stores that provide every surface.
pub trait Store:
    LeadStore + OrderStore + ClientDirectory + DeliveryStore + RunReportStore
{
}

impl<T> Store for T where
    T: LeadStore + OrderStore + ClientDirectory + DeliveryStore + RunReportStore
{
}

/// Enrich a raw order with client info and weekly counters. Shared by the
/// Postgres and memory selectors so the Monday-anchored arithmetic lives in
/// one place.
pub(crate) async fn enrich_order(
    deliveries: &dyn DeliveryStore,
    clients: &dyn ClientDirectory,
    order: Order,
    week_start: DateTime<Utc>,
) -> StorageResult<Option<ActiveOrder>> {
    let client = match clients.client(order.client_id).await? {
        Some(client) if client.active => client,
        // Inactive or unknown client: the order is excluded entirely.
        _ => return Ok(None),
    };

    let units = deliveries
        .units_sent_for_order_since(order.order_id, week_start)
        .await?;
    let backlog_units = deliveries
        .backlog_units_sent_for_order_since(order.order_id, week_start)
        .await?;

    Ok(Some(ActiveOrder {
        order,
        client,
        units_delivered_this_week: units,
        backlog_units_delivered_this_week: backlog_units,
    }))
}

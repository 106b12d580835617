//! Shared fixtures for the end-to-end suites: a fully wired engine over
//! `MemoryStore` with a settable clock and a recording transport.

// Each suite uses a different slice of the harness.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use leadflow_core::allocation::{AllocationEngine, CrossEntityFallback, OrderSelector};
use leadflow_core::classifier::LeadClassifier;
use leadflow_core::clock::{Clock, FixedClock};
use leadflow_core::config::LeadflowConfig;
use leadflow_core::dedup::DuplicateOracle;
use leadflow_core::events::EventPublisher;
use leadflow_core::export::CsvExportCodec;
use leadflow_core::models::{
    BusinessEntity, ClientInfo, Delivery, DeliveryOutcome, DeliveryStatus, DepartmentCoverage,
    FreshnessTag, Lead, LeadSource, LeadStatus, NewDelivery, Order,
};
use leadflow_core::packager::DeliveryPackager;
use leadflow_core::state_machine::DeliveryStateMachine;
use leadflow_core::storage::{
    ClientDirectory, DeliveryStore, LeadStore, MemoryStore, OrderStore, RunReportStore,
    StorageError, StorageResult,
};
use leadflow_core::transport::RecordingTransport;

/// Wednesday, 06:00 UTC.
pub fn run_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 6, 6, 0, 0).unwrap()
}

pub struct Harness {
    pub store: MemoryStore,
    pub clock: FixedClock,
    pub transport: Arc<RecordingTransport>,
    pub events: EventPublisher,
    pub engine: AllocationEngine,
    leads: Arc<dyn LeadStore>,
    deliveries: Arc<dyn DeliveryStore>,
    clients: Arc<dyn ClientDirectory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(LeadflowConfig::default())
    }

    pub fn with_config(config: LeadflowConfig) -> Self {
        let store = MemoryStore::new();
        let deliveries: Arc<dyn DeliveryStore> = Arc::new(store.clone());
        Self::wire(config, store, deliveries)
    }

    /// Harness whose delivery store can be told to fail `sent` writes,
    /// for exercising the delivered-but-unrecorded path.
    pub fn with_sent_write_fault() -> (Self, Arc<SentWriteFault>) {
        let store = MemoryStore::new();
        let fault = Arc::new(SentWriteFault::new(store.clone()));
        let deliveries: Arc<dyn DeliveryStore> = Arc::clone(&fault) as Arc<dyn DeliveryStore>;
        (
            Self::wire(LeadflowConfig::default(), store, deliveries),
            fault,
        )
    }

    fn wire(config: LeadflowConfig, store: MemoryStore, deliveries: Arc<dyn DeliveryStore>) -> Self {
        let clock = FixedClock::new(run_instant());
        let transport = Arc::new(RecordingTransport::new());
        let events = EventPublisher::new(256);

        let leads: Arc<dyn LeadStore> = Arc::new(store.clone());
        let orders: Arc<dyn OrderStore> = Arc::new(store.clone());
        let clients: Arc<dyn ClientDirectory> = Arc::new(store.clone());
        let reports: Arc<dyn RunReportStore> = Arc::new(store.clone());
        let clock_handle: Arc<dyn Clock> = Arc::new(clock.clone());

        let selector = Arc::new(OrderSelector::new(
            orders,
            Arc::clone(&deliveries),
            Arc::clone(&clients),
            config.week_anchor_offset_hours,
        ));
        let oracle = Arc::new(DuplicateOracle::new(Arc::clone(&deliveries)));
        let classifier = LeadClassifier::new(Arc::clone(&leads));
        let fallback = CrossEntityFallback::new(
            Arc::clone(&selector),
            Arc::clone(&oracle),
            Arc::clone(&deliveries),
            config,
        );
        let packager = DeliveryPackager::new(
            Arc::clone(&leads),
            Arc::clone(&deliveries),
            Arc::clone(&clients),
            Arc::new(CsvExportCodec),
            Arc::clone(&transport) as Arc<dyn leadflow_core::transport::Transport>,
            events.clone(),
            Arc::clone(&clock_handle),
        );
        let engine = AllocationEngine::new(
            Arc::clone(&leads),
            Arc::clone(&deliveries),
            reports,
            selector,
            oracle,
            classifier,
            fallback,
            packager,
            events.clone(),
            clock_handle,
        );

        Self {
            store,
            clock,
            transport,
            events,
            engine,
            leads,
            deliveries,
            clients,
        }
    }

    /// Second packager over the same stores, for exercising `retry_send`
    /// outside the engine.
    pub fn packager(&self) -> DeliveryPackager {
        DeliveryPackager::new(
            Arc::clone(&self.leads),
            Arc::clone(&self.deliveries),
            Arc::clone(&self.clients),
            Arc::new(CsvExportCodec),
            Arc::clone(&self.transport) as Arc<dyn leadflow_core::transport::Transport>,
            self.events.clone(),
            Arc::new(self.clock.clone()),
        )
    }

    /// State machine bound to one delivery, sharing the harness stores.
    pub fn state_machine(&self, delivery_id: Uuid) -> DeliveryStateMachine {
        DeliveryStateMachine::new(
            delivery_id,
            Arc::clone(&self.leads),
            Arc::clone(&self.deliveries),
            self.events.clone(),
            Arc::new(self.clock.clone()),
        )
    }
}

/// A routable web lead in department 75 for product "pv", created
/// `age_days` before the fixed run instant.
pub fn lead(phone: &str, age_days: i64) -> Lead {
    Lead {
        lead_id: Uuid::new_v4(),
        phone: phone.to_string(),
        name: "Lefevre".to_string(),
        department: "75".to_string(),
        product: "pv".to_string(),
        entity: BusinessEntity::EntityA,
        source: LeadSource::Web,
        created_at: Some(run_instant() - chrono::Duration::days(age_days)),
        freshness: FreshnessTag::Fresh,
        backlog_reason: None,
        status: LeadStatus::New,
        delivered_to_client: None,
        delivered_to_client_name: None,
        delivered_at: None,
        delivery_id: None,
        updated_at: run_instant() - chrono::Duration::days(age_days),
    }
}

/// An active nationwide order for product "pv".
pub fn order(entity: BusinessEntity, client_id: Uuid, quota: i32, cap: i32, priority: i32) -> Order {
    Order {
        order_id: Uuid::new_v4(),
        entity,
        client_id,
        product: "pv".to_string(),
        coverage: DepartmentCoverage::Nationwide,
        weekly_quota: quota,
        backlog_cap_percent: cap,
        priority,
        active: true,
        auto_renew: true,
        created_at: run_instant() - chrono::Duration::days(60),
    }
}

/// Delivery store wrapper that fails the next N `sent` transitions with a
/// connection error while every other operation passes through. Simulates
/// a store outage hitting exactly between the transport hand-off and the
/// `sent` write.
pub struct SentWriteFault {
    inner: MemoryStore,
    failures: AtomicUsize,
}

impl SentWriteFault {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_sent_writes(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeliveryStore for SentWriteFault {
    async fn create_delivery(
        &self,
        new_delivery: NewDelivery,
        now: DateTime<Utc>,
    ) -> StorageResult<Delivery> {
        self.inner.create_delivery(new_delivery, now).await
    }

    async fn get_delivery(&self, delivery_id: Uuid) -> StorageResult<Option<Delivery>> {
        self.inner.get_delivery(delivery_id).await
    }

    async fn transition_status(
        &self,
        delivery_id: Uuid,
        expected: DeliveryStatus,
        next: DeliveryStatus,
        at: DateTime<Utc>,
        error: Option<&str>,
    ) -> StorageResult<bool> {
        if next == DeliveryStatus::Sent {
            let armed = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if armed {
                return Err(StorageError::Connection {
                    message: "connection lost before sent write".to_string(),
                });
            }
        }
        self.inner
            .transition_status(delivery_id, expected, next, at, error)
            .await
    }

    async fn apply_outcome(
        &self,
        delivery_id: Uuid,
        outcome: DeliveryOutcome,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        self.inner.apply_outcome(delivery_id, outcome, at).await
    }

    async fn units_sent_for_order_since(
        &self,
        order_id: Uuid,
        since: DateTime<Utc>,
    ) -> StorageResult<i64> {
        self.inner.units_sent_for_order_since(order_id, since).await
    }

    async fn backlog_units_sent_for_order_since(
        &self,
        order_id: Uuid,
        since: DateTime<Utc>,
    ) -> StorageResult<i64> {
        self.inner
            .backlog_units_sent_for_order_since(order_id, since)
            .await
    }

    async fn last_delivered_at(
        &self,
        phone: &str,
        product: &str,
        client_id: Uuid,
    ) -> StorageResult<Option<DateTime<Utc>>> {
        self.inner.last_delivered_at(phone, product, client_id).await
    }

    async fn lead_delivered_to_client(
        &self,
        lead_id: Uuid,
        client_id: Uuid,
    ) -> StorageResult<bool> {
        self.inner.lead_delivered_to_client(lead_id, client_id).await
    }
}

pub fn client(name: &str) -> ClientInfo {
    ClientInfo {
        client_id: Uuid::new_v4(),
        name: name.to_string(),
        delivery_emails: vec![format!("leads@{}.example", name.to_lowercase())],
        active: true,
    }
}

//! In-memory store implementing every storage contract over RwLock'd maps.
//! Used by the integration tests and by embedders without Postgres.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    BacklogReason, BusinessEntity, ClientInfo, Delivery, DeliveryOutcome, DeliveryStatus,
    FreshnessTag, Lead, LeadStatus, NewDelivery, NewLead, Order, RunReport,
};

use super::{
    ClientDirectory, DeliveryStore, LeadStore, OrderStore, RunReportStore, StorageResult,
};

#[derive(Default)]
struct State {
    leads: HashMap<Uuid, Lead>,
    orders: Vec<Order>,
    clients: HashMap<Uuid, ClientInfo>,
    deliveries: HashMap<Uuid, Delivery>,
    reports: HashMap<(BusinessEntity, NaiveDate), RunReport>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an order (normally owned by the client-management collaborator).
    pub async fn insert_order(&self, order: Order) {
        self.state.write().await.orders.push(order);
    }

    /// Seed a client directory entry.
    pub async fn insert_client(&self, client: ClientInfo) {
        self.state
            .write()
            .await
            .clients
            .insert(client.client_id, client);
    }

    /// Seed a fully-formed lead, bypassing ingestion validation.
    pub async fn insert_lead(&self, lead: Lead) {
        self.state.write().await.leads.insert(lead.lead_id, lead);
    }

    pub async fn lead(&self, lead_id: Uuid) -> Option<Lead> {
        self.state.read().await.leads.get(&lead_id).cloned()
    }

    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.state.read().await.deliveries.values().cloned().collect()
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn create_lead(&self, new_lead: NewLead, now: DateTime<Utc>) -> StorageResult<Lead> {
        let status = if new_lead.is_routable_quality() {
            LeadStatus::New
        } else {
            LeadStatus::NonRoutable
        };
        let lead = Lead {
            lead_id: Uuid::new_v4(),
            phone: new_lead.phone,
            name: new_lead.name,
            department: new_lead.department,
            product: new_lead.product,
            entity: new_lead.entity,
            source: new_lead.source,
            created_at: new_lead.created_at,
            freshness: FreshnessTag::Fresh,
            backlog_reason: None,
            status,
            delivered_to_client: None,
            delivered_to_client_name: None,
            delivered_at: None,
            delivery_id: None,
            updated_at: now,
        };
        self.state
            .write()
            .await
            .leads
            .insert(lead.lead_id, lead.clone());
        Ok(lead)
    }

    async fn get_lead(&self, lead_id: Uuid) -> StorageResult<Option<Lead>> {
        Ok(self.state.read().await.leads.get(&lead_id).cloned())
    }

    async fn find_routable(&self, entity: BusinessEntity) -> StorageResult<Vec<Lead>> {
        let state = self.state.read().await;
        let mut leads: Vec<Lead> = state
            .leads
            .values()
            .filter(|l| l.entity == entity && l.status.is_routable())
            .cloned()
            .collect();
        // created_at ascending, missing timestamps last
        leads.sort_by_key(|l| (l.created_at.is_none(), l.created_at, l.lead_id));
        Ok(leads)
    }

    async fn promote_aged(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let mut state = self.state.write().await;
        let mut promoted = 0;
        for lead in state.leads.values_mut() {
            if lead.status.is_routable()
                && lead.freshness == FreshnessTag::Fresh
                && lead.created_at.is_some_and(|c| c <= cutoff)
            {
                lead.freshness = FreshnessTag::Backlog;
                lead.backlog_reason = Some(BacklogReason::Age8Days);
                lead.updated_at = now;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    async fn promote_delivered(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let mut state = self.state.write().await;
        let mut promoted = 0;
        for lead in state.leads.values_mut() {
            if lead.status == LeadStatus::Delivered && lead.freshness == FreshnessTag::Fresh {
                lead.freshness = FreshnessTag::Backlog;
                lead.backlog_reason = Some(BacklogReason::AlreadyDelivered);
                lead.updated_at = now;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    async fn update_status_if(
        &self,
        lead_id: Uuid,
        expected: LeadStatus,
        next: LeadStatus,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        match state.leads.get_mut(&lead_id) {
            Some(lead) if lead.status == expected => {
                lead.status = next;
                lead.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_non_routable(
        &self,
        lead_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for id in lead_ids {
            if let Some(lead) = state.leads.get_mut(id) {
                lead.status = LeadStatus::NonRoutable;
                lead.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn attach_delivery(
        &self,
        lead_id: Uuid,
        client_id: Uuid,
        client_name: &str,
        delivery_id: Uuid,
        delivered_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut state = self.state.write().await;
        if let Some(lead) = state.leads.get_mut(&lead_id) {
            lead.status = LeadStatus::Delivered;
            lead.delivered_to_client = Some(client_id);
            lead.delivered_to_client_name = Some(client_name.to_string());
            lead.delivered_at = Some(delivered_at);
            lead.delivery_id = Some(delivery_id);
            lead.updated_at = delivered_at;
        }
        Ok(())
    }

    async fn reset_to_new(&self, lead_id: Uuid, now: DateTime<Utc>) -> StorageResult<()> {
        let mut state = self.state.write().await;
        if let Some(lead) = state.leads.get_mut(&lead_id) {
            lead.status = LeadStatus::New;
            lead.delivered_to_client = None;
            lead.delivered_to_client_name = None;
            lead.delivered_at = None;
            lead.delivery_id = None;
            // freshness tag untouched: Backlog is permanent
            lead.updated_at = now;
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn active_orders(&self, entity: BusinessEntity) -> StorageResult<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| o.entity == entity && o.active)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.priority);
        Ok(orders)
    }
}

#[async_trait]
impl ClientDirectory for MemoryStore {
    async fn client(&self, client_id: Uuid) -> StorageResult<Option<ClientInfo>> {
        Ok(self.state.read().await.clients.get(&client_id).cloned())
    }
}

#[async_trait]
impl DeliveryStore for MemoryStore {
    async fn create_delivery(
        &self,
        new_delivery: NewDelivery,
        now: DateTime<Utc>,
    ) -> StorageResult<Delivery> {
        let delivery = Delivery {
            delivery_id: Uuid::new_v4(),
            entity: new_delivery.entity,
            order_id: new_delivery.order_id,
            client_id: new_delivery.client_id,
            client_name: new_delivery.client_name,
            product: new_delivery.product,
            method: new_delivery.method,
            lead_ids: new_delivery.lead_ids,
            fresh_count: new_delivery.fresh_count,
            backlog_count: new_delivery.backlog_count,
            status: DeliveryStatus::PendingCsv,
            outcome: DeliveryOutcome::Accepted,
            attempt_count: 0,
            last_error: None,
            created_at: now,
            packaged_at: None,
            sent_at: None,
            failed_at: None,
            outcome_at: None,
            updated_at: now,
        };
        self.state
            .write()
            .await
            .deliveries
            .insert(delivery.delivery_id, delivery.clone());
        Ok(delivery)
    }

    async fn get_delivery(&self, delivery_id: Uuid) -> StorageResult<Option<Delivery>> {
        Ok(self.state.read().await.deliveries.get(&delivery_id).cloned())
    }

    async fn transition_status(
        &self,
        delivery_id: Uuid,
        expected: DeliveryStatus,
        next: DeliveryStatus,
        at: DateTime<Utc>,
        error: Option<&str>,
    ) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        match state.deliveries.get_mut(&delivery_id) {
            Some(delivery) if delivery.status == expected => {
                delivery.status = next;
                delivery.updated_at = at;
                match next {
                    DeliveryStatus::ReadyToSend => delivery.packaged_at = Some(at),
                    DeliveryStatus::Sending => delivery.attempt_count += 1,
                    DeliveryStatus::Sent => delivery.sent_at = Some(at),
                    DeliveryStatus::Failed => {
                        delivery.failed_at = Some(at);
                        delivery.last_error = error.map(str::to_string);
                    }
                    DeliveryStatus::PendingCsv => {}
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn apply_outcome(
        &self,
        delivery_id: Uuid,
        outcome: DeliveryOutcome,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        match state.deliveries.get_mut(&delivery_id) {
            Some(delivery)
                if delivery.status == DeliveryStatus::Sent
                    && delivery.outcome == DeliveryOutcome::Accepted =>
            {
                delivery.outcome = outcome;
                delivery.outcome_at = Some(at);
                delivery.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn units_sent_for_order_since(
        &self,
        order_id: Uuid,
        since: DateTime<Utc>,
    ) -> StorageResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .deliveries
            .values()
            .filter(|d| {
                d.order_id == order_id
                    && d.status == DeliveryStatus::Sent
                    && d.sent_at.is_some_and(|at| at >= since)
            })
            .map(Delivery::unit_count)
            .sum())
    }

    async fn backlog_units_sent_for_order_since(
        &self,
        order_id: Uuid,
        since: DateTime<Utc>,
    ) -> StorageResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .deliveries
            .values()
            .filter(|d| {
                d.order_id == order_id
                    && d.status == DeliveryStatus::Sent
                    && d.sent_at.is_some_and(|at| at >= since)
            })
            .map(|d| i64::from(d.backlog_count))
            .sum())
    }

    async fn last_delivered_at(
        &self,
        phone: &str,
        product: &str,
        client_id: Uuid,
    ) -> StorageResult<Option<DateTime<Utc>>> {
        let state = self.state.read().await;
        let mut latest: Option<DateTime<Utc>> = None;
        for delivery in state.deliveries.values() {
            if delivery.client_id != client_id
                || delivery.status != DeliveryStatus::Sent
                || delivery.outcome != DeliveryOutcome::Accepted
                || delivery.product != product
            {
                continue;
            }
            let Some(sent_at) = delivery.sent_at else {
                continue;
            };
            let matches_phone = delivery
                .lead_ids
                .iter()
                .filter_map(|id| state.leads.get(id))
                .any(|lead| lead.phone == phone);
            if matches_phone && latest.is_none_or(|cur| sent_at > cur) {
                latest = Some(sent_at);
            }
        }
        Ok(latest)
    }

    async fn lead_delivered_to_client(
        &self,
        lead_id: Uuid,
        client_id: Uuid,
    ) -> StorageResult<bool> {
        let state = self.state.read().await;
        Ok(state.deliveries.values().any(|d| {
            d.client_id == client_id
                && d.status == DeliveryStatus::Sent
                && d.outcome == DeliveryOutcome::Accepted
                && d.lead_ids.contains(&lead_id)
        }))
    }
}

#[async_trait]
impl RunReportStore for MemoryStore {
    async fn acquire_run_lock(
        &self,
        entity: BusinessEntity,
        run_date: NaiveDate,
        started_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        if state.reports.contains_key(&(entity, run_date)) {
            return Ok(false);
        }
        state.reports.insert(
            (entity, run_date),
            RunReport::start(entity, run_date, started_at),
        );
        Ok(true)
    }

    async fn save_report(&self, report: &RunReport) -> StorageResult<()> {
        self.state
            .write()
            .await
            .reports
            .insert((report.entity, report.run_date), report.clone());
        Ok(())
    }

    async fn get_report(
        &self,
        entity: BusinessEntity,
        run_date: NaiveDate,
    ) -> StorageResult<Option<RunReport>> {
        Ok(self
            .state
            .read()
            .await
            .reports
            .get(&(entity, run_date))
            .cloned())
    }
}

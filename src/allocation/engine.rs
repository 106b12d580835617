//! # Allocation Engine
//!
//! Drives one daily run per business entity: promotion sweep, candidate
//! pool construction, priority-ordered three-pass matching, packaging, and
//! the cross-entity fallback for whatever the home entity could not absorb.
//!
//! Orders are processed strictly sequentially so claim-set mutation is
//! visible to lower-priority orders. An error while processing one order is
//! recorded on the run report and does not abort the rest of the run.
//!
//! The real-time path ([`AllocationEngine::route_single`]) shares the same
//! eligibility predicates and commits with a live conditional status
//! update, so it can run concurrently with a batch run without
//! double-claiming.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::fallback::{CrossEntityFallback, FallbackOutcome};
use super::matching::{pass_eligible, Eligibility, MatchPass};
use super::selector::OrderSelector;
use super::RunContext;
use crate::classifier::{classify, LeadClassifier, PoolAssignment};
use crate::clock::Clock;
use crate::constants::{events, skip_reasons};
use crate::dedup::DuplicateOracle;
use crate::error::{LeadflowError, Result};
use crate::events::EventPublisher;
use crate::models::{
    ActiveOrder, BusinessEntity, Delivery, DeliveryStatus, FreshnessTag, Lead, LeadStatus,
    RunReport,
};
use crate::packager::DeliveryPackager;
use crate::storage::{DeliveryStore, LeadStore, RunReportStore};

const PASSES: [MatchPass; 3] = [
    MatchPass::Fresh,
    MatchPass::BacklogNeverDelivered,
    MatchPass::BacklogExpiredWindow,
];

/// Result of routing one lead through the real-time path.
#[derive(Debug)]
pub enum RouteOutcome {
    /// The lead was matched, packaged, and the delivery attempted. The
    /// delivery may be `sent` or `failed` (retryable).
    Routed(Box<Delivery>),
    /// No eligible order in the home entity, and the fallback resolved to
    /// nothing (or was locked/disabled).
    NoOpenOrders,
    /// The lead cannot be routed: its creation timestamp is missing. The
    /// status is left untouched so a corrected lead routes normally.
    NonRoutable,
    /// A concurrent run claimed the lead between selection and commitment.
    AlreadyClaimed,
}

pub struct AllocationEngine {
    leads: Arc<dyn LeadStore>,
    deliveries: Arc<dyn DeliveryStore>,
    reports: Arc<dyn RunReportStore>,
    selector: Arc<OrderSelector>,
    oracle: Arc<DuplicateOracle>,
    classifier: LeadClassifier,
    fallback: CrossEntityFallback,
    packager: DeliveryPackager,
    event_publisher: EventPublisher,
    clock: Arc<dyn Clock>,
}

impl AllocationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        leads: Arc<dyn LeadStore>,
        deliveries: Arc<dyn DeliveryStore>,
        reports: Arc<dyn RunReportStore>,
        selector: Arc<OrderSelector>,
        oracle: Arc<DuplicateOracle>,
        classifier: LeadClassifier,
        fallback: CrossEntityFallback,
        packager: DeliveryPackager,
        event_publisher: EventPublisher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            leads,
            deliveries,
            reports,
            selector,
            oracle,
            classifier,
            fallback,
            packager,
            event_publisher,
            clock,
        }
    }

    /// Run both entities back to back. A failed run for one entity never
    /// blocks the sibling's run.
    pub async fn run_all(&self) -> Vec<(BusinessEntity, Result<Option<RunReport>>)> {
        let mut results = Vec::with_capacity(2);
        for entity in [BusinessEntity::EntityA, BusinessEntity::EntityB] {
            let result = self.run_entity(entity).await;
            if let Err(error) = &result {
                error!(entity = %entity, %error, "allocation run failed");
            }
            results.push((entity, result));
        }
        results
    }

    /// Execute one daily allocation run for `entity`.
    ///
    /// Returns `Ok(None)` when a run for this entity and date already
    /// exists (the run lock makes double-triggering a no-op).
    pub async fn run_entity(&self, entity: BusinessEntity) -> Result<Option<RunReport>> {
        let now = self.clock.now();
        let run_date = now.date_naive();

        if !self.reports.acquire_run_lock(entity, run_date, now).await? {
            info!(entity = %entity, %run_date, "run already executed for this date, skipping");
            return Ok(None);
        }

        let mut report = RunReport::start(entity, run_date, now);
        info!(entity = %entity, %run_date, run_id = %report.run_id, "allocation run started");

        // Promotion sweep. A failed sweep leaves stale tags behind but the
        // run can still proceed on the persisted ones.
        match self.classifier.promote_aged_and_delivered(now).await {
            Ok(counts) => {
                report.promoted_aged = counts.aged;
                report.promoted_delivered = counts.delivered;
                if counts.aged > 0 || counts.delivered > 0 {
                    let _ = self
                        .event_publisher
                        .publish(
                            events::LEAD_PROMOTED,
                            json!({
                                "entity": entity.as_str(),
                                "aged": counts.aged,
                                "delivered": counts.delivered,
                            }),
                        )
                        .await;
                }
            }
            Err(error) => {
                warn!(%error, "promotion sweep failed");
                report.record_error("promotion_sweep", error);
            }
        }

        let mut ctx = self.build_pools(entity, now, &mut report).await?;

        let orders = self.selector.active_orders(entity, now).await?;
        for order in &orders {
            report.orders_processed += 1;

            if matches!(order.quota_remaining(), Some(remaining) if remaining <= 0) {
                report.orders_skipped_quota_full += 1;
                self.publish_order_skipped(order).await;
                continue;
            }

            let batch = self
                .match_order(order, &mut ctx, now, &mut report)
                .await;
            if batch.is_empty() {
                continue;
            }
            if let Err(error) = self.dispatch(order, batch, now, &mut report).await {
                warn!(order_id = %order.order.order_id, %error, "order dispatch failed");
                report.record_error(&format!("order {}", order.order.order_id), error);
            }
        }

        self.run_fallback(&mut ctx, now, &mut report).await;
        self.settle_unmatched(&ctx, now, &mut report).await;

        report.finished_at = Some(self.clock.now());
        self.reports.save_report(&report).await?;

        let _ = self
            .event_publisher
            .publish(
                events::RUN_COMPLETED,
                json!({
                    "run_id": report.run_id,
                    "entity": entity.as_str(),
                    "deliveries_sent": report.deliveries_sent,
                    "deliveries_failed": report.deliveries_failed,
                    "fallback_matched": report.fallback_matched,
                    "errors": report.errors.len(),
                }),
            )
            .await;

        info!(
            entity = %entity,
            run_id = %report.run_id,
            deliveries_sent = report.deliveries_sent,
            deliveries_failed = report.deliveries_failed,
            "allocation run finished"
        );
        Ok(Some(report))
    }

    /// Route one freshly ingested lead immediately, outside the batch run.
    pub async fn route_single(&self, lead_id: Uuid) -> Result<RouteOutcome> {
        let now = self.clock.now();
        let lead = self
            .leads
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| crate::storage::StorageError::NotFound {
                record: "lead",
                id: lead_id,
            })?;

        if !lead.status.is_routable() {
            return Ok(RouteOutcome::AlreadyClaimed);
        }
        if classify(&lead, now) == PoolAssignment::Excluded {
            // Missing timestamp: surfaced but not marked, so the lead
            // becomes routable again once the data is corrected.
            self.publish_non_routable(&lead, "missing_created_at").await;
            return Ok(RouteOutcome::NonRoutable);
        }

        let home_orders = self.selector.active_orders(lead.entity, now).await?;
        if let Some(order) = self.first_eligible(&lead, &home_orders, now).await? {
            return self.commit_single(&lead, &order, now).await;
        }

        // Home entity exhausted; try the sibling.
        let mut ctx = RunContext::default();
        match self.fallback.try_fallback(&lead, &mut ctx, now).await? {
            FallbackOutcome::Matched(order) => self.commit_single(&lead, &order, now).await,
            FallbackOutcome::NoOpenOrders
            | FallbackOutcome::Disabled
            | FallbackOutcome::EntityLocked => {
                self.leads
                    .update_status_if(lead.lead_id, lead.status, LeadStatus::NonDelivered, now)
                    .await?;
                Ok(RouteOutcome::NoOpenOrders)
            }
        }
    }

    /// Load routable leads, surface data-quality failures as non-routable,
    /// and split the rest into the Fresh and Backlog pools.
    ///
    /// Leads whose only defect is a missing creation timestamp keep their
    /// status: they are excluded from this run's pools and counted on the
    /// report, and become eligible again once the timestamp is corrected.
    async fn build_pools(
        &self,
        entity: BusinessEntity,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) -> Result<RunContext> {
        let candidates = self.leads.find_routable(entity).await?;

        let mut fresh = Vec::new();
        let mut backlog = Vec::new();
        let mut rejected: Vec<Lead> = Vec::new();
        let mut missing_timestamp: Vec<Lead> = Vec::new();
        for lead in candidates {
            if lead.phone.is_empty() || lead.name.is_empty() || lead.department.is_empty() {
                rejected.push(lead);
                continue;
            }
            match classify(&lead, now) {
                PoolAssignment::Fresh => fresh.push(lead),
                PoolAssignment::Backlog => backlog.push(lead),
                PoolAssignment::Excluded => missing_timestamp.push(lead),
            }
        }

        if !rejected.is_empty() {
            let ids: Vec<Uuid> = rejected.iter().map(|l| l.lead_id).collect();
            report.non_routable = self.leads.mark_non_routable(&ids, now).await?;
            for lead in &rejected {
                self.publish_non_routable(lead, "data_quality").await;
            }
        }
        report.missing_timestamp = missing_timestamp.len() as u64;
        for lead in &missing_timestamp {
            self.publish_non_routable(lead, "missing_created_at").await;
        }

        info!(
            entity = %entity,
            fresh = fresh.len(),
            backlog = backlog.len(),
            non_routable = report.non_routable,
            missing_timestamp = report.missing_timestamp,
            "candidate pools built"
        );
        Ok(RunContext::new(fresh, backlog))
    }

    /// Three-pass matching for one order. Returns the matched batch as
    /// `(lead, is_backlog_unit)` pairs and claims every match in `ctx`.
    ///
    /// Oracle and history lookups that error leave the candidate blocked
    /// (fail-closed) and append to the run report.
    async fn match_order(
        &self,
        order: &ActiveOrder,
        ctx: &mut RunContext,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) -> Vec<(Lead, bool)> {
        let mut matched: Vec<(Lead, bool)> = Vec::new();
        let mut duplicate_blocked: Vec<Uuid> = Vec::new();
        let mut fresh_count = 0i64;
        let mut backlog_count = 0i64;

        for pass in PASSES {
            let backlog = pass != MatchPass::Fresh;
            let pool = if backlog {
                &ctx.backlog_pool
            } else {
                &ctx.fresh_pool
            };

            for lead in pool {
                if !order.can_accept(backlog, fresh_count + backlog_count, backlog_count) {
                    break;
                }
                if ctx.claimed.contains(&lead.lead_id)
                    || matched.iter().any(|(m, _)| m.lead_id == lead.lead_id)
                {
                    continue;
                }
                match pass_eligible(
                    lead,
                    order,
                    pass,
                    &self.oracle,
                    self.deliveries.as_ref(),
                    now,
                )
                .await
                {
                    Ok(Eligibility::Eligible) => {
                        matched.push((lead.clone(), backlog));
                        if backlog {
                            backlog_count += 1;
                        } else {
                            fresh_count += 1;
                        }
                    }
                    Ok(Eligibility::DuplicateBlocked) => {
                        duplicate_blocked.push(lead.lead_id);
                    }
                    Ok(_) => {}
                    Err(error) => {
                        // Blocked, not eligible: a lookup outage must not
                        // let a potential duplicate through.
                        warn!(
                            lead_id = %lead.lead_id,
                            order_id = %order.order.order_id,
                            %error,
                            "eligibility lookup failed, candidate blocked"
                        );
                        report.record_error(
                            &format!("eligibility lead {}", lead.lead_id),
                            error,
                        );
                    }
                }
            }
        }

        for (lead, _) in &matched {
            ctx.claim(lead.lead_id);
        }
        ctx.duplicate_blocked.extend(duplicate_blocked);
        matched
    }

    /// Commit a matched batch against the live store and hand it to the
    /// packager. Leads whose conditional claim fails (taken by a concurrent
    /// path) are dropped from the batch.
    async fn dispatch(
        &self,
        order: &ActiveOrder,
        batch: Vec<(Lead, bool)>,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) -> Result<()> {
        let mut committed: Vec<Lead> = Vec::new();
        let mut fresh_count = 0i32;
        let mut backlog_count = 0i32;
        for (lead, backlog) in batch {
            let claimed = self
                .leads
                .update_status_if(lead.lead_id, lead.status, LeadStatus::Routed, now)
                .await?;
            if !claimed {
                continue;
            }
            let _ = self
                .event_publisher
                .publish(
                    events::LEAD_ROUTED,
                    json!({
                        "lead_id": lead.lead_id,
                        "order_id": order.order.order_id,
                        "client_id": order.order.client_id,
                        "backlog": backlog,
                    }),
                )
                .await;
            if backlog {
                backlog_count += 1;
            } else {
                fresh_count += 1;
            }
            committed.push(lead);
        }
        if committed.is_empty() {
            return Ok(());
        }

        report.leads_matched_fresh += fresh_count as u64;
        report.leads_matched_backlog += backlog_count as u64;

        let result = self
            .packager
            .package_and_send(order, &committed, fresh_count, backlog_count)
            .await;
        match result {
            Ok(delivery) => {
                match delivery.status {
                    DeliveryStatus::Sent => report.deliveries_sent += 1,
                    _ => report.deliveries_failed += 1,
                }
                Ok(())
            }
            Err(error) => {
                self.release_or_hold(&committed, &error, now).await;
                Err(error)
            }
        }
    }

    /// After a failed `package_and_send`, make the committed leads
    /// re-routable again -- unless the transport already confirmed the
    /// hand-off and only the `sent` write failed. Those leads physically
    /// reached the client; resetting them would let the next run deliver
    /// them a second time, so they stay `routed` until an operator
    /// reconciles the delivery.
    async fn release_or_hold(&self, committed: &[Lead], error: &LeadflowError, now: DateTime<Utc>) {
        if let LeadflowError::DeliveredUnrecorded { delivery_id, .. } = error {
            error!(
                delivery_id = %delivery_id,
                leads = committed.len(),
                "delivery handed off but unrecorded, leads held in routed state"
            );
            return;
        }
        for lead in committed {
            if let Err(reset_error) = self.leads.reset_to_new(lead.lead_id, now).await {
                warn!(lead_id = %lead.lead_id, error = %reset_error, "lead reset failed");
            }
        }
    }

    /// Offer every unclaimed lead to the sibling entity, then dispatch the
    /// resulting per-order batches.
    async fn run_fallback(
        &self,
        ctx: &mut RunContext,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) {
        let leftovers: Vec<Lead> = ctx.unclaimed().cloned().collect();
        if leftovers.is_empty() {
            return;
        }

        let mut batches: HashMap<Uuid, (ActiveOrder, Vec<(Lead, bool)>)> = HashMap::new();
        for lead in leftovers {
            match self.fallback.try_fallback(&lead, ctx, now).await {
                Ok(FallbackOutcome::Matched(order)) => {
                    ctx.claim(lead.lead_id);
                    report.fallback_matched += 1;
                    let _ = self
                        .event_publisher
                        .publish(
                            events::FALLBACK_MATCHED,
                            json!({
                                "lead_id": lead.lead_id,
                                "order_id": order.order.order_id,
                                "sibling": order.order.entity.as_str(),
                            }),
                        )
                        .await;
                    let backlog = lead.freshness == FreshnessTag::Backlog;
                    batches
                        .entry(order.order.order_id)
                        .or_insert_with(|| (*order, Vec::new()))
                        .1
                        .push((lead, backlog));
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(lead_id = %lead.lead_id, %error, "fallback lookup failed");
                    report.record_error(&format!("fallback lead {}", lead.lead_id), error);
                }
            }
        }

        for (order, batch) in batches.into_values() {
            if let Err(error) = self.dispatch(&order, batch, now, report).await {
                warn!(order_id = %order.order.order_id, %error, "fallback dispatch failed");
                report.record_error(&format!("fallback order {}", order.order.order_id), error);
            }
        }
    }

    /// Settle still-unmatched leads so the next run keeps seeing them:
    /// leads the oracle blocked park as `duplicate`, fresh `new` leads move
    /// to `non_delivered`. Both remain routable on later runs.
    async fn settle_unmatched(
        &self,
        ctx: &RunContext,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) {
        for lead in ctx.unclaimed() {
            let next = if ctx.duplicate_blocked.contains(&lead.lead_id) {
                LeadStatus::Duplicate
            } else if lead.status == LeadStatus::New {
                LeadStatus::NonDelivered
            } else {
                continue;
            };
            if next == lead.status {
                continue;
            }
            if let Err(error) = self
                .leads
                .update_status_if(lead.lead_id, lead.status, next, now)
                .await
            {
                warn!(lead_id = %lead.lead_id, %error, "settling unmatched lead failed");
                report.record_error(&format!("settle lead {}", lead.lead_id), error);
            }
        }
    }

    /// First home-entity order, in priority order, able to take this lead
    /// right now. Used by the real-time path with no in-run counters.
    async fn first_eligible(
        &self,
        lead: &Lead,
        orders: &[ActiveOrder],
        now: DateTime<Utc>,
    ) -> Result<Option<ActiveOrder>> {
        let backlog = lead.freshness == FreshnessTag::Backlog;
        let passes: &[MatchPass] = if backlog {
            &[
                MatchPass::BacklogNeverDelivered,
                MatchPass::BacklogExpiredWindow,
            ]
        } else {
            &[MatchPass::Fresh]
        };
        for pass in passes {
            for order in orders {
                if !order.can_accept(backlog, 0, 0) {
                    continue;
                }
                if pass_eligible(
                    lead,
                    order,
                    *pass,
                    &self.oracle,
                    self.deliveries.as_ref(),
                    now,
                )
                .await?
                .is_eligible()
                {
                    return Ok(Some(order.clone()));
                }
            }
        }
        Ok(None)
    }

    /// Live-claim one lead and send it as a single-unit delivery.
    async fn commit_single(
        &self,
        lead: &Lead,
        order: &ActiveOrder,
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome> {
        let claimed = self
            .leads
            .update_status_if(lead.lead_id, lead.status, LeadStatus::Routed, now)
            .await?;
        if !claimed {
            return Ok(RouteOutcome::AlreadyClaimed);
        }

        let backlog = lead.freshness == FreshnessTag::Backlog;
        let (fresh_count, backlog_count) = if backlog { (0, 1) } else { (1, 0) };
        let _ = self
            .event_publisher
            .publish(
                events::LEAD_ROUTED,
                json!({
                    "lead_id": lead.lead_id,
                    "order_id": order.order.order_id,
                    "client_id": order.order.client_id,
                    "backlog": backlog,
                }),
            )
            .await;

        let batch = [lead.clone()];
        match self
            .packager
            .package_and_send(order, &batch, fresh_count, backlog_count)
            .await
        {
            Ok(delivery) => Ok(RouteOutcome::Routed(Box::new(delivery))),
            Err(error) => {
                self.release_or_hold(&batch, &error, now).await;
                Err(error)
            }
        }
    }

    async fn publish_order_skipped(&self, order: &ActiveOrder) {
        info!(
            order_id = %order.order.order_id,
            client = %order.client.name,
            reason = skip_reasons::QUOTA_FULL,
            "order skipped"
        );
        let _ = self
            .event_publisher
            .publish(
                events::ORDER_SKIPPED,
                json!({
                    "order_id": order.order.order_id,
                    "client_id": order.order.client_id,
                    "reason": skip_reasons::QUOTA_FULL,
                }),
            )
            .await;
    }

    async fn publish_non_routable(&self, lead: &Lead, reason: &str) {
        let _ = self
            .event_publisher
            .publish(
                events::LEAD_NON_ROUTABLE,
                json!({
                    "lead_id": lead.lead_id,
                    "entity": lead.entity.as_str(),
                    "reason": reason,
                }),
            )
            .await;
    }
}

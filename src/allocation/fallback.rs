//! # Cross-Entity Fallback Resolver
//!
//! Second step of the two-step routing strategy: when no order in the
//! lead's home entity absorbed it, the sibling entity's orders are searched
//! under exactly the same department/product/duplicate constraints.
//!
//! Entity lock and the configuration toggles are decided here, once, so the
//! batch engine and the real-time path cannot disagree on when the sibling
//! entity is reachable.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use super::matching::{pass_eligible, Eligibility, MatchPass};
use super::selector::OrderSelector;
use super::RunContext;
use crate::config::LeadflowConfig;
use crate::dedup::DuplicateOracle;
use crate::models::{ActiveOrder, FreshnessTag, Lead};
use crate::storage::{DeliveryStore, StorageResult};

/// Resolution of one fallback attempt.
#[derive(Debug)]
pub enum FallbackOutcome {
    /// An eligible sibling-entity order was found.
    Matched(Box<ActiveOrder>),
    /// The sibling entity was searched and has no eligible order.
    NoOpenOrders,
    /// Fallback is switched off globally or for the lead's home entity.
    Disabled,
    /// The lead's source binds it to its home entity; the sibling entity
    /// is never searched for it.
    EntityLocked,
}

pub struct CrossEntityFallback {
    selector: Arc<OrderSelector>,
    oracle: Arc<DuplicateOracle>,
    deliveries: Arc<dyn DeliveryStore>,
    config: LeadflowConfig,
}

impl CrossEntityFallback {
    pub fn new(
        selector: Arc<OrderSelector>,
        oracle: Arc<DuplicateOracle>,
        deliveries: Arc<dyn DeliveryStore>,
        config: LeadflowConfig,
    ) -> Self {
        Self {
            selector,
            oracle,
            deliveries,
            config,
        }
    }

    /// Try to place `lead` with a sibling-entity order. Consumption by
    /// earlier fallback matches in the same run is carried in
    /// `ctx.fallback_consumed`; a match records its own unit there.
    pub async fn try_fallback(
        &self,
        lead: &Lead,
        ctx: &mut RunContext,
        now: DateTime<Utc>,
    ) -> StorageResult<FallbackOutcome> {
        // Entity lock wins over the toggles: a partner-sourced lead
        // reports no_open_orders even when fallback is globally on.
        if lead.source.is_entity_locked() {
            return Ok(FallbackOutcome::EntityLocked);
        }
        if !self.config.cross_entity_enabled_for(lead.entity) {
            return Ok(FallbackOutcome::Disabled);
        }

        let sibling = lead.entity.sibling();
        let orders = self.selector.active_orders(sibling, now).await?;

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
            for order in &orders {
                let (consumed_total, consumed_backlog) = ctx
                    .fallback_consumed
                    .get(&order.order.order_id)
                    .copied()
                    .unwrap_or((0, 0));
                if !order.can_accept(backlog, consumed_total, consumed_backlog) {
                    continue;
                }
                let eligibility =
                    pass_eligible(lead, order, *pass, &self.oracle, self.deliveries.as_ref(), now)
                        .await?;
                if eligibility == Eligibility::DuplicateBlocked {
                    ctx.duplicate_blocked.insert(lead.lead_id);
                }
                if eligibility.is_eligible() {
                    debug!(
                        lead_id = %lead.lead_id,
                        order_id = %order.order.order_id,
                        sibling = %sibling,
                        "cross-entity fallback matched"
                    );
                    let entry = ctx
                        .fallback_consumed
                        .entry(order.order.order_id)
                        .or_insert((0, 0));
                    entry.0 += 1;
                    if backlog {
                        entry.1 += 1;
                    }
                    return Ok(FallbackOutcome::Matched(Box::new(order.clone())));
                }
            }
        }

        Ok(FallbackOutcome::NoOpenOrders)
    }
}

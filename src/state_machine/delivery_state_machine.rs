//! # Delivery State Machine
//!
//! Owns every status and outcome write for a delivery. All other code
//! paths go through [`DeliveryStateMachine::transition`], [`reject`] and
//! [`remove`]; nothing else mutates these fields.
//!
//! Invariants enforced here:
//! - a lead is attributed (status `delivered`, client linkage) only when
//!   its owning delivery reaches `sent`;
//! - outcome transitions are legal only from status `sent`, idempotent on
//!   repetition, and mutually exclusive between `rejected` and `removed`;
//! - rejecting or removing resets the leads to re-routable `new` but leaves
//!   the delivery status and packaged artifact untouched for audit.
//!
//! [`reject`]: DeliveryStateMachine::reject
//! [`remove`]: DeliveryStateMachine::remove

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::errors::{StateMachineError, StateMachineResult};
use super::events::DeliveryEvent;
use crate::clock::Clock;
use crate::constants::events;
use crate::events::EventPublisher;
use crate::models::{Delivery, DeliveryOutcome, DeliveryStatus};
use crate::storage::{DeliveryStore, LeadStore};

/// Result of an outcome transition. `already_applied` is true when the
/// requested outcome was in place before the call (idempotent repeat).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeApplication {
    pub outcome: DeliveryOutcome,
    pub already_applied: bool,
}

/// Determine the target status for an event, or fail with an
/// invalid-transition error. The lifecycle graph lives here and nowhere
/// else.
pub fn determine_target_state(
    current: DeliveryStatus,
    event: &DeliveryEvent,
) -> StateMachineResult<DeliveryStatus> {
    let target = match (current, event) {
        (DeliveryStatus::PendingCsv, DeliveryEvent::MarkReady) => DeliveryStatus::ReadyToSend,
        (DeliveryStatus::ReadyToSend, DeliveryEvent::BeginSend) => DeliveryStatus::Sending,
        // Retry path
        (DeliveryStatus::Failed, DeliveryEvent::BeginSend) => DeliveryStatus::Sending,
        (DeliveryStatus::Sending, DeliveryEvent::ConfirmSent) => DeliveryStatus::Sent,
        (DeliveryStatus::Sending, DeliveryEvent::Fail(_)) => DeliveryStatus::Failed,
        (from, event) => {
            return Err(StateMachineError::InvalidTransition {
                from,
                event: event.name().to_string(),
            })
        }
    };
    Ok(target)
}

/// State machine bound to one delivery.
pub struct DeliveryStateMachine {
    delivery_id: Uuid,
    leads: Arc<dyn LeadStore>,
    deliveries: Arc<dyn DeliveryStore>,
    event_publisher: EventPublisher,
    clock: Arc<dyn Clock>,
}

impl DeliveryStateMachine {
    pub fn new(
        delivery_id: Uuid,
        leads: Arc<dyn LeadStore>,
        deliveries: Arc<dyn DeliveryStore>,
        event_publisher: EventPublisher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            delivery_id,
            leads,
            deliveries,
            event_publisher,
            clock,
        }
    }

    pub fn delivery_id(&self) -> Uuid {
        self.delivery_id
    }

    async fn load(&self) -> StateMachineResult<Delivery> {
        self.deliveries
            .get_delivery(self.delivery_id)
            .await?
            .ok_or(StateMachineError::DeliveryNotFound {
                delivery_id: self.delivery_id,
            })
    }

    /// Current persisted status.
    pub async fn current_state(&self) -> StateMachineResult<DeliveryStatus> {
        Ok(self.load().await?.status)
    }

    /// Attempt a status transition. The write is conditional on the
    /// persisted status still matching the state observed here; a
    /// concurrent writer surfaces as [`StateMachineError::StalePrecondition`].
    pub async fn transition(&self, event: DeliveryEvent) -> StateMachineResult<DeliveryStatus> {
        let delivery = self.load().await?;
        let target = determine_target_state(delivery.status, &event)?;
        let now = self.clock.now();

        let error_detail = match &event {
            DeliveryEvent::Fail(detail) => Some(detail.as_str()),
            _ => None,
        };

        let applied = self
            .deliveries
            .transition_status(self.delivery_id, delivery.status, target, now, error_detail)
            .await?;
        if !applied {
            return Err(StateMachineError::StalePrecondition {
                delivery_id: self.delivery_id,
                expected: delivery.status,
            });
        }

        self.execute_actions(&delivery, target, error_detail).await?;
        Ok(target)
    }

    /// Post-transition actions: lead attribution on `sent`, lifecycle
    /// events on `sent` and `failed`.
    async fn execute_actions(
        &self,
        delivery: &Delivery,
        target: DeliveryStatus,
        error_detail: Option<&str>,
    ) -> StateMachineResult<()> {
        match target {
            DeliveryStatus::Sent => {
                let delivered_at = self.clock.now();
                for lead_id in &delivery.lead_ids {
                    self.leads
                        .attach_delivery(
                            *lead_id,
                            delivery.client_id,
                            &delivery.client_name,
                            delivery.delivery_id,
                            delivered_at,
                        )
                        .await?;
                }
                info!(
                    delivery_id = %delivery.delivery_id,
                    client = %delivery.client_name,
                    leads = delivery.lead_ids.len(),
                    "delivery sent, leads attributed"
                );
                self.publish(events::DELIVERY_SENT, delivery, None).await;
            }
            DeliveryStatus::Failed => {
                warn!(
                    delivery_id = %delivery.delivery_id,
                    error = error_detail,
                    attempt = delivery.attempt_count + 1,
                    "delivery transport failed, retryable"
                );
                self.publish(events::DELIVERY_FAILED, delivery, error_detail)
                    .await;
            }
            _ => {}
        }
        Ok(())
    }

    /// Client refused the batch. Idempotent; legal only from `sent`.
    pub async fn reject(&self) -> StateMachineResult<OutcomeApplication> {
        self.apply_outcome(DeliveryOutcome::Rejected, events::DELIVERY_REJECTED)
            .await
    }

    /// Operational correction. Same lead-reset behavior as rejection.
    pub async fn remove(&self) -> StateMachineResult<OutcomeApplication> {
        self.apply_outcome(DeliveryOutcome::Removed, events::DELIVERY_REMOVED)
            .await
    }

    async fn apply_outcome(
        &self,
        requested: DeliveryOutcome,
        event_name: &'static str,
    ) -> StateMachineResult<OutcomeApplication> {
        let delivery = self.load().await?;

        if delivery.outcome == requested {
            return Ok(OutcomeApplication {
                outcome: requested,
                already_applied: true,
            });
        }
        if delivery.outcome.is_terminal() {
            return Err(StateMachineError::OutcomeConflict {
                delivery_id: self.delivery_id,
                current: delivery.outcome,
                requested,
            });
        }
        if delivery.status != DeliveryStatus::Sent {
            return Err(StateMachineError::OutcomeNotAllowed {
                delivery_id: self.delivery_id,
                status: delivery.status,
                requested,
            });
        }

        let now = self.clock.now();
        let applied = self
            .deliveries
            .apply_outcome(self.delivery_id, requested, now)
            .await?;
        if !applied {
            // A concurrent writer got there first; re-read to distinguish
            // an idempotent repeat from a conflicting outcome.
            let current = self.load().await?;
            if current.outcome == requested {
                return Ok(OutcomeApplication {
                    outcome: requested,
                    already_applied: true,
                });
            }
            return Err(StateMachineError::OutcomeConflict {
                delivery_id: self.delivery_id,
                current: current.outcome,
                requested,
            });
        }

        // Leads go back to the re-routable pool; the delivery record stays
        // `sent` with its packaged artifact for audit.
        for lead_id in &delivery.lead_ids {
            self.leads.reset_to_new(*lead_id, now).await?;
        }

        info!(
            delivery_id = %self.delivery_id,
            outcome = %requested,
            leads_reset = delivery.lead_ids.len(),
            "delivery outcome applied"
        );
        self.publish(event_name, &delivery, None).await;

        Ok(OutcomeApplication {
            outcome: requested,
            already_applied: false,
        })
    }

    async fn publish(&self, name: &'static str, delivery: &Delivery, detail: Option<&str>) {
        let context = serde_json::json!({
            "delivery_id": delivery.delivery_id,
            "order_id": delivery.order_id,
            "client_id": delivery.client_id,
            "entity": delivery.entity,
            "lead_count": delivery.lead_ids.len(),
            "detail": detail,
        });
        // Event delivery is best-effort; failures never block the lifecycle.
        let _ = self.event_publisher.publish(name, context).await;
    }
}

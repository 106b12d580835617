//! # Delivery Packager
//!
//! Turns a matched batch into a persisted [`Delivery`] and drives it
//! through the state machine around the export/transport hand-off:
//! `pending_csv` on creation, `ready_to_send` once the export is built,
//! `sending` around the transport call, then `sent` or `failed`.
//!
//! The one failure mode that is never swallowed: transport confirmed the
//! hand-off but the `sent` write failed. That is a delivered-but-unrecorded
//! inconsistency, logged at error level with a dedicated event so an
//! operator reconciles it manually.

use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::constants::events;
use crate::error::{LeadflowError, Result};
use crate::events::EventPublisher;
use crate::export::ExportCodec;
use crate::models::{
    ActiveOrder, Delivery, DeliveryMethod, DeliveryStatus, Lead, NewDelivery,
};
use crate::state_machine::{DeliveryEvent, DeliveryStateMachine, StateMachineError};
use crate::storage::{ClientDirectory, DeliveryStore, LeadStore, StorageError};
use crate::transport::{OutboundMessage, Transport};

pub struct DeliveryPackager {
    leads: Arc<dyn LeadStore>,
    deliveries: Arc<dyn DeliveryStore>,
    clients: Arc<dyn ClientDirectory>,
    codec: Arc<dyn ExportCodec>,
    transport: Arc<dyn Transport>,
    event_publisher: EventPublisher,
    clock: Arc<dyn Clock>,
}

impl DeliveryPackager {
    pub fn new(
        leads: Arc<dyn LeadStore>,
        deliveries: Arc<dyn DeliveryStore>,
        clients: Arc<dyn ClientDirectory>,
        codec: Arc<dyn ExportCodec>,
        transport: Arc<dyn Transport>,
        event_publisher: EventPublisher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            leads,
            deliveries,
            clients,
            codec,
            transport,
            event_publisher,
            clock,
        }
    }

    fn state_machine(&self, delivery_id: Uuid) -> DeliveryStateMachine {
        DeliveryStateMachine::new(
            delivery_id,
            Arc::clone(&self.leads),
            Arc::clone(&self.deliveries),
            self.event_publisher.clone(),
            Arc::clone(&self.clock),
        )
    }

    /// Package one order's matched leads and attempt the send. Returns the
    /// delivery in its final state for this attempt (`sent` or `failed`);
    /// a `failed` delivery is retryable via [`retry_send`].
    ///
    /// [`retry_send`]: DeliveryPackager::retry_send
    pub async fn package_and_send(
        &self,
        order: &ActiveOrder,
        leads: &[Lead],
        fresh_count: i32,
        backlog_count: i32,
    ) -> Result<Delivery> {
        let delivery = self
            .deliveries
            .create_delivery(
                NewDelivery {
                    entity: order.order.entity,
                    order_id: order.order.order_id,
                    client_id: order.order.client_id,
                    client_name: order.client.name.clone(),
                    product: order.order.product.clone(),
                    method: DeliveryMethod::CsvExport,
                    lead_ids: leads.iter().map(|l| l.lead_id).collect(),
                    fresh_count,
                    backlog_count,
                },
                self.clock.now(),
            )
            .await?;

        let sm = self.state_machine(delivery.delivery_id);

        let export =
            self.codec
                .build_export(leads, &order.order.product, order.order.entity)?;
        sm.transition(DeliveryEvent::MarkReady).await?;

        self.drive_send(
            &sm,
            &delivery,
            export,
            order.client.delivery_emails.clone(),
        )
        .await?;

        self.reload(delivery.delivery_id).await
    }

    /// Re-attempt a failed delivery. Rebuilds the export from the stored
    /// lead ids and re-enters the `sending` state.
    pub async fn retry_send(&self, delivery_id: Uuid) -> Result<Delivery> {
        let delivery = self.reload(delivery_id).await?;
        if delivery.status != DeliveryStatus::Failed {
            return Err(StateMachineError::InvalidTransition {
                from: delivery.status,
                event: "retry_send".to_string(),
            }
            .into());
        }

        let mut leads = Vec::with_capacity(delivery.lead_ids.len());
        for lead_id in &delivery.lead_ids {
            let lead = self.leads.get_lead(*lead_id).await?.ok_or(
                StorageError::NotFound {
                    record: "lead",
                    id: *lead_id,
                },
            )?;
            leads.push(lead);
        }

        let to_addresses = self
            .clients
            .client(delivery.client_id)
            .await?
            .map(|c| c.delivery_emails)
            .unwrap_or_default();

        let export = self
            .codec
            .build_export(&leads, &delivery.product, delivery.entity)?;

        let sm = self.state_machine(delivery_id);
        self.drive_send(&sm, &delivery, export, to_addresses).await?;
        self.reload(delivery_id).await
    }

    async fn drive_send(
        &self,
        sm: &DeliveryStateMachine,
        delivery: &Delivery,
        export: String,
        to_addresses: Vec<String>,
    ) -> Result<()> {
        sm.transition(DeliveryEvent::BeginSend).await?;

        let message = OutboundMessage {
            to_addresses,
            payload: export,
            filename: self
                .codec
                .filename(&delivery.product, delivery.entity),
            metadata: serde_json::json!({
                "delivery_id": delivery.delivery_id,
                "order_id": delivery.order_id,
                "entity": delivery.entity,
                "product": delivery.product,
            }),
        };

        match self.transport.send(message).await {
            Ok(()) => match sm.transition(DeliveryEvent::ConfirmSent).await {
                Ok(_) => {
                    info!(
                        delivery_id = %delivery.delivery_id,
                        client = %delivery.client_name,
                        "delivery hand-off confirmed"
                    );
                    Ok(())
                }
                Err(err) => {
                    // Transport succeeded, persistence did not: delivered
                    // but unrecorded. Requires manual reconciliation.
                    error!(
                        delivery_id = %delivery.delivery_id,
                        error = %err,
                        "CRITICAL: transport succeeded but sent transition failed"
                    );
                    let _ = self
                        .event_publisher
                        .publish(
                            events::DELIVERY_INCONSISTENT,
                            serde_json::json!({
                                "delivery_id": delivery.delivery_id,
                                "error": err.to_string(),
                            }),
                        )
                        .await;
                    Err(LeadflowError::DeliveredUnrecorded {
                        delivery_id: delivery.delivery_id,
                        message: err.to_string(),
                    })
                }
            },
            Err(transport_err) => {
                sm.transition(DeliveryEvent::Fail(transport_err.to_string()))
                    .await?;
                Ok(())
            }
        }
    }

    async fn reload(&self, delivery_id: Uuid) -> Result<Delivery> {
        self.deliveries
            .get_delivery(delivery_id)
            .await?
            .ok_or_else(|| {
                LeadflowError::from(StateMachineError::DeliveryNotFound { delivery_id })
            })
    }
}
